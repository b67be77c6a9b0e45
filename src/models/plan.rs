//! The Plan tree: the single value that evolves through Planner, Retriever,
//! Writer and Assembler. See `SPEC_FULL.md` §3.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocKind {
    Technical,
    UserManual,
    Research,
    Tutorial,
}

impl Default for DocKind {
    fn default() -> Self {
        DocKind::Technical
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Leaf {
    pub subtitle: String,
    /// 100-200 chars of writing instruction, filled by the Planner.
    #[serde(default)]
    pub how_to_write: String,
    /// Consolidated evidence snippets, filled by the Retriever. Empty string
    /// (never absent) if retrieval yielded nothing.
    #[serde(default)]
    pub evidence: String,
    /// Final self-score in [0, 1], filled by the Writer.
    #[serde(default)]
    pub quality: f32,
    /// Final content, 800-1200 chars, filled by the Writer.
    #[serde(default)]
    pub prose: String,
}

impl Leaf {
    pub fn new(subtitle: impl Into<String>) -> Self {
        Self {
            subtitle: subtitle.into(),
            how_to_write: String::new(),
            evidence: String::new(),
            quality: 0.0,
            prose: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    pub title: String,
    pub goal: String,
    pub leaves: Vec<Leaf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub request: String,
    pub doc_kind: DocKind,
    pub parts: Vec<Part>,
}

impl Plan {
    /// The default skeleton used when the Planner's structure phase fails
    /// JSON parsing after all retries (§4.4/§4.5 of SPEC_FULL.md).
    pub fn default_skeleton(request: impl Into<String>) -> Self {
        Plan {
            request: request.into(),
            doc_kind: DocKind::Technical,
            parts: vec![Part {
                title: "Overview".to_string(),
                goal: "Provide a baseline structure when automated planning failed.".to_string(),
                leaves: vec![
                    Leaf::new("Introduction"),
                    Leaf::new("Main Discussion"),
                    Leaf::new("Conclusion"),
                ],
            }],
        }
    }

    pub fn leaf_count(&self) -> usize {
        self.parts.iter().map(|p| p.leaves.len()).sum()
    }

    pub fn leaf(&self, part_index: usize, leaf_index: usize) -> Option<&Leaf> {
        self.parts.get(part_index)?.leaves.get(leaf_index)
    }

    pub fn leaf_mut(&mut self, part_index: usize, leaf_index: usize) -> Option<&mut Leaf> {
        self.parts.get_mut(part_index)?.leaves.get_mut(leaf_index)
    }

    /// Iterate every `(part_index, leaf_index)` pair in stored order. The
    /// order of this iteration must equal the order produced by the
    /// Planner's structure phase for the life of the Plan (invariant in
    /// SPEC_FULL.md §3).
    pub fn leaf_indices(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.parts.iter().enumerate().flat_map(|(pi, part)| {
            (0..part.leaves.len()).map(move |li| (pi, li))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_skeleton_has_three_placeholder_leaves() {
        let plan = Plan::default_skeleton("a request");
        assert_eq!(plan.parts.len(), 1);
        assert_eq!(plan.parts[0].leaves.len(), 3);
    }

    #[test]
    fn leaf_indices_preserve_declared_order() {
        let plan = Plan {
            request: "r".into(),
            doc_kind: DocKind::Technical,
            parts: vec![
                Part {
                    title: "A".into(),
                    goal: "g".into(),
                    leaves: vec![Leaf::new("a1"), Leaf::new("a2")],
                },
                Part {
                    title: "B".into(),
                    goal: "g".into(),
                    leaves: vec![Leaf::new("b1")],
                },
            ],
        };
        let indices: Vec<_> = plan.leaf_indices().collect();
        assert_eq!(indices, vec![(0, 0), (0, 1), (1, 0)]);
    }

    #[test]
    fn plan_round_trips_through_json() {
        let plan = Plan::default_skeleton("round trip me");
        let json = serde_json::to_string(&plan).unwrap();
        let back: Plan = serde_json::from_str(&json).unwrap();
        assert_eq!(back.request, plan.request);
        assert_eq!(back.parts.len(), plan.parts.len());
        assert_eq!(back.parts[0].leaves.len(), plan.parts[0].leaves.len());
    }
}
