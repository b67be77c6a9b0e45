//! Per-leaf auxiliary state for the Retriever's reason/act/observe/reflect
//! loop. Held only during the loop and discarded afterward (§3).

use serde::{Deserialize, Serialize};

/// The five retrieval strategies the Retriever's reason/act step selects
/// from. A closed enumeration, not a plug-in registry (Design Notes §9).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Direct,
    Contextual,
    Semantic,
    Specific,
    Alternative,
}

impl Strategy {
    pub const ALL: [Strategy; 5] = [
        Strategy::Direct,
        Strategy::Contextual,
        Strategy::Semantic,
        Strategy::Specific,
        Strategy::Alternative,
    ];

    pub fn semantic_hint(&self) -> &'static str {
        match self {
            Strategy::Direct => "core keyword lookup",
            Strategy::Contextual => "keywords expanded with instruction context",
            Strategy::Semantic => "related concepts, not literal terms",
            Strategy::Specific => "specific cases, data, standards",
            Strategy::Alternative => "synonyms and lateral terms",
        }
    }

    /// The strategy that follows this one in the closed set, wrapping
    /// around. Used to deterministically rotate away from a repeated
    /// keyword list within one leaf's loop.
    pub fn next(&self) -> Strategy {
        let idx = Strategy::ALL.iter().position(|s| s == self).unwrap();
        Strategy::ALL[(idx + 1) % Strategy::ALL.len()]
    }

    pub fn from_str_loose(s: &str) -> Option<Strategy> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Some(Strategy::Direct),
            "contextual" => Some(Strategy::Contextual),
            "semantic" => Some(Strategy::Semantic),
            "specific" => Some(Strategy::Specific),
            "alternative" => Some(Strategy::Alternative),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snippet {
    pub text: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub score: Option<f32>,
}

#[derive(Debug, Clone, Default)]
pub struct RetrieverState {
    pub iteration: u32,
    pub attempted_queries: Vec<String>,
    pub attempted_strategies: Vec<Strategy>,
    pub gathered_snippets: Vec<Snippet>,
    pub quality_history: Vec<f32>,
}

impl RetrieverState {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if the no-progress guard fires: the last two iterations both
    /// scored below `threshold` (default 0.3, see DESIGN.md).
    pub fn no_progress(&self, threshold: f32) -> bool {
        let n = self.quality_history.len();
        n >= 2
            && self.quality_history[n - 1] < threshold
            && self.quality_history[n - 2] < threshold
    }

    pub fn best_score(&self) -> f32 {
        self.quality_history
            .iter()
            .copied()
            .fold(0.0_f32, f32::max)
    }
}
