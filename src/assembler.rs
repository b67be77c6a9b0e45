//! Assembler (§4.7): renders an enriched `Plan` to a single document string.
//! No reordering, no re-cleaning — the Writer already cleaned every leaf.

use crate::models::Plan;

/// Render `plan.parts` in declared order as `# title` / goal line / `##
/// subtitle` / prose, separated by blank lines.
pub fn assemble(plan: &Plan) -> String {
    let mut doc = String::new();

    for part in &plan.parts {
        doc.push_str(&format!("# {}\n\n", part.title));
        if !part.goal.is_empty() {
            doc.push_str(&format!("_{}_\n\n", part.goal));
        }
        for leaf in &part.leaves {
            doc.push_str(&format!("## {}\n\n", leaf.subtitle));
            doc.push_str(leaf.prose.trim());
            doc.push_str("\n\n");
        }
    }

    doc.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocKind, Leaf, Part};

    #[test]
    fn renders_parts_and_leaves_in_order() {
        let plan = Plan {
            request: "write a report".into(),
            doc_kind: DocKind::Technical,
            parts: vec![Part {
                title: "Introduction".into(),
                goal: "set the stage".into(),
                leaves: vec![Leaf {
                    subtitle: "Background".into(),
                    how_to_write: "explain it".into(),
                    evidence: "some evidence".into(),
                    quality: 0.9,
                    prose: "This is the background prose.".into(),
                }],
            }],
        };
        let doc = assemble(&plan);
        assert!(doc.starts_with("# Introduction"));
        assert!(doc.contains("## Background"));
        assert!(doc.contains("This is the background prose."));
    }

    #[test]
    fn empty_plan_renders_empty_document() {
        let plan = Plan {
            request: "r".into(),
            doc_kind: DocKind::Technical,
            parts: vec![],
        };
        assert_eq!(assemble(&plan), "");
    }
}
