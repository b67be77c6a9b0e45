//! Planner Agent (§4.4): two-phase plan generation.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

use crate::clients::{complete_json, ChatMessage, LlmClient};
use crate::models::{DocKind, Leaf, Part, Plan};
use crate::orchestrator::ProgressTracker;

use super::Planner;

const STRUCTURE_SYSTEM_PROMPT: &str = r#"You are a technical document planner. Given a free-form request, classify
the kind of document it calls for and produce a hierarchical outline.

Respond with JSON only, matching exactly:
{"doc_kind": "technical" | "user_manual" | "research" | "tutorial",
 "parts": [{"title": string, "goal": string, "leaves": [{"subtitle": string}]}]}

`goal` explains why the part exists. Produce enough parts and leaves to
cover the request thoroughly. Do not include any text outside the JSON."#;

const GUIDANCE_SYSTEM_PROMPT: &str = r#"You are a technical document planner. You will be given a part of a
document outline (its title and goal) and the subtitles of its leaves.
Produce a 100-200 character writing instruction for every leaf.

Respond with JSON only, matching exactly:
{"guides": [{"subtitle": string, "how_to_write": string}]}

There must be exactly one guide per subtitle given, with the subtitle
copied verbatim. Do not include any text outside the JSON."#;

const NEUTRAL_INSTRUCTION: &str =
    "Write clear, well-organized prose covering this subtopic in the context of the overall document.";

#[derive(Debug, Deserialize)]
struct StructureOutline {
    doc_kind: DocKind,
    parts: Vec<PartOutline>,
}

#[derive(Debug, Deserialize)]
struct PartOutline {
    title: String,
    goal: String,
    leaves: Vec<LeafOutline>,
}

#[derive(Debug, Deserialize)]
struct LeafOutline {
    subtitle: String,
}

#[derive(Debug, Deserialize)]
struct GuidanceBatch {
    guides: Vec<Guide>,
}

#[derive(Debug, Deserialize)]
struct Guide {
    subtitle: String,
    how_to_write: String,
}

impl StructureOutline {
    fn into_plan(self, request: &str) -> Plan {
        Plan {
            request: request.to_string(),
            doc_kind: self.doc_kind,
            parts: self
                .parts
                .into_iter()
                .map(|p| Part {
                    title: p.title,
                    goal: p.goal,
                    leaves: p.leaves.into_iter().map(|l| Leaf::new(l.subtitle)).collect(),
                })
                .collect(),
        }
    }
}

pub struct PlannerAgent {
    llm: Arc<dyn LlmClient>,
    progress: Arc<ProgressTracker>,
    workers: usize,
}

impl PlannerAgent {
    pub fn new(llm: Arc<dyn LlmClient>, progress: Arc<ProgressTracker>, workers: usize) -> Self {
        Self {
            llm,
            progress,
            workers: workers.max(1),
        }
    }

    async fn structure_phase(&self, request: &str) -> Plan {
        let messages = vec![
            ChatMessage::system(STRUCTURE_SYSTEM_PROMPT),
            ChatMessage::user(request),
        ];
        match complete_json::<StructureOutline>(
            self.llm.as_ref(),
            messages,
            "{doc_kind, parts:[{title, goal, leaves:[{subtitle}]}]}",
        )
        .await
        {
            Ok(outline) => outline.into_plan(request),
            Err(e) => {
                warn!(error = %e, "planner structure phase failed after retries, using default skeleton");
                Plan::default_skeleton(request)
            }
        }
    }

    async fn guidance_phase(&self, mut plan: Plan) -> Plan {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut join_set = JoinSet::new();

        for (part_index, part) in plan.parts.iter().enumerate() {
            let llm = Arc::clone(&self.llm);
            let progress = Arc::clone(&self.progress);
            let sem = Arc::clone(&semaphore);
            let title = part.title.clone();
            let goal = part.goal.clone();
            let subtitles: Vec<String> = part.leaves.iter().map(|l| l.subtitle.clone()).collect();

            join_set.spawn(async move {
                let _permit = sem.acquire_owned().await.expect("semaphore never closed");
                let guides = run_guidance_call(llm.as_ref(), &title, &goal, &subtitles).await;
                progress.record_planner_part_done(part_index);
                (part_index, guides)
            });
        }

        while let Some(result) = join_set.join_next().await {
            match result {
                Ok((part_index, guides)) => apply_guides(&mut plan, part_index, &guides),
                Err(join_err) => warn!(error = %join_err, "guidance phase worker task failed"),
            }
        }

        plan
    }
}

async fn run_guidance_call(
    llm: &dyn LlmClient,
    title: &str,
    goal: &str,
    subtitles: &[String],
) -> HashMap<String, String> {
    let subtitle_list = subtitles
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {}", i + 1, s))
        .collect::<Vec<_>>()
        .join("\n");
    let user_prompt = format!(
        "Part title: {title}\nPart goal: {goal}\nLeaves:\n{subtitle_list}"
    );
    let messages = vec![
        ChatMessage::system(GUIDANCE_SYSTEM_PROMPT),
        ChatMessage::user(user_prompt),
    ];

    match complete_json::<GuidanceBatch>(llm, messages, "{guides:[{subtitle, how_to_write}]}").await {
        Ok(batch) => batch
            .guides
            .into_iter()
            .map(|g| (g.subtitle, g.how_to_write))
            .collect(),
        Err(e) => {
            warn!(error = %e, part = title, "guidance phase failed for part, using defaults for all leaves");
            HashMap::new()
        }
    }
}

fn apply_guides(plan: &mut Plan, part_index: usize, guides: &HashMap<String, String>) {
    let Some(part) = plan.parts.get_mut(part_index) else {
        return;
    };
    for leaf in part.leaves.iter_mut() {
        match guides.get(&leaf.subtitle) {
            Some(instruction) => leaf.how_to_write = instruction.clone(),
            None => {
                warn!(subtitle = %leaf.subtitle, "no guidance returned for leaf, using neutral default");
                leaf.how_to_write = NEUTRAL_INSTRUCTION.to_string();
            }
        }
    }
}

#[async_trait::async_trait]
impl Planner for PlannerAgent {
    async fn plan(&self, request: &str) -> Plan {
        let plan = self.structure_phase(request).await;
        self.guidance_phase(plan).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::CompletionOptions;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex as AsyncMutex;

    struct ScriptedLlm {
        responses: AsyncMutex<Vec<String>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, _messages: &[ChatMessage], _options: CompletionOptions) -> crate::error::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().await;
            Ok(responses.remove(0))
        }
    }

    #[tokio::test]
    async fn structure_phase_falls_back_to_skeleton_on_repeated_malformed_output() {
        let llm = ScriptedLlm {
            responses: AsyncMutex::new(vec![
                "not json".into(),
                "still not json".into(),
                "nope".into(),
            ]),
            calls: AtomicUsize::new(0),
        };
        let agent = PlannerAgent::new(Arc::new(llm), Arc::new(ProgressTracker::new()), 1);
        let plan = agent.structure_phase("write a report").await;
        assert_eq!(plan.parts.len(), 1);
        assert_eq!(plan.parts[0].leaves.len(), 3);
    }

    #[tokio::test]
    async fn guidance_phase_fills_every_leaf_and_defaults_unmatched() {
        let structure_response = r#"{"doc_kind":"technical","parts":[
            {"title":"Intro","goal":"set the stage","leaves":[{"subtitle":"Background"},{"subtitle":"Scope"}]}
        ]}"#;
        let guidance_response = r#"{"guides":[{"subtitle":"Background","how_to_write":"Explain the background context clearly and concisely for the reader."}]}"#;

        let llm = ScriptedLlm {
            responses: AsyncMutex::new(vec![structure_response.into(), guidance_response.into()]),
            calls: AtomicUsize::new(0),
        };
        let agent = PlannerAgent::new(Arc::new(llm), Arc::new(ProgressTracker::new()), 1);
        let plan = agent.plan("write a report").await;

        assert_eq!(plan.parts[0].leaves[0].how_to_write, "Explain the background context clearly and concisely for the reader.");
        assert_eq!(plan.parts[0].leaves[1].how_to_write, NEUTRAL_INSTRUCTION);
    }
}
