//! Writer Agent (§4.6): per-leaf draft/evaluate/accept-or-retry loop.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

use crate::clients::{complete_json, ChatMessage, CompletionOptions, LlmClient};
use crate::config::WriterConfig;
use crate::models::Plan;
use crate::orchestrator::ProgressTracker;

use super::Writer;

const DRAFT_SYSTEM_PROMPT: &str = r#"You are a technical writer producing one section of a document. You are
given the section's subtitle, its writing instructions, and evidence
gathered from research. Write 800-1200 characters of prose covering the
subtopic. Do not repeat the subtitle as a heading and do not use Markdown
formatting. Output only the prose."#;

const EVAL_SYSTEM_PROMPT: &str = r#"You are grading a draft document section for relevance, completeness, and
clarity against its writing instructions. Respond with JSON only, matching
exactly:
{"score": number between 0 and 100, "feedback": string}"#;

const PLACEHOLDER_PROSE: &str = "Content unavailable for this section.";

static HEADING_MARKERS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*#{1,6}\s*").expect("valid regex"));
static EMPHASIS_MARKERS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*|\*|__|_").expect("valid regex"));
static BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

#[derive(Debug, Deserialize)]
struct Evaluation {
    score: f32,
    feedback: String,
}

pub struct WriterAgent {
    llm: Arc<dyn LlmClient>,
    progress: Arc<ProgressTracker>,
    config: WriterConfig,
}

impl WriterAgent {
    pub fn new(llm: Arc<dyn LlmClient>, progress: Arc<ProgressTracker>, config: WriterConfig) -> Self {
        Self { llm, progress, config }
    }

    async fn draft(
        &self,
        subtitle: &str,
        how_to_write: &str,
        evidence: &str,
        feedback: Option<&str>,
    ) -> crate::error::Result<String> {
        let mut user_prompt = json!({
            "subtitle": subtitle,
            "how_to_write": how_to_write,
            "evidence": evidence,
        })
        .to_string();
        if let Some(feedback) = feedback {
            user_prompt.push_str(&format!(
                "\nThe previous attempt was rejected with this feedback: {feedback}\nRevise accordingly."
            ));
        }
        let messages = vec![ChatMessage::system(DRAFT_SYSTEM_PROMPT), ChatMessage::user(user_prompt)];
        self.llm.complete(&messages, CompletionOptions::default()).await
    }

    async fn evaluate(&self, subtitle: &str, how_to_write: &str, prose: &str) -> crate::error::Result<Evaluation> {
        let user_prompt = json!({
            "subtitle": subtitle,
            "how_to_write": how_to_write,
            "prose": prose,
        })
        .to_string();
        let messages = vec![ChatMessage::system(EVAL_SYSTEM_PROMPT), ChatMessage::user(user_prompt)];
        complete_json::<Evaluation>(self.llm.as_ref(), messages, "{score, feedback}").await
    }

    /// Run the draft/evaluate/accept-or-retry loop for one leaf and return
    /// its final prose, quality score, and the attempt it settled on.
    async fn write_leaf(
        &self,
        leaf_ref: (usize, usize),
        subtitle: &str,
        how_to_write: &str,
        evidence: &str,
    ) -> (String, f32, u32) {
        let mut feedback: Option<String> = None;
        let mut best: Option<(String, f32)> = None;
        let mut last_attempt = 0;

        for attempt in 0..self.config.max_attempts {
            last_attempt = attempt;
            let raw = match self.draft(subtitle, how_to_write, evidence, feedback.as_deref()).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(error = %e, attempt, subtitle, "writer draft call failed");
                    feedback = Some(format!("the previous draft attempt errored: {e}"));
                    continue;
                }
            };

            let (score, next_feedback) = match fast_check(&raw) {
                Some((score, reason)) => (score, reason),
                None => match self.evaluate(subtitle, how_to_write, &raw).await {
                    Ok(eval) => {
                        let normalized = eval.score / 100.0;
                        let normalized = if self.config.clamp_score {
                            normalized.clamp(0.0, 1.0)
                        } else {
                            normalized
                        };
                        (normalized, eval.feedback)
                    }
                    Err(e) => {
                        warn!(error = %e, attempt, subtitle, "writer evaluation call failed");
                        (0.0, format!("evaluation call failed: {e}"))
                    }
                },
            };

            let cleaned = clean_prose(&raw, subtitle);
            if best.as_ref().map_or(true, |(_, best_score)| score > *best_score) {
                best = Some((cleaned.clone(), score));
            }

            if score >= self.config.quality_threshold {
                self.progress.record_writer_leaf_done(leaf_ref, attempt, score);
                return (cleaned, score, attempt);
            }
            feedback = Some(next_feedback);
        }

        match best {
            Some((prose, score)) => {
                self.progress.record_writer_low_quality(leaf_ref, last_attempt, score);
                (prose, score, last_attempt)
            }
            None => {
                self.progress
                    .record_failure("writer", leaf_ref, "every draft attempt failed before producing prose");
                (PLACEHOLDER_PROSE.to_string(), 0.0, last_attempt)
            }
        }
    }
}

/// Deterministic rule check applied before spending a model call on
/// evaluation. Returns `Some((score, reason))` when the draft can be judged
/// without a model, `None` when it must go to `evaluate`.
fn fast_check(prose: &str) -> Option<(f32, String)> {
    let len = prose.chars().count();
    if len < 200 {
        return Some((0.1, "draft is too short".to_string()));
    }
    if len > 2000 {
        return Some((0.4, "draft is too long, tighten it".to_string()));
    }
    let trimmed = prose.trim();
    if trimmed.starts_with('[') && trimmed.ends_with(']') {
        return Some((0.0, "draft looks like an error envelope, regeneration needed".to_string()));
    }
    None
}

/// Strip the subtitle if the model echoed it back, remove Markdown
/// emphasis/heading markers, collapse excess blank lines, and trim trailing
/// per-line whitespace. Idempotent: cleaning already-clean prose is a no-op.
fn clean_prose(raw: &str, subtitle: &str) -> String {
    let mut text = raw.trim().to_string();
    text = strip_leading_subtitle(&text, subtitle);
    text = HEADING_MARKERS.replace_all(&text, "").into_owned();
    text = EMPHASIS_MARKERS.replace_all(&text, "").into_owned();
    text = BLANK_RUNS.replace_all(&text, "\n\n").into_owned();
    text = text
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n");
    text.trim().to_string()
}

fn strip_leading_subtitle(text: &str, subtitle: &str) -> String {
    let mut lines = text.lines();
    let Some(first_line) = lines.next() else {
        return text.to_string();
    };
    let normalized_first = first_line.trim_start_matches(['#', '*', ' ']).trim();
    if normalized_first.eq_ignore_ascii_case(subtitle.trim()) {
        lines.collect::<Vec<_>>().join("\n").trim_start_matches('\n').to_string()
    } else {
        text.to_string()
    }
}

#[async_trait::async_trait]
impl Writer for WriterAgent {
    async fn write(&self, mut plan: Plan) -> Plan {
        let semaphore = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let mut join_set = JoinSet::new();

        for (part_index, leaf_index) in plan.leaf_indices() {
            let Some(leaf) = plan.leaf(part_index, leaf_index) else {
                continue;
            };
            let subtitle = leaf.subtitle.clone();
            let how_to_write = leaf.how_to_write.clone();
            let evidence = leaf.evidence.clone();
            let sem = Arc::clone(&semaphore);
            let llm = Arc::clone(&self.llm);
            let progress = Arc::clone(&self.progress);
            let config = self.config.clone();

            join_set.spawn(async move {
                let _permit = sem.acquire_owned().await.expect("semaphore never closed");
                let worker = WriterAgent {
                    llm,
                    progress,
                    config,
                };
                let (prose, quality, _attempt) = worker
                    .write_leaf((part_index, leaf_index), &subtitle, &how_to_write, &evidence)
                    .await;
                (part_index, leaf_index, prose, quality)
            });
        }

        while let Some(result) = join_set.join_next().await {
            match result {
                Ok((part_index, leaf_index, prose, quality)) => {
                    if let Some(leaf) = plan.leaf_mut(part_index, leaf_index) {
                        leaf.prose = prose;
                        leaf.quality = quality;
                    }
                }
                Err(join_err) => {
                    warn!(error = %join_err, "writer worker task failed");
                }
            }
        }

        plan
    }
}
