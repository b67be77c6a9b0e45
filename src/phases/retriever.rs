//! Retriever Agent (§4.5): per-leaf reason/act/observe/reflect loop.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

use crate::clients::{complete_json, ChatMessage, LlmClient, RetrievalClient};
use crate::config::RetrieverConfig;
use crate::json_utils::extract_float_score;
use crate::models::{Plan, RetrieverState, Snippet, Strategy};
use crate::orchestrator::ProgressTracker;

use super::Retriever;

const REASON_ACT_SYSTEM_PROMPT: &str = r#"You are a research assistant deciding how to search for evidence for one
section of a document. You are given the section's subtitle, its writing
instructions, the queries already attempted, the quality scores so far, and
the available search strategies. Choose exactly one strategy and produce
3-5 comma-separated search keywords.

Respond with JSON only, matching exactly:
{"analysis": string, "strategy": "direct" | "contextual" | "semantic" | "specific" | "alternative", "keywords": string}

`keywords` must be a single string of 3 to 5 comma-separated terms."#;

const OBSERVE_SYSTEM_PROMPT: &str = r#"You are scoring the usefulness of retrieved evidence for a document
section, on relevance, completeness, and utility. Respond with a single
floating-point number between 0 and 1 and nothing else."#;

#[derive(Debug, Deserialize)]
struct ReasonAct {
    #[allow(dead_code)]
    analysis: String,
    strategy: String,
    keywords: String,
}

pub struct RetrieverAgent {
    llm: Arc<dyn LlmClient>,
    retrieval: Arc<dyn RetrievalClient>,
    progress: Arc<ProgressTracker>,
    config: RetrieverConfig,
}

impl RetrieverAgent {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        retrieval: Arc<dyn RetrievalClient>,
        progress: Arc<ProgressTracker>,
        config: RetrieverConfig,
    ) -> Self {
        Self {
            llm,
            retrieval,
            progress,
            config,
        }
    }

    async fn reason_and_act(&self, subtitle: &str, how_to_write: &str, state: &RetrieverState) -> (Strategy, Vec<String>) {
        let available: Vec<&str> = Strategy::ALL.iter().map(Strategy::semantic_hint).collect();
        let user_prompt = json!({
            "subtitle": subtitle,
            "how_to_write": how_to_write,
            "attempted_queries": state.attempted_queries,
            "quality_history": state.quality_history,
            "available_strategies": available,
        })
        .to_string();

        let messages = vec![
            ChatMessage::system(REASON_ACT_SYSTEM_PROMPT),
            ChatMessage::user(user_prompt),
        ];

        match complete_json::<ReasonAct>(self.llm.as_ref(), messages, "{analysis, strategy, keywords}").await {
            Ok(parsed) => {
                let strategy = Strategy::from_str_loose(&parsed.strategy).unwrap_or(Strategy::Direct);
                let keywords = split_keywords(&parsed.keywords);
                (strategy, keywords)
            }
            Err(e) => {
                warn!(error = %e, subtitle, "reason/act call failed, defaulting to direct strategy on the subtitle");
                (Strategy::Direct, split_keywords(subtitle))
            }
        }
    }

    async fn observe(&self, subtitle: &str, how_to_write: &str, query: &str, snippets: &[Snippet]) -> f32 {
        let preview: Vec<&str> = snippets.iter().take(3).map(|s| s.text.as_str()).collect();
        let user_prompt = json!({
            "subtitle": subtitle,
            "how_to_write": how_to_write,
            "query": query,
            "snippets": preview,
        })
        .to_string();
        let messages = vec![
            ChatMessage::system(OBSERVE_SYSTEM_PROMPT),
            ChatMessage::user(user_prompt),
        ];

        match self.llm.complete(&messages, Default::default()).await {
            Ok(text) => extract_float_score(&text).unwrap_or_else(|| {
                warn!(response = %text, "observe call returned no parseable score, defaulting to 0.0");
                0.0
            }),
            Err(e) => {
                warn!(error = %e, "observe call failed, defaulting to score 0.0");
                0.0
            }
        }
    }

    /// Run the reason/act/observe/reflect loop for one leaf and return its
    /// consolidated evidence string.
    async fn run_leaf(&self, leaf_ref: (usize, usize), subtitle: &str, how_to_write: &str) -> (String, u32, f32) {
        let mut state = RetrieverState::new();
        let mut best_query_snippets: Vec<Snippet> = Vec::new();
        let mut best_score = f32::MIN;

        loop {
            let (mut strategy, mut keywords) = self.reason_and_act(subtitle, how_to_write, &state).await;

            let query_key = keywords.join(",");
            if state.attempted_queries.iter().any(|q| q == &query_key) {
                // Deterministic perturbation: the model repeated a
                // byte-identical keyword list, so rotate to the next unused
                // strategy in the closed set and swap in a keyword derived
                // from it instead of re-issuing the same query.
                let mut candidate = strategy.next();
                while state.attempted_strategies.contains(&candidate) && candidate != strategy {
                    candidate = candidate.next();
                }
                strategy = candidate;
                if let Some(last) = keywords.last_mut() {
                    *last = strategy
                        .semantic_hint()
                        .split_whitespace()
                        .next()
                        .unwrap_or("alternative")
                        .to_string();
                } else {
                    keywords.push(strategy.semantic_hint().to_string());
                }
            }

            state.attempted_strategies.push(strategy);
            state.attempted_queries.push(keywords.join(","));

            let snippets = self.retrieval.search(&keywords).await;
            self.progress.record_retrieval_call(leaf_ref, snippets.len());

            for snippet in &snippets {
                if !state.gathered_snippets.iter().any(|g| g.text == snippet.text) {
                    state.gathered_snippets.push(snippet.clone());
                }
            }

            let score = self
                .observe(subtitle, how_to_write, &keywords.join(","), &snippets)
                .await;
            state.quality_history.push(score);
            if score > best_score {
                best_score = score;
                best_query_snippets = snippets;
            }

            let reached_threshold = score >= self.config.quality_threshold;
            let no_progress = state.no_progress(self.config.no_progress_threshold);
            let at_budget = state.iteration + 1 == self.config.max_iterations;

            if reached_threshold || no_progress || at_budget {
                let evidence = if state.gathered_snippets.is_empty() {
                    String::new()
                } else {
                    best_query_snippets
                        .iter()
                        .take(self.config.evidence_top_k)
                        .map(|s| s.text.as_str())
                        .collect::<Vec<_>>()
                        .join("\n\n")
                };
                return (evidence, state.iteration, score);
            }

            state.iteration += 1;
        }
    }
}

fn split_keywords(raw: &str) -> Vec<String> {
    let tokens: Vec<String> = raw
        .split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.is_empty() {
        vec![raw.trim().to_string()]
    } else {
        tokens
    }
}

#[async_trait::async_trait]
impl Retriever for RetrieverAgent {
    async fn enrich(&self, mut plan: Plan) -> Plan {
        let semaphore = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let mut join_set = JoinSet::new();

        for (part_index, leaf_index) in plan.leaf_indices() {
            let Some(leaf) = plan.leaf(part_index, leaf_index) else {
                continue;
            };
            let subtitle = leaf.subtitle.clone();
            let how_to_write = leaf.how_to_write.clone();
            let sem = Arc::clone(&semaphore);
            let progress = Arc::clone(&self.progress);
            // Each worker only needs `Arc`-cloned handles to the clients and
            // a copy of the (small) config, so a fresh `RetrieverAgent` is
            // built per task rather than sharing `self` across the spawn.
            let llm = Arc::clone(&self.llm);
            let retrieval = Arc::clone(&self.retrieval);
            let config = self.config.clone();

            join_set.spawn(async move {
                let _permit = sem.acquire_owned().await.expect("semaphore never closed");
                let worker = RetrieverAgent {
                    llm,
                    retrieval,
                    progress: Arc::clone(&progress),
                    config,
                };
                let (evidence, iteration, score) = worker
                    .run_leaf((part_index, leaf_index), &subtitle, &how_to_write)
                    .await;
                progress.record_retriever_leaf_done((part_index, leaf_index), iteration, score);
                (part_index, leaf_index, evidence)
            });
        }

        while let Some(result) = join_set.join_next().await {
            match result {
                Ok((part_index, leaf_index, evidence)) => {
                    if let Some(leaf) = plan.leaf_mut(part_index, leaf_index) {
                        leaf.evidence = evidence;
                    }
                }
                Err(join_err) => {
                    warn!(error = %join_err, "retriever worker task failed");
                }
            }
        }

        plan
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

    struct EmptyRetrieval;

    #[async_trait]
    impl RetrievalClient for EmptyRetrieval {
        async fn search(&self, _keywords: &[String]) -> Vec<Snippet> {
            Vec::new()
        }
    }

    struct FixedRetrieval(Vec<Snippet>);

    #[async_trait]
    impl RetrievalClient for FixedRetrieval {
        async fn search(&self, _keywords: &[String]) -> Vec<Snippet> {
            self.0.clone()
        }
    }

    fn reason_act_response(strategy: &str, keywords: &str) -> String {
        json!({"analysis": "looking", "strategy": strategy, "keywords": keywords}).to_string()
    }

    #[tokio::test]
    async fn empty_retrieval_yields_empty_evidence_and_completes() {
        let llm = ScriptedLlm {
            responses: AsyncMutex::new(vec![
                reason_act_response("direct", "alpha, beta, gamma"),
                "0.1".into(),
                reason_act_response("contextual", "alpha, beta, delta"),
                "0.2".into(),
                reason_act_response("semantic", "alpha, beta, epsilon"),
                "0.3".into(),
            ]),
            calls: AtomicUsize::new(0),
        };
        let agent = RetrieverAgent::new(
            Arc::new(llm),
            Arc::new(EmptyRetrieval),
            Arc::new(ProgressTracker::new()),
            RetrieverConfig {
                workers: 1,
                max_iterations: 3,
                quality_threshold: 0.7,
                no_progress_threshold: 0.3,
                evidence_top_k: 5,
            },
        );
        let (evidence, iteration, _score) = agent.run_leaf((0, 0), "Background", "explain it").await;
        assert_eq!(evidence, "");
        assert_eq!(iteration, 2);
    }

    #[tokio::test]
    async fn no_progress_guard_exits_after_two_low_scores() {
        let llm = ScriptedLlm {
            responses: AsyncMutex::new(vec![
                reason_act_response("direct", "alpha, beta, gamma"),
                "0.2".into(),
                reason_act_response("contextual", "alpha, beta, delta"),
                "0.25".into(),
            ]),
            calls: AtomicUsize::new(0),
        };
        let agent = RetrieverAgent::new(
            Arc::new(llm),
            Arc::new(EmptyRetrieval),
            Arc::new(ProgressTracker::new()),
            RetrieverConfig {
                workers: 1,
                max_iterations: 5,
                quality_threshold: 0.7,
                no_progress_threshold: 0.3,
                evidence_top_k: 5,
            },
        );
        let (_evidence, iteration, _score) = agent.run_leaf((0, 0), "Background", "explain it").await;
        // iteration is 0-based; two attempts means it stopped at iteration 1
        assert_eq!(iteration, 1);
    }

    #[tokio::test]
    async fn high_score_exits_early_and_evidence_uses_top_k() {
        let snippets = vec![
            Snippet { text: "s1".into(), source: None, score: None },
            Snippet { text: "s2".into(), source: None, score: None },
        ];
        let llm = ScriptedLlm {
            responses: AsyncMutex::new(vec![
                reason_act_response("direct", "alpha, beta, gamma"),
                "0.9".into(),
            ]),
            calls: AtomicUsize::new(0),
        };
        let agent = RetrieverAgent::new(
            Arc::new(llm),
            Arc::new(FixedRetrieval(snippets)),
            Arc::new(ProgressTracker::new()),
            RetrieverConfig {
                workers: 1,
                max_iterations: 3,
                quality_threshold: 0.7,
                no_progress_threshold: 0.3,
                evidence_top_k: 5,
            },
        );
        let (evidence, iteration, score) = agent.run_leaf((0, 0), "Background", "explain it").await;
        assert_eq!(iteration, 0);
        assert_eq!(score, 0.9);
        assert_eq!(evidence, "s1\n\ns2");
    }

    #[tokio::test]
    async fn repeated_keyword_list_is_perturbed_not_reissued() {
        let llm = ScriptedLlm {
            responses: AsyncMutex::new(vec![
                reason_act_response("direct", "alpha, beta, gamma"),
                "0.1".into(),
                reason_act_response("direct", "alpha, beta, gamma"),
                "0.1".into(),
                reason_act_response("direct", "alpha, beta, gamma"),
                "0.1".into(),
            ]),
            calls: AtomicUsize::new(0),
        };
        let agent = RetrieverAgent::new(
            Arc::new(llm),
            Arc::new(EmptyRetrieval),
            Arc::new(ProgressTracker::new()),
            RetrieverConfig {
                workers: 1,
                max_iterations: 3,
                quality_threshold: 0.99,
                no_progress_threshold: 0.0,
                evidence_top_k: 5,
            },
        );
        let (_evidence, iteration, _score) = agent.run_leaf((0, 0), "Background", "explain it").await;
        assert_eq!(iteration, 2);
    }
}
