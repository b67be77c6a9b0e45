//! Pipeline (§4.9): wires the four stages together in teacher order
//! (clients → rate limiter + progress tracker → planner → retriever →
//! writer → assembler), runs them strictly sequentially, and persists
//! artifacts after each stage.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use crate::assembler;
use crate::clients::{HttpLlmClient, HttpRetrievalClient, LlmClient, RetrievalClient};
use crate::config::Config;
use crate::error::Result;
use crate::orchestrator::{LeafFailure, ProgressTracker, RateLimiter};
use crate::output::ArtifactWriter;
use crate::phases::{Planner, PlannerAgent, Retriever, RetrieverAgent, Writer, WriterAgent};

/// Per-leaf failure notes plus call counters for one pipeline run. Produced
/// after the Assembler; not part of the Plan (§3).
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: String,
    pub finished_at: String,
    pub llm_calls: u64,
    pub retrieval_calls: u64,
    pub leaf_count: usize,
    pub writer_low_quality_leaves: u64,
    pub failures: Vec<LeafFailure>,
}

impl RunSummary {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct Pipeline {
    planner: Box<dyn Planner>,
    retriever: Box<dyn Retriever>,
    writer: Box<dyn Writer>,
    progress: Arc<ProgressTracker>,
    output_dir: PathBuf,
}

impl Pipeline {
    /// Construct a pipeline from a validated config. Fails fast with
    /// `ConfigurationInvalid` before any client is built.
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;

        let progress = Arc::new(ProgressTracker::new());
        let rate_limiter = Arc::new(RateLimiter::from_secs_f64(config.rate_limit.min_spacing_s));

        let llm: Arc<dyn LlmClient> = Arc::new(HttpLlmClient::new(
            config.llm.endpoint.clone(),
            config.llm.api_key.clone(),
            config.llm.model.clone(),
            config.llm.max_tokens,
            config.llm.temperature,
            Duration::from_secs(config.llm.timeout_s),
            config.llm.max_retries,
            Arc::clone(&rate_limiter),
            Arc::clone(&progress),
        )?);

        let retrieval: Arc<dyn RetrievalClient> = Arc::new(HttpRetrievalClient::new(
            config.retrieval.endpoint.clone(),
            Duration::from_secs(config.retrieval.timeout_s),
            config.retrieval.snippet_path.clone(),
        ));

        let planner: Box<dyn Planner> = Box::new(PlannerAgent::new(
            Arc::clone(&llm),
            Arc::clone(&progress),
            config.planner.workers,
        ));
        let retriever: Box<dyn Retriever> = Box::new(RetrieverAgent::new(
            Arc::clone(&llm),
            Arc::clone(&retrieval),
            Arc::clone(&progress),
            config.retriever.clone(),
        ));
        let writer: Box<dyn Writer> = Box::new(WriterAgent::new(
            Arc::clone(&llm),
            Arc::clone(&progress),
            config.writer.clone(),
        ));

        Ok(Self {
            planner,
            retriever,
            writer,
            progress,
            output_dir: config.output.dir.clone(),
        })
    }

    /// Build a pipeline from already-constructed stages, bypassing client
    /// construction — used by integration tests wiring in fake clients.
    pub fn from_stages(
        planner: Box<dyn Planner>,
        retriever: Box<dyn Retriever>,
        writer: Box<dyn Writer>,
        progress: Arc<ProgressTracker>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            planner,
            retriever,
            writer,
            progress,
            output_dir: output_dir.into(),
        }
    }

    pub async fn run(&self, request: &str) -> Result<(String, RunSummary)> {
        let started_at = Utc::now().to_rfc3339();
        let output = ArtifactWriter::for_request(self.output_dir.clone(), request);

        let plan = self.planner.plan(request).await;
        output.write_plan_snapshot("planner", &plan).await?;

        let plan = self.retriever.enrich(plan).await;
        output.write_plan_snapshot("retriever", &plan).await?;

        let plan = self.writer.write(plan).await;
        output.write_plan_snapshot("writer", &plan).await?;

        let document = assembler::assemble(&plan);
        output.write_document(&document).await?;

        let snapshot = self.progress.snapshot();
        let summary = RunSummary {
            started_at,
            finished_at: Utc::now().to_rfc3339(),
            llm_calls: snapshot.llm_calls,
            retrieval_calls: snapshot.retrieval_calls,
            leaf_count: plan.leaf_count(),
            writer_low_quality_leaves: snapshot.writer_low_quality_leaves,
            failures: snapshot.failures,
        };

        Ok((document, summary))
    }
}
