//! Persisted artifacts (§6): the Plan snapshot after each pipeline stage,
//! and the final assembled document, written under the configured output
//! directory.

use std::path::PathBuf;

use crate::error::Result;
use crate::models::Plan;
use crate::slug::slugify_truncate;

pub struct ArtifactWriter {
    dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Nest artifacts for one run under `base_dir/<slug of the request>`, the
    /// way the teacher names a run's output directory after its plan title.
    pub fn for_request(base_dir: impl Into<PathBuf>, request: &str) -> Self {
        let slug = slugify_truncate(request);
        Self {
            dir: base_dir.into().join(slug),
        }
    }

    async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// Write `plan_after_<stage>.json` (e.g. `planner`, `retriever`, `writer`).
    pub async fn write_plan_snapshot(&self, stage: &str, plan: &Plan) -> Result<PathBuf> {
        self.ensure_dir().await?;
        let path = self.dir.join(format!("plan_after_{stage}.json"));
        let json = serde_json::to_string_pretty(plan)?;
        tokio::fs::write(&path, json).await?;
        Ok(path)
    }

    /// Write the final assembled document.
    pub async fn write_document(&self, document: &str) -> Result<PathBuf> {
        self.ensure_dir().await?;
        let path = self.dir.join("document.md");
        tokio::fs::write(&path, document).await?;
        Ok(path)
    }
}
