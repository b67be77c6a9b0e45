//! Thread-safe progress counters and structured log emission (§2, §4.4).

use std::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct ProgressSnapshot {
    pub llm_calls: u64,
    pub retrieval_calls: u64,
    pub planner_parts_done: u64,
    pub retriever_leaves_done: u64,
    pub writer_leaves_done: u64,
    pub writer_low_quality_leaves: u64,
    pub failures: Vec<LeafFailure>,
}

#[derive(Debug, Clone)]
pub struct LeafFailure {
    pub stage: &'static str,
    pub part_index: usize,
    pub leaf_index: usize,
    pub reason: String,
}

#[derive(Default)]
struct Counters {
    llm_calls: u64,
    retrieval_calls: u64,
    planner_parts_done: u64,
    retriever_leaves_done: u64,
    writer_leaves_done: u64,
    writer_low_quality_leaves: u64,
    failures: Vec<LeafFailure>,
}

/// Mutex-protected counters shared by every stage and every worker in a
/// pipeline run.
pub struct ProgressTracker {
    counters: Mutex<Counters>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(Counters::default()),
        }
    }

    pub fn record_llm_call(&self, stage: &str, leaf: Option<(usize, usize)>) {
        let mut c = self.counters.lock().expect("progress mutex poisoned");
        c.llm_calls += 1;
        info!(stage, ?leaf, total_llm_calls = c.llm_calls, "llm call completed");
    }

    pub fn record_retrieval_call(&self, leaf: (usize, usize), snippet_count: usize) {
        let mut c = self.counters.lock().expect("progress mutex poisoned");
        c.retrieval_calls += 1;
        info!(
            part_index = leaf.0,
            leaf_index = leaf.1,
            snippet_count,
            total_retrieval_calls = c.retrieval_calls,
            "retrieval call completed"
        );
    }

    pub fn record_planner_part_done(&self, part_index: usize) {
        let mut c = self.counters.lock().expect("progress mutex poisoned");
        c.planner_parts_done += 1;
        info!(part_index, "planner guidance phase completed part");
    }

    pub fn record_retriever_leaf_done(&self, leaf: (usize, usize), iteration: u32, score: f32) {
        let mut c = self.counters.lock().expect("progress mutex poisoned");
        c.retriever_leaves_done += 1;
        info!(
            part_index = leaf.0,
            leaf_index = leaf.1,
            iteration,
            score,
            "retriever leaf completed"
        );
    }

    pub fn record_writer_leaf_done(&self, leaf: (usize, usize), attempt: u32, score: f32) {
        let mut c = self.counters.lock().expect("progress mutex poisoned");
        c.writer_leaves_done += 1;
        info!(
            part_index = leaf.0,
            leaf_index = leaf.1,
            iteration = attempt,
            score,
            "writer leaf completed"
        );
    }

    /// A leaf that exhausted its attempt budget without reaching the
    /// quality threshold. Distinct from `record_failure`: the leaf still has
    /// prose (its best attempt), it's just flagged low-quality in the log.
    pub fn record_writer_low_quality(&self, leaf: (usize, usize), attempt: u32, score: f32) {
        let mut c = self.counters.lock().expect("progress mutex poisoned");
        c.writer_low_quality_leaves += 1;
        warn!(
            part_index = leaf.0,
            leaf_index = leaf.1,
            attempt,
            score,
            total_low_quality = c.writer_low_quality_leaves,
            "writer leaf exhausted attempt budget below quality threshold"
        );
    }

    pub fn record_failure(&self, stage: &'static str, leaf: (usize, usize), reason: impl Into<String>) {
        let reason = reason.into();
        let mut c = self.counters.lock().expect("progress mutex poisoned");
        warn!(stage, part_index = leaf.0, leaf_index = leaf.1, %reason, "leaf failed");
        c.failures.push(LeafFailure {
            stage,
            part_index: leaf.0,
            leaf_index: leaf.1,
            reason,
        });
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let c = self.counters.lock().expect("progress mutex poisoned");
        ProgressSnapshot {
            llm_calls: c.llm_calls,
            retrieval_calls: c.retrieval_calls,
            planner_parts_done: c.planner_parts_done,
            retriever_leaves_done: c.retriever_leaves_done,
            writer_leaves_done: c.writer_leaves_done,
            writer_low_quality_leaves: c.writer_low_quality_leaves,
            failures: c.failures.clone(),
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let tracker = ProgressTracker::new();
        tracker.record_llm_call("planner", None);
        tracker.record_llm_call("retriever", Some((0, 0)));
        tracker.record_failure("writer", (1, 2), "model timeout");
        let snap = tracker.snapshot();
        assert_eq!(snap.llm_calls, 2);
        assert_eq!(snap.failures.len(), 1);
        assert_eq!(snap.failures[0].part_index, 1);
    }
}
