mod planner;
mod retriever;
mod writer;

pub use planner::PlannerAgent;
pub use retriever::RetrieverAgent;
pub use writer::WriterAgent;

use async_trait::async_trait;

use crate::models::Plan;

/// Stage 1 of the pipeline: turn a request into a complete Plan with every
/// leaf's `how_to_write` populated (§4.4). Infallible at the trait boundary —
/// structure-phase and guidance-phase failures degrade internally rather
/// than propagate, per the spec's failure policy.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, request: &str) -> Plan;
}

/// Stage 2: attach a consolidated evidence string to every leaf (§4.5).
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn enrich(&self, plan: Plan) -> Plan;
}

/// Stage 3: produce final prose and quality for every leaf (§4.6).
#[async_trait]
pub trait Writer: Send + Sync {
    async fn write(&self, plan: Plan) -> Plan;
}
