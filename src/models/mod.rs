mod plan;
mod retriever_state;

pub use plan::*;
pub use retriever_state::*;
