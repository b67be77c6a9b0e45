mod llm;
mod retrieval;

pub use llm::{complete_json, ChatMessage, CompletionOptions, HttpLlmClient, LlmClient, Role};
pub use retrieval::{HttpRetrievalClient, RetrievalClient};
