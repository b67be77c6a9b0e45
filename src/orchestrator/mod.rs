mod progress;
mod rate_limiter;

pub use progress::{LeafFailure, ProgressSnapshot, ProgressTracker};
pub use rate_limiter::RateLimiter;
