// CV screening: requirement proposals, per-CV assessment, caching and the
// bounded fan-out that scores a whole batch.
// All model calls go through llm_client.

pub mod backend;
pub mod cache;
pub mod handlers;
pub mod lock;
pub mod pipeline;
pub mod prompts;
pub mod requirements;
pub mod scorer;
