//! Log of external AI calls, doubling as a response cache keyed by prompt hash.

pub mod prompt;
pub mod repo;
pub mod repo_types;
pub mod services;

pub use prompt::{NormalizedPrompt, PromptRequest};
pub use repo_types::{AiRequestLog, AiRequestStatus, AiUsage, NewAiRequestLog};
pub use services::{
    generate_cached, generate_for_user, AiCompletion, CachedResponse, PgPromptCache, PromptCache,
    RecipeGenerator,
};
