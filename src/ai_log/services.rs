use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::prompt::{NormalizedPrompt, PromptRequest};
use super::repo;
use super::repo_types::{AiRequestLog, AiRequestStatus, NewAiRequestLog};
use crate::config::AiCacheScope;
use crate::error::{DataError, DataResult};
use crate::state::AppState;

/// What a model returned for one prompt.
#[derive(Debug, Clone)]
pub struct AiCompletion {
    pub response: String,
    pub model: String,
    pub tokens_used: Option<i32>,
    pub cost: Option<i32>,
}

/// The external model. Implementations live outside this crate.
#[async_trait]
pub trait RecipeGenerator: Send + Sync {
    fn model(&self) -> &str;
    async fn complete(&self, prompt: &NormalizedPrompt) -> anyhow::Result<AiCompletion>;
}

/// Lookup and write side of the request log.
#[async_trait]
pub trait PromptCache: Send + Sync {
    async fn find_success(
        &self,
        user_id: Uuid,
        prompt_hash: &str,
        scope: AiCacheScope,
    ) -> DataResult<Option<AiRequestLog>>;
    async fn record(&self, new: NewAiRequestLog) -> DataResult<AiRequestLog>;
}

#[derive(Clone)]
pub struct PgPromptCache {
    db: PgPool,
}

impl PgPromptCache {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PromptCache for PgPromptCache {
    async fn find_success(
        &self,
        user_id: Uuid,
        prompt_hash: &str,
        scope: AiCacheScope,
    ) -> DataResult<Option<AiRequestLog>> {
        repo::find_success(&self.db, user_id, prompt_hash, scope).await
    }

    async fn record(&self, new: NewAiRequestLog) -> DataResult<AiRequestLog> {
        repo::record(&self.db, new).await
    }
}

/// Longest model name the log stores.
const MODEL_NAME_MAX: usize = 50;

/// Model name as it goes into the log: trimmed, cut to fit, `unknown` when blank.
fn model_label(raw: &str) -> String {
    let name: String = raw.trim().chars().take(MODEL_NAME_MAX).collect();
    match name.trim_end() {
        "" => "unknown".to_string(),
        trimmed => trimmed.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub response: String,
    pub from_cache: bool,
    /// Log row that holds `response`; link AI recipes to it.
    pub log_id: Uuid,
}

/// Answers from a previous successful call when one exists, otherwise calls
/// the model and logs the outcome. Failures are logged too, never cached.
#[instrument(skip_all, fields(%user_id, ?scope))]
pub async fn generate_cached(
    cache: &dyn PromptCache,
    generator: &dyn RecipeGenerator,
    user_id: Uuid,
    request: &PromptRequest,
    scope: AiCacheScope,
) -> DataResult<CachedResponse> {
    let normalized = request.normalize();
    let prompt_hash = normalized.hash();

    if let Some(hit) = cache.find_success(user_id, &prompt_hash, scope).await? {
        if let (true, Some(response)) = (hit.is_cacheable(), hit.response) {
            info!(log_id = %hit.id, "AI cache hit");
            return Ok(CachedResponse {
                response,
                from_cache: true,
                log_id: hit.id,
            });
        }
    }

    let request_type = Some(normalized.request_type.clone()).filter(|t| !t.is_empty());
    let prompt = normalized.canonical();

    match generator.complete(&normalized).await {
        Ok(done) => {
            let log = cache
                .record(NewAiRequestLog {
                    user_id,
                    prompt_hash,
                    prompt,
                    response: Some(done.response.clone()),
                    model_used: model_label(&done.model),
                    tokens_used: done.tokens_used,
                    cost: done.cost,
                    request_type,
                    status: AiRequestStatus::Success,
                    error_message: None,
                })
                .await?;
            info!(log_id = %log.id, tokens = ?log.tokens_used, "AI call succeeded");
            Ok(CachedResponse {
                response: done.response,
                from_cache: false,
                log_id: log.id,
            })
        }
        Err(err) => {
            let message = format!("{err:#}");
            let log = cache
                .record(NewAiRequestLog {
                    user_id,
                    prompt_hash,
                    prompt,
                    response: None,
                    model_used: model_label(generator.model()),
                    tokens_used: None,
                    cost: None,
                    request_type,
                    status: AiRequestStatus::Error,
                    error_message: Some(message.clone()),
                })
                .await?;
            warn!(log_id = %log.id, error = %message, "AI call failed");
            Err(DataError::AiCall {
                log_id: log.id,
                message,
            })
        }
    }
}

/// `generate_cached` against the database, scoped by configuration.
pub async fn generate_for_user(
    st: &AppState,
    generator: &dyn RecipeGenerator,
    user_id: Uuid,
    request: &PromptRequest,
) -> DataResult<CachedResponse> {
    let cache = PgPromptCache::new(st.db.clone());
    generate_cached(&cache, generator, user_id, request, st.config.ai_cache_scope).await
}

#[cfg(test)]
mod services_tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use time::OffsetDateTime;

    use super::*;
    use crate::common::Audit;

    #[derive(Default)]
    struct MemoryCache {
        rows: Mutex<Vec<AiRequestLog>>,
    }

    impl MemoryCache {
        fn statuses(&self) -> Vec<AiRequestStatus> {
            self.rows.lock().unwrap().iter().map(|r| r.status).collect()
        }
    }

    #[async_trait]
    impl PromptCache for MemoryCache {
        async fn find_success(
            &self,
            user_id: Uuid,
            prompt_hash: &str,
            scope: AiCacheScope,
        ) -> DataResult<Option<AiRequestLog>> {
            let rows = self.rows.lock().unwrap();
            Ok(rows
                .iter()
                .rev()
                .find(|r| {
                    r.prompt_hash == prompt_hash
                        && r.is_cacheable()
                        && (scope == AiCacheScope::Global || r.user_id == user_id)
                })
                .cloned())
        }

        async fn record(&self, new: NewAiRequestLog) -> DataResult<AiRequestLog> {
            repo::validate(&new)?;
            let now = OffsetDateTime::now_utc();
            let row = AiRequestLog {
                id: Uuid::new_v4(),
                user_id: new.user_id,
                prompt_hash: new.prompt_hash,
                prompt: new.prompt,
                response: new.response,
                model_used: new.model_used,
                tokens_used: new.tokens_used,
                cost: new.cost,
                request_type: new.request_type,
                status: new.status,
                error_message: new.error_message,
                audit: Audit {
                    created_at: now,
                    updated_at: now,
                },
            };
            self.rows.lock().unwrap().push(row.clone());
            Ok(row)
        }
    }

    struct CountingGenerator {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingGenerator {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RecipeGenerator for CountingGenerator {
        fn model(&self) -> &str {
            "test-model"
        }

        async fn complete(&self, prompt: &NormalizedPrompt) -> anyhow::Result<AiCompletion> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("upstream timeout");
            }
            Ok(AiCompletion {
                response: format!("recipe #{n} from {}", prompt.ingredients.join(",")),
                model: "test-model".into(),
                tokens_used: Some(100),
                cost: Some(2),
            })
        }
    }

    /// Reports whatever model name it was built with.
    struct NamedGenerator {
        name: String,
        fail: bool,
    }

    #[async_trait]
    impl RecipeGenerator for NamedGenerator {
        fn model(&self) -> &str {
            &self.name
        }

        async fn complete(&self, _prompt: &NormalizedPrompt) -> anyhow::Result<AiCompletion> {
            if self.fail {
                anyhow::bail!("quota exceeded");
            }
            Ok(AiCompletion {
                response: "{\"title\":\"Pilaf\"}".into(),
                model: self.name.clone(),
                tokens_used: Some(900),
                cost: Some(7),
            })
        }
    }

    fn request(ingredients: &[&str]) -> PromptRequest {
        PromptRequest {
            request_type: "recipe_generation".into(),
            ingredients: ingredients.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn second_identical_request_is_served_from_cache() {
        let cache = MemoryCache::default();
        let model = CountingGenerator::new(false);
        let user = Uuid::new_v4();

        let first = generate_cached(&cache, &model, user, &request(&["eggs", "milk"]), AiCacheScope::User)
            .await
            .unwrap();
        let second = generate_cached(&cache, &model, user, &request(&["Milk ", "EGGS"]), AiCacheScope::User)
            .await
            .unwrap();

        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(first.response, second.response);
        assert_eq!(first.log_id, second.log_id);
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn failures_are_logged_and_not_reused() {
        let cache = MemoryCache::default();
        let broken = CountingGenerator::new(true);
        let user = Uuid::new_v4();

        let err = generate_cached(&cache, &broken, user, &request(&["rice"]), AiCacheScope::User)
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::AiCall { .. }));
        assert!(err.is_recoverable());

        let working = CountingGenerator::new(false);
        let ok = generate_cached(&cache, &working, user, &request(&["rice"]), AiCacheScope::User)
            .await
            .unwrap();
        assert!(!ok.from_cache);
        assert_eq!(working.calls(), 1);
        assert_eq!(
            cache.statuses(),
            vec![AiRequestStatus::Error, AiRequestStatus::Success]
        );
    }

    #[tokio::test]
    async fn user_scope_does_not_share_between_users() {
        let cache = MemoryCache::default();
        let model = CountingGenerator::new(false);
        let req = request(&["lentils"]);

        generate_cached(&cache, &model, Uuid::new_v4(), &req, AiCacheScope::User)
            .await
            .unwrap();
        let other = generate_cached(&cache, &model, Uuid::new_v4(), &req, AiCacheScope::User)
            .await
            .unwrap();

        assert!(!other.from_cache);
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn global_scope_shares_between_users() {
        let cache = MemoryCache::default();
        let model = CountingGenerator::new(false);
        let req = request(&["lentils"]);

        generate_cached(&cache, &model, Uuid::new_v4(), &req, AiCacheScope::Global)
            .await
            .unwrap();
        let other = generate_cached(&cache, &model, Uuid::new_v4(), &req, AiCacheScope::Global)
            .await
            .unwrap();

        assert!(other.from_cache);
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn odd_model_names_are_logged_and_the_response_kept() {
        let cache = MemoryCache::default();
        let user = Uuid::new_v4();
        let verbose = NamedGenerator {
            name: format!("  {}", "m".repeat(60)),
            fail: false,
        };

        let first = generate_cached(&cache, &verbose, user, &request(&["rice"]), AiCacheScope::User)
            .await
            .unwrap();
        assert!(!first.from_cache);
        assert_eq!(first.response, "{\"title\":\"Pilaf\"}");
        let again = generate_cached(&cache, &verbose, user, &request(&["rice"]), AiCacheScope::User)
            .await
            .unwrap();
        assert!(again.from_cache);

        let blank = NamedGenerator {
            name: "   ".into(),
            fail: true,
        };
        let err = generate_cached(&cache, &blank, user, &request(&["beans"]), AiCacheScope::User)
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::AiCall { .. }));

        let rows = cache.rows.lock().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].model_used, "m".repeat(MODEL_NAME_MAX));
        assert_eq!(rows[0].cost, Some(7));
        assert_eq!(rows[1].model_used, "unknown");
    }
}
