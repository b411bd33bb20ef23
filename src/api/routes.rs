use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::handlers::{cache, history, nl_query, targets, AppState};

/// Create router with application state
pub fn create_router_with_state(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/nl-query", post(nl_query::nl_query))
        .route("/api/history", get(history::list_history))
        .route("/api/targets", get(targets::list_targets))
        .route("/api/cache/stats", get(cache::cache_stats))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Dialect, ExecutionResult, SchemaDescription, TargetStore, TranslationResult};
    use crate::services::audit::AuditRecorder;
    use crate::services::background::BackgroundWriter;
    use crate::services::database::ExecutionError;
    use crate::services::identity::{HeaderIdentityProvider, PERMISSIONS_HEADER, USER_ID_HEADER};
    use crate::services::pipeline::{NlQueryPipeline, PipelineComponents, PipelineSettings};
    use crate::services::prompt_builder::Prompt;
    use crate::services::query_cache::QueryCache;
    use crate::services::query_executor::QueryExecutor;
    use crate::services::rate_limiter::RateLimiter;
    use crate::services::schema_service::SchemaProvider;
    use crate::services::translation_client::Translator;
    use crate::services::translation_stream::TranslationError;
    use crate::storage::SqliteStorage;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    struct FixedTranslator;

    #[async_trait]
    impl Translator for FixedTranslator {
        async fn translate(&self, _prompt: &Prompt) -> Result<TranslationResult, TranslationError> {
            Ok(TranslationResult::succeeded("SELECT id, email FROM customers LIMIT 5"))
        }
    }

    struct OneStore;

    #[async_trait]
    impl QueryExecutor for OneStore {
        fn target(&self, target_id: &str) -> Option<TargetStore> {
            (target_id == "sales").then(|| TargetStore {
                id: "sales".to_string(),
                dialect: Dialect::MySQL,
                description: Some("Sales warehouse".to_string()),
            })
        }

        fn targets(&self) -> Vec<TargetStore> {
            self.target("sales").into_iter().collect()
        }

        async fn execute(&self, _target_id: &str, _sql: &str, _question: &str) -> Result<ExecutionResult, ExecutionError> {
            Ok(ExecutionResult::new(vec![json!({"id": 1, "email": "grace@example.com"})], 2))
        }
    }

    #[async_trait]
    impl SchemaProvider for OneStore {
        async fn schema(&self, target_id: &str) -> Result<SchemaDescription, ExecutionError> {
            Ok(SchemaDescription::empty(target_id))
        }
    }

    async fn app(max_requests: usize) -> Router {
        let storage = Arc::new(SqliteStorage::in_memory().await.unwrap());
        let (background, _jobs) = BackgroundWriter::new(8);
        let executor = Arc::new(OneStore);

        let pipeline = NlQueryPipeline::new(
            PipelineComponents {
                cache: Arc::new(QueryCache::new(10, Duration::from_secs(60))),
                rate_limiter: Arc::new(RateLimiter::new(max_requests, Duration::from_secs(60))),
                translator: Arc::new(FixedTranslator),
                executor: executor.clone(),
                schemas: executor.clone(),
                patterns: None,
                audit: AuditRecorder::new(storage.clone(), background.clone()),
                background,
            },
            PipelineSettings {
                default_limit: 100,
                production: true,
            },
        );

        create_router_with_state(AppState {
            pipeline: Arc::new(pipeline),
            executor,
            audit_store: storage,
            identity: Arc::new(HeaderIdentityProvider),
        })
    }

    fn nl_request(user: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/nl-query")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(user) = user {
            builder = builder.header(USER_ID_HEADER, user);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app(10)
            .await
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_identity_is_unauthorized() {
        let response = app(10)
            .await
            .oneshot(nl_request(None, json!({"question": "count customers", "store_id": "sales"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_invalid_question_is_bad_request() {
        let response = app(10)
            .await
            .oneshot(nl_request(Some("u1"), json!({"question": "  ", "store_id": "sales"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_stream_carries_status_result_and_end() {
        let response = app(10)
            .await
            .oneshot(nl_request(Some("u1"), json!({"question": "list customers", "store_id": "sales"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream"));

        let body = body_text(response).await;
        assert!(body.contains("event: status"));
        assert!(body.contains("event: result"));
        assert!(body.trim_end().ends_with("data: {\"type\":\"end\"}"));
        assert!(!body.contains("event: error"));
        assert!(!body.contains("grace@example.com"));
    }

    #[tokio::test]
    async fn test_rate_limit_rejected_with_retry_after() {
        let app = app(1).await;
        let first = app
            .clone()
            .oneshot(nl_request(Some("u1"), json!({"question": "list customers", "store_id": "sales"})))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        body_text(first).await;

        let second = app
            .oneshot(nl_request(Some("u1"), json!({"question": "list customers", "store_id": "sales"})))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(second.headers().contains_key(header::RETRY_AFTER));
    }

    #[tokio::test]
    async fn test_history_lists_own_records() {
        let app = app(10).await;
        let response = app
            .clone()
            .oneshot(nl_request(Some("u1"), json!({"question": "list customers", "store_id": "sales"})))
            .await
            .unwrap();
        body_text(response).await;

        let request = |user: &str| {
            Request::builder()
                .uri("/api/history?limit=5")
                .header(USER_ID_HEADER, user)
                .header(PERMISSIONS_HEADER, "")
                .body(Body::empty())
                .unwrap()
        };

        let body: Value = serde_json::from_str(&body_text(app.clone().oneshot(request("u1")).await.unwrap()).await).unwrap();
        assert_eq!(body["records"].as_array().unwrap().len(), 1);
        assert_eq!(body["records"][0]["status"], "success");

        let body: Value = serde_json::from_str(&body_text(app.oneshot(request("u2")).await.unwrap()).await).unwrap();
        assert!(body["records"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_targets_and_cache_stats() {
        let app = app(10).await;
        let response = app
            .clone()
            .oneshot(Request::builder().uri("/api/targets").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["targets"][0]["id"], "sales");
        assert_eq!(body["targets"][0]["dialect"], "mysql");
        assert!(body["targets"][0].get("url").is_none());

        let response = app
            .oneshot(Request::builder().uri("/api/cache/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["size"], 0);
        assert_eq!(body["stats"]["hits"], 0);
    }
}
