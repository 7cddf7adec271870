pub mod handlers;
pub mod types;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::pipeline::MisusePipeline;

pub struct AppState {
    pub pipeline: Arc<MisusePipeline>,
    pub request_timeout: Duration,
}

pub fn router(pipeline: Arc<MisusePipeline>, request_timeout: Duration) -> Router {
    let state = Arc::new(AppState {
        pipeline,
        request_timeout,
    });

    Router::new()
        .route("/api/v1/health", get(handlers::health))
        .route("/api/v1/rules", get(handlers::rules))
        .route("/api/v1/detect", post(handlers::detect))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

pub async fn serve(
    pipeline: Arc<MisusePipeline>,
    host: &str,
    port: u16,
    request_timeout: Duration,
    shutdown: CancellationToken,
) -> eyre::Result<()> {
    let app = router(pipeline, request_timeout);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use async_trait::async_trait;

    use crate::config::Config;
    use crate::distance::DistanceProvider;
    use crate::misuse::types::{MisuseRule, RuleField, RuleOperator};

    fn app() -> Router {
        let pipeline = Arc::new(MisusePipeline::init(&Config::default()));
        router(pipeline, Duration::from_secs(5))
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn detect_request(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/v1/detect")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn sample(rules: Option<serde_json::Value>) -> serde_json::Value {
        let mut body = serde_json::json!({
            "cards": [
                {"id": "geo-1", "primaryCardholderName": "Geo User"},
                {"id": "idle-1", "primaryCardholderName": "Idle User"}
            ],
            "transactions": [
                {
                    "id": "txn-1",
                    "cardRecordId": "geo-1",
                    "transaction_datetime": "2024-05-01T10:00:00Z",
                    "transaction_store": "B&Q London",
                    "transaction_amount": 20.0,
                    "payer_name": "Geo User"
                },
                {
                    "id": "txn-2",
                    "cardRecordId": "geo-1",
                    "transaction_datetime": "2024-05-01T11:00:00Z",
                    "transaction_store": "B&Q New York",
                    "transaction_amount": 20.0,
                    "payer_name": "Geo User"
                }
            ]
        });
        if let Some(rules) = rules {
            body["rules"] = rules;
        }
        body
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(Request::get("/api/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["rules"], 3);
    }

    #[tokio::test]
    async fn test_detect_with_configured_rules() {
        let response = app().oneshot(detect_request(sample(None))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        let flagged = body["flaggedCards"].as_array().unwrap();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0]["id"], "geo-1");
        assert_eq!(flagged[0]["transactions"].as_array().unwrap().len(), 2);
        assert!(flagged[0]["reasons"][0]
            .as_str()
            .unwrap()
            .contains("store distance"));
        assert_eq!(body["cardsEvaluated"], 1);
        assert_eq!(body["cancelled"], false);
    }

    #[tokio::test]
    async fn test_detect_with_explicit_empty_rules() {
        let response = app()
            .oneshot(detect_request(sample(Some(serde_json::json!([])))))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert!(body["flaggedCards"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_detect_reports_rule_warnings() {
        let rules = serde_json::json!([
            {"id": "1", "field": "shoe_size", "operator": ">", "value": "9"},
            {"id": "2", "field": "stores_distance", "operator": ">", "value": "100"}
        ]);
        let response = app()
            .oneshot(detect_request(sample(Some(rules))))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["ruleWarnings"][0]["rule_id"], "1");
        assert_eq!(body["flaggedCards"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rules_echo_unknown_tags_verbatim() {
        let mut config = Config::default();
        config.detection.rules = vec![MisuseRule::new(
            "mcc",
            RuleField::Unknown("merchant_category".to_string()),
            RuleOperator::Unsupported("!=".to_string()),
            "5411",
        )];
        let pipeline = Arc::new(MisusePipeline::init(&config));
        let response = router(pipeline, Duration::from_secs(5))
            .oneshot(Request::get("/api/v1/rules").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["rules"][0]["field"], "merchant_category");
        assert_eq!(body["rules"][0]["operator"], "!=");
        assert!(body["warnings"][0]["problem"]
            .as_str()
            .unwrap()
            .contains("merchant_category"));
    }

    struct StalledProvider;

    #[async_trait]
    impl DistanceProvider for StalledProvider {
        async fn distance_km(&self, _from: &str, _to: &str) -> eyre::Result<Option<f64>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Some(10_000.0))
        }
    }

    #[tokio::test]
    async fn test_detect_deadline_returns_partial_report() {
        let mut config = Config::default();
        config.detection.distance_timeout_ms = 60_000;
        let pipeline = Arc::new(MisusePipeline::with_provider(&config, Arc::new(StalledProvider)));
        let app = router(pipeline, Duration::from_millis(20));

        let response = app.oneshot(detect_request(sample(None))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["cancelled"], true);
        assert_eq!(body["cardsEvaluated"], 0);
        assert!(body["flaggedCards"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_detect_rejects_bad_shape() {
        let body = serde_json::json!({"cards": [], "transactions": {"id": "txn-1"}});
        let response = app().oneshot(detect_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(!body["error"].as_str().unwrap().is_empty());
    }
}
