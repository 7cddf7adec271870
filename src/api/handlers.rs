use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use std::pin::pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::misuse::types::validate_rules;

use super::types::*;
use super::AppState;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

fn api_error(status: StatusCode, msg: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: msg.into(),
        }),
    )
}

// ============================================================
// Health & Rules
// ============================================================

pub async fn health(State(state): State<Arc<AppState>>) -> ApiResult<HealthResponse> {
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        rules: state.pipeline.default_rules.len(),
    }))
}

pub async fn rules(State(state): State<Arc<AppState>>) -> ApiResult<RulesResponse> {
    let rules = state.pipeline.default_rules.clone();
    let warnings = validate_rules(&rules);
    Ok(Json(RulesResponse { rules, warnings }))
}

// ============================================================
// Detection
// ============================================================

pub async fn detect(
    State(state): State<Arc<AppState>>,
    body: Result<Json<DetectRequest>, JsonRejection>,
) -> ApiResult<DetectResponse> {
    let Json(request) = body.map_err(|e| api_error(StatusCode::BAD_REQUEST, e.body_text()))?;
    let rules = request
        .rules
        .unwrap_or_else(|| state.pipeline.default_rules.clone());

    // Bound the pass by the request deadline; cards not reached in time are omitted
    let deadline = CancellationToken::new();
    let mut run = pin!(state
        .pipeline
        .run(&request.cards, &request.transactions, &rules, &deadline));

    let (report, rule_warnings) = tokio::select! {
        finished = &mut run => finished,
        _ = tokio::time::sleep(state.request_timeout) => {
            deadline.cancel();
            run.await
        }
    };

    Ok(Json(DetectResponse {
        flagged_cards: report.flagged_cards,
        cards_evaluated: report.cards_evaluated,
        cancelled: report.cancelled,
        rule_warnings,
    }))
}
