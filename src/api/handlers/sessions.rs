use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use super::error_response;
use crate::api::{
    state::AppState,
    types::{CreateSessionResponse, SessionDetail},
};
use crate::domain::{Session, SessionId, SessionSpec};

type ApiResult<T> = std::result::Result<T, (StatusCode, String)>;

fn parse_id(raw: &str) -> ApiResult<SessionId> {
    raw.parse::<SessionId>()
        .map_err(|_| (StatusCode::BAD_REQUEST, format!("invalid session id '{}'", raw)))
}

/// GET /v0/sessions
pub async fn list_sessions(State(state): State<AppState>) -> Json<Vec<Session>> {
    Json(state.registry.list_sessions().await)
}

/// POST /v0/sessions
pub async fn create_session(
    State(state): State<AppState>,
    Json(spec): Json<SessionSpec>,
) -> ApiResult<(StatusCode, Json<CreateSessionResponse>)> {
    let id = state
        .registry
        .create_session(spec)
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(CreateSessionResponse { id })))
}

/// GET /v0/sessions/:id
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SessionDetail>> {
    let id = parse_id(&id)?;
    let session = state.registry.get_session(id).await.map_err(error_response)?;
    let checkpoint = state
        .registry
        .context()
        .store
        .get_checkpoint(id)
        .await
        .map_err(error_response)?
        .map(|c| c.cursor.height());

    Ok(Json(SessionDetail {
        session,
        checkpoint,
        last_heartbeat: state.metrics.last_heartbeat(id),
    }))
}

/// DELETE /v0/sessions/:id -- stop the session and wait for its worker
pub async fn stop_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Session>> {
    let id = parse_id(&id)?;
    state.registry.stop_session(id).await.map_err(error_response)?;
    let session = state.registry.get_session(id).await.map_err(error_response)?;
    Ok(Json(session))
}

#[cfg(test)]
mod tests {
    use crate::adapters::{ClientBundle, MockChainClient};
    use crate::api::{create_router, AppState};
    use crate::collector::WorkerContext;
    use crate::config::{CollectorConfig, DispatcherConfig};
    use crate::coordinator::SessionRegistry;
    use crate::domain::{ChainTarget, DataBatch};
    use crate::heuristics::HeuristicEngine;
    use crate::persistence::MemoryStateStore;
    use crate::services::Metrics;
    use crate::supervisor::AlertDispatcher;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn state() -> AppState {
        let mut mock = MockChainClient::new();
        mock.expect_latest_height().returning(|| Ok(500));
        mock.expect_fetch_since()
            .returning(|req| Ok(DataBatch::empty(ChainTarget::new("layer1"), req.from)));

        let store = Arc::new(MemoryStateStore::new());
        let metrics = Arc::new(Metrics::new());
        let ctx = WorkerContext {
            store: store.clone(),
            engine: Arc::new(HeuristicEngine::with_defaults()),
            dispatcher: Arc::new(AlertDispatcher::new(store, &DispatcherConfig::default())),
            metrics: metrics.clone(),
            config: CollectorConfig::default(),
        };
        let bundle = ClientBundle::new().with_client("layer1", Arc::new(mock));
        AppState::new(SessionRegistry::new(bundle, ctx), metrics)
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_session_lifecycle_over_http() {
        let state = state();
        let app = create_router(state.clone());

        let response = app
            .clone()
            .oneshot(post_json(
                "/v0/sessions",
                json!({
                    "chainTarget": "layer1",
                    "heuristicType": "large_transfer",
                    "params": { "threshold": "1000" },
                    "start": 42
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let id = body_json(response).await["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/v0/sessions/{}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let detail = body_json(response).await;
        assert_eq!(detail["checkpoint"], 42);
        assert_eq!(detail["spec"]["heuristic_type"], "large_transfer");

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/v0/sessions/{}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"]["state"], "stopped");

        let response = app
            .oneshot(Request::builder().uri("/v0/sessions").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_spec_is_bad_request() {
        let app = create_router(state());
        let response = app
            .oneshot(post_json(
                "/v0/sessions",
                json!({
                    "chain_target": "layer7",
                    "heuristic_type": "large_transfer",
                    "params": { "threshold": "1" }
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let app = create_router(state());
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/v0/sessions/{}", uuid::Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(Request::builder().uri("/v0/sessions/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health_and_metrics() {
        let app = create_router(state());

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let health = body_json(response).await;
        assert_eq!(health["status"], "ok");
        assert_eq!(health["sessions"], 0);

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("vigil_active_sessions 0"));
    }
}
