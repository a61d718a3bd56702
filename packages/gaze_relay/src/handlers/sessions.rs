use axum::{Json, extract::State, response::IntoResponse};

use crate::server::RelayState;

/// Connected clients, oldest first
pub async fn sessions_handler(State(state): State<RelayState>) -> impl IntoResponse {
    Json(state.registry.list().await)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::server::{RelayState, router};

    async fn get_sessions(state: RelayState) -> Value {
        let response = router(state)
            .oneshot(Request::builder().uri("/sessions").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_sessions_empty() {
        let body = get_sessions(RelayState::new(10)).await;
        assert_eq!(body, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_sessions_lists_clients() {
        let state = RelayState::new(10);
        let (first, _) = state
            .registry
            .register(Some("127.0.0.1:50000".parse().unwrap()))
            .await;
        state.registry.record_command(&first).await;
        state.registry.register(None).await;

        let body = get_sessions(state).await;
        let sessions = body.as_array().unwrap();
        assert_eq!(sessions.len(), 2);
        let known = sessions
            .iter()
            .find(|s| s["id"] == first.to_string())
            .unwrap();
        assert_eq!(known["remote"], "127.0.0.1:50000");
        assert_eq!(known["commands"], 1);
        assert!(sessions.iter().any(|s| s["remote"].is_null()));
    }
}
