use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header::CONTENT_TYPE, Method},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::models::{FilterOptions, ScholarPage, ScholarRecord};
use crate::query::{ListParams, ScholarQuery};
use crate::store::ScholarStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ScholarStore>,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub ids: Option<Vec<String>>,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/scholars", get(list_handler))
        .route("/api/scholars/filters", get(filters_handler))
        .route("/api/scholars/batch", post(batch_handler))
        .route("/api/scholars/{id}", get(detail_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn serve(state: AppState, address: &str) -> anyhow::Result<()> {
    let app = router(state);

    info!("Binding to {address}");
    let listener = TcpListener::bind(address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_handler(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<ScholarPage>> {
    let query = ScholarQuery::from_params(&params);
    let page = state.store.list(&query).await?;
    debug!(page = page.page, total = page.total, "listed scholars");
    Ok(Json(page))
}

async fn filters_handler(State(state): State<AppState>) -> AppResult<Json<FilterOptions>> {
    Ok(Json(state.store.filter_options().await?))
}

async fn batch_handler(
    State(state): State<AppState>,
    payload: Result<Json<BatchRequest>, JsonRejection>,
) -> AppResult<Json<Vec<ScholarRecord>>> {
    let ids = payload
        .ok()
        .and_then(|Json(body)| body.ids)
        .ok_or_else(|| AppError::BadRequest("ids array is required".to_string()))?;

    Ok(Json(state.store.batch(&ids).await?))
}

async fn detail_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ScholarRecord>> {
    Ok(Json(state.store.get(&id).await?))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::memory::MemoryStore;

    fn scholar(id: &str, department: &str, score: i32, good: bool) -> ScholarRecord {
        serde_json::from_value(json!({
            "id": id,
            "name": format!("Scholar {id}"),
            "title": "Professor",
            "email": format!("{id}@ufl.edu"),
            "department": department,
            "position": "Professor",
            "relevance_score": score,
            "should_email": if good { "Yes" } else { "No" },
            "requirements": ["Machine Learning"],
            "reasoning": ["Uses ML"],
        }))
        .unwrap()
    }

    fn app() -> Router {
        let mut records = Vec::new();
        for i in 0..30 {
            records.push(scholar(&format!("good-{i:02}"), "EG-Computer Science", 70 + i, true));
        }
        for i in 0..10 {
            records.push(scholar(&format!("weak-{i:02}"), "MD-Medicine", 20 + i, false));
        }
        router(AppState {
            store: Arc::new(MemoryStore::new(records)),
        })
    }

    async fn send(request: Request<Body>) -> (StatusCode, Value) {
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (status, body) = send(get_req("/api/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn lists_first_page_of_good_matches() {
        let (status, body) =
            send(get_req("/api/scholars?minScore=70&emailOnly=true&page=1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 30);
        assert_eq!(body["totalPages"], 2);
        assert_eq!(body["page"], 1);

        let data = body["data"].as_array().unwrap();
        assert_eq!(data.len(), 25);
        for card in data {
            assert!(card["relevance_score"].as_i64().unwrap() >= 70);
            assert_eq!(card["should_email"], "Yes");
            assert!(card.get("publications").is_none());
            assert!(card.get("email").is_none());
        }
    }

    #[tokio::test]
    async fn malformed_numeric_filters_are_ignored() {
        let (status, body) = send(get_req("/api/scholars?minScore=lots")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 40);
    }

    #[tokio::test]
    async fn department_exclusion_keeps_other_departments() {
        let (_, body) = send(get_req("/api/scholars?depts=EG&deptMode=exclude")).await;
        assert_eq!(body["total"], 10);
        for card in body["data"].as_array().unwrap() {
            assert!(!card["department"].as_str().unwrap().starts_with("EG-"));
        }
    }

    #[tokio::test]
    async fn filters_endpoint_returns_sorted_values() {
        let (status, body) = send(get_req("/api/scholars/filters")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "departments": ["EG-Computer Science", "MD-Medicine"],
                "positions": ["Professor"],
            })
        );
    }

    #[tokio::test]
    async fn detail_returns_full_record_or_404() {
        let (status, body) = send(get_req("/api/scholars/good-03")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "good-03@ufl.edu");
        assert_eq!(body["reasoning"], json!(["Uses ML"]));

        let (status, body) = send(get_req("/api/scholars/nobody")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn batch_returns_only_known_ids() {
        let (status, body) = send(post_json(
            "/api/scholars/batch",
            r#"{"ids":["weak-01","ghost","good-00"]}"#,
        ))
        .await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<_> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["weak-01", "good-00"]);

        let (status, body) = send(post_json("/api/scholars/batch", r#"{"ids":[]}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn batch_without_ids_is_a_bad_request() {
        let (status, body) = send(post_json("/api/scholars/batch", r#"{}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "ids array is required");

        let (status, _) = send(post_json("/api/scholars/batch", r#"{"ids":"abc"}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
