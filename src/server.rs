use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{error, info};
use std::net::SocketAddr;
use tower::limit::ConcurrencyLimitLayer;

use crate::data::{SchedulingOutput, SolveRequest};
use crate::error::SchedulerError;
use crate::solver;

async fn solve_handler(Json(request): Json<SolveRequest>) -> Response {
    // each solve is CPU-bound and owns its own worker pool
    let result =
        tokio::task::spawn_blocking(move || solver::solve(&request.input, &request.config)).await;
    match result {
        Ok(Ok(output)) => Json(output).into_response(),
        Ok(Err(SchedulerError::InvalidInput(e))) => {
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
        Ok(Err(SchedulerError::Model(e))) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(SchedulingOutput::from_model_error(&e)),
        )
            .into_response(),
        Err(e) => {
            error!("Solver task failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "solver task failed".to_string(),
            )
                .into_response()
        }
    }
}

/// Routes of the HTTP shell. At most `max_concurrent_solves` solves run at
/// once; further requests wait for a permit.
pub fn router(max_concurrent_solves: usize) -> Router {
    Router::new()
        .route(
            "/v1/schedule/solve",
            post(solve_handler).layer(ConcurrencyLimitLayer::new(max_concurrent_solves.max(1))),
        )
        .route("/health", get(|| async { "ok" }))
}

pub async fn run_server(addr: SocketAddr, max_concurrent_solves: usize) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server running at http://{}", listener.local_addr()?);
    axum::serve(listener, router(max_concurrent_solves)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    async fn post_solve(body: Value) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method("POST")
            .uri("/v1/schedule/solve")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = router(1).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }

    #[tokio::test]
    async fn solves_a_small_problem() {
        let (status, body) = post_solve(json!({
            "courses": [{"id": "math", "sessionsPerWeek": 2, "eligibleFacultyIds": ["ada"]}],
            "faculty": [{"id": "ada"}],
            "grid": {"days": ["Mon", "Tue"], "periodsPerDay": 2},
            "config": {"workerCount": 1, "timeBudgetSeconds": 5}
        }))
        .await;
        assert_eq!(status, StatusCode::OK);
        let output: SchedulingOutput = serde_json::from_slice(&body).unwrap();
        assert!(output.is_feasible());
        assert_eq!(output.timetable.len(), 2);
    }

    #[tokio::test]
    async fn dangling_reference_is_bad_request() {
        let (status, body) = post_solve(json!({
            "courses": [{"id": "math", "sessionsPerWeek": 1, "eligibleFacultyIds": ["nobody"]}],
            "grid": {"days": ["Mon"], "periodsPerDay": 2}
        }))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(String::from_utf8(body).unwrap().contains("nobody"));
    }

    #[tokio::test]
    async fn huge_time_budget_is_bad_request() {
        let (status, body) = post_solve(json!({
            "courses": [{"id": "math", "sessionsPerWeek": 1, "eligibleFacultyIds": ["ada"]}],
            "faculty": [{"id": "ada"}],
            "grid": {"days": ["Mon"], "periodsPerDay": 2},
            "config": {"workerCount": 1, "timeBudgetSeconds": 1e20}
        }))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(String::from_utf8(body).unwrap().contains("timeBudgetSeconds"));
    }

    #[tokio::test]
    async fn model_error_is_unprocessable_with_structured_body() {
        let (status, body) = post_solve(json!({
            "courses": [{"id": "math", "sessionsPerWeek": 1, "eligibleFacultyIds": []}],
            "grid": {"days": ["Mon"], "periodsPerDay": 2}
        }))
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let output: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(output["status"], "MODEL_ERROR");
        assert_eq!(output["diagnostics"][0]["resource"], "math");
    }

    #[tokio::test]
    async fn health_answers_ok() {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = router(1).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
