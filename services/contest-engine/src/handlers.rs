use crate::errors::ContestError;
use crate::metrics;
use crate::models::{CastVoteRequest, EnrollRequest};
use crate::services::ContestService;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Health check endpoint
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": "contest-engine",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Cast vote endpoint
pub async fn cast_vote(
    service: web::Data<Arc<ContestService>>,
    request: web::Json<CastVoteRequest>,
) -> Result<HttpResponse, ContestError> {
    let request = request.into_inner();
    let receipt = service
        .cast_vote(&request.voter_email, request.contestant_id)
        .await?;
    Ok(HttpResponse::Ok().json(receipt))
}

/// Voter status endpoint
pub async fn voter_status(
    service: web::Data<Arc<ContestService>>,
    email: web::Path<String>,
) -> Result<HttpResponse, ContestError> {
    let status = service.voter_status(&email).await?;
    Ok(HttpResponse::Ok().json(status))
}

/// Enroll contestant endpoint
pub async fn enroll(
    service: web::Data<Arc<ContestService>>,
    request: web::Json<EnrollRequest>,
) -> Result<HttpResponse, ContestError> {
    let contestant = service.enroll(request.into_inner()).await?;
    Ok(HttpResponse::Created().json(contestant))
}

/// Get contestant endpoint
pub async fn get_contestant(
    service: web::Data<Arc<ContestService>>,
    id: web::Path<Uuid>,
) -> Result<HttpResponse, ContestError> {
    let contestant = service.get_contestant(*id).await?;
    Ok(HttpResponse::Ok().json(contestant))
}

#[derive(Deserialize)]
pub struct LeaderboardQuery {
    page: Option<u32>,
    page_size: Option<u32>,
    q: Option<String>,
}

/// Ranked, paginated, optionally filtered leaderboard
pub async fn get_leaderboard(
    service: web::Data<Arc<ContestService>>,
    query: web::Query<LeaderboardQuery>,
) -> Result<HttpResponse, ContestError> {
    let page = service
        .get_leaderboard(query.page, query.page_size, query.q.as_deref())
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

#[derive(Deserialize)]
pub struct TopQuery {
    n: Option<u32>,
}

/// Top-n leaderboard endpoint
pub async fn top(
    service: web::Data<Arc<ContestService>>,
    query: web::Query<TopQuery>,
) -> Result<HttpResponse, ContestError> {
    let entries = service.top(query.n.unwrap_or(10)).await?;
    Ok(HttpResponse::Ok().json(json!({ "entries": entries })))
}

/// Prometheus metrics endpoint
pub async fn metrics_endpoint() -> HttpResponse {
    match metrics::metrics_handler() {
        Ok(body) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(body),
        Err(e) => HttpResponse::InternalServerError().json(json!({
            "error": "Failed to gather metrics",
            "details": e.to_string()
        })),
    }
}

/// Configure routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/votes", web::post().to(cast_vote))
            .route("/voters/{email}", web::get().to(voter_status))
            .route("/contestants", web::post().to(enroll))
            .route("/contestants/{id}", web::get().to(get_contestant))
            .route("/leaderboard", web::get().to(get_leaderboard))
            .route("/leaderboard/top", web::get().to(top)),
    )
    .route("/metrics", web::get().to(metrics_endpoint))
    .route("/health", web::get().to(health_check));
}
