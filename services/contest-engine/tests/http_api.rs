mod common;

use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use common::Harness;
use contest_engine::config::ContestConfig;
use contest_engine::handlers::configure_routes;
use serde_json::{json, Value};
use uuid::Uuid;

macro_rules! app {
    ($harness:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($harness.service.clone()))
                .configure(configure_routes),
        )
        .await
    };
}

#[actix_web::test]
async fn test_health() {
    let h = Harness::new(ContestConfig::default());
    let app = app!(h);

    let req = test::TestRequest::get().uri("/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "contest-engine");
}

#[actix_web::test]
async fn test_enroll_vote_and_read_back() {
    let h = Harness::new(ContestConfig::default());
    h.subscribers.add("new@contest.io");
    h.enroll("v@contest.io", "Voter").await;
    let app = app!(h);

    let req = test::TestRequest::post()
        .uri("/api/v1/contestants")
        .set_json(json!({
            "email": "new@contest.io",
            "name": "Brightline",
            "handle": "@bright"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Value = test::read_body_json(resp).await;
    assert_eq!(created["name"], "Brightline");
    assert_eq!(created["handle"], "bright");
    assert_eq!(created["total_votes"], 0);
    assert!(created.get("email").is_none());
    let id = created["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri("/api/v1/votes")
        .set_json(json!({ "voter_email": "v@contest.io", "contestant_id": id }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let receipt: Value = test::read_body_json(resp).await;
    assert_eq!(receipt["contestant_total_votes"], 1);
    assert_eq!(receipt["votes_remaining"], 2);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/contestants/{}", id))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["total_votes"], 1);

    let req = test::TestRequest::get()
        .uri("/api/v1/leaderboard?q=bright&page_size=5")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["total_count"], 1);
    assert_eq!(body["page_size"], 5);
    assert_eq!(body["entries"][0]["rank"], 1);
    assert_eq!(body["entries"][0]["id"], id.as_str());

    let req = test::TestRequest::get()
        .uri("/api/v1/leaderboard/top?n=1")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["entries"].as_array().unwrap().len(), 1);
    assert_eq!(body["entries"][0]["id"], id.as_str());

    let req = test::TestRequest::get()
        .uri("/api/v1/voters/v@contest.io")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["vote_given"], 1);
    assert_eq!(body["votes"].as_array().unwrap().len(), 1);
}

#[actix_web::test]
async fn test_error_status_mapping() {
    let h = Harness::new(ContestConfig::default());
    let target = h.enroll("t@contest.io", "Target").await;
    h.enroll("dup@contest.io", "Taken").await;
    let app = app!(h);

    let cases = vec![
        (
            test::TestRequest::post()
                .uri("/api/v1/votes")
                .set_json(json!({ "voter_email": "ghost@x.com", "contestant_id": target.id })),
            StatusCode::NOT_FOUND,
            "voter_not_enrolled",
        ),
        (
            test::TestRequest::post()
                .uri("/api/v1/votes")
                .set_json(json!({ "voter_email": "t@contest.io", "contestant_id": Uuid::new_v4() })),
            StatusCode::NOT_FOUND,
            "contestant_not_found",
        ),
        (
            test::TestRequest::post()
                .uri("/api/v1/votes")
                .set_json(json!({ "voter_email": "t@contest.io", "contestant_id": target.id })),
            StatusCode::CONFLICT,
            "self_vote_forbidden",
        ),
        (
            test::TestRequest::post()
                .uri("/api/v1/contestants")
                .set_json(json!({ "email": "dup@contest.io", "name": "Again" })),
            StatusCode::CONFLICT,
            "already_exists",
        ),
        (
            test::TestRequest::post()
                .uri("/api/v1/contestants")
                .set_json(json!({ "email": "walkin@contest.io", "name": "Walk In" })),
            StatusCode::FORBIDDEN,
            "voter_not_subscribed",
        ),
        (
            test::TestRequest::post()
                .uri("/api/v1/contestants")
                .set_json(json!({ "email": "broken", "name": "Broken" })),
            StatusCode::BAD_REQUEST,
            "validation_error",
        ),
    ];

    for (req, status, error_type) in cases {
        let resp = test::call_service(&app, req.to_request()).await;
        assert_eq!(resp.status(), status, "expected {}", error_type);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["type"], error_type);
        assert_eq!(body["error"]["code"], status.as_u16());
    }
}

#[actix_web::test]
async fn test_cap_exhaustion_over_http() {
    let h = Harness::new(ContestConfig::default());
    let target = h.enroll("t@contest.io", "Target").await;
    h.enroll("v@contest.io", "Voter").await;
    let app = app!(h);

    let vote = || {
        test::TestRequest::post()
            .uri("/api/v1/votes")
            .set_json(json!({ "voter_email": "v@contest.io", "contestant_id": target.id }))
            .to_request()
    };

    for _ in 0..3 {
        let resp = test::call_service(&app, vote()).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let resp = test::call_service(&app, vote()).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["type"], "vote_cap_exceeded");
    assert_eq!(body["error"]["kind"], "conflict");

    assert_eq!(h.contestant(target.id).await.total_votes, 3);
}

#[actix_web::test]
async fn test_metrics_endpoint() {
    let h = Harness::new(ContestConfig::default());
    let app = app!(h);

    let req = test::TestRequest::get().uri("/metrics").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}
