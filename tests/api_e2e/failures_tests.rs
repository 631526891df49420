//! Failure analyzer endpoint tests.

use actix_web::http::StatusCode;
use actix_web::test;
use serde_json::json;

use crate::helpers::{self, TEST_URL, call, worker_auth};

async fn insert_failed_job<S>(app: &S, project: &str, id: &str, output: &str, failed_at: &str)
where
    S: actix_web::dev::Service<
            actix_http::Request,
            Response = actix_web::dev::ServiceResponse,
            Error = actix_web::Error,
        >,
{
    let job = json!({
        "id": id,
        "source_url": TEST_URL,
        "worker": "worker1",
        "claimed_timestamp": failed_at,
        "failed_timestamp": failed_at,
        "current_status": "FAILED",
        "processing_time": 60,
    });
    let req = test::TestRequest::post()
        .uri(&format!("/rest_api/v4/{}/jobs", project))
        .insert_header(worker_auth())
        .set_json(job)
        .to_request();
    let (status, _) = call(app, req).await;
    assert_eq!(status, StatusCode::CREATED);

    let req = test::TestRequest::put()
        .uri(&format!("/rest_api/v4/{}/jobs/{}/output", project, id))
        .insert_header(worker_auth())
        .set_json(json!({"Output": output}))
        .to_request();
    let (status, _) = call(app, req).await;
    assert_eq!(status, StatusCode::OK);
}

#[actix_rt::test]
async fn test_failures_ranking() {
    let Some(ctx) = helpers::setup().await else { return };
    ctx.reset_project("failrank").await;
    let app = ctx.app().await;

    insert_failed_job(&app, "failrank", "1", "line1\nline2\nlineX", "2000-01-01 10:00").await;
    insert_failed_job(&app, "failrank", "2", "line1\nline3\nlineX", "2000-01-01 11:00").await;

    let req = test::TestRequest::get()
        .uri("/rest_api/v4/failrank/failures")
        .to_request();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["Version"], "v4");
    assert_eq!(body["Project"], "failrank");

    let lines = body["Lines"].as_array().unwrap();
    assert_eq!(lines.len(), 3);

    // line1 and lineX share both jobs; their entropy clamps to 1 so the
    // group scores 0 and ranks first
    let top = &lines[0];
    assert_eq!(top["Score"], 0.0);
    assert_eq!(top["Jobs"].as_array().unwrap().len(), 2);
    assert_eq!(top["CommonLines"].as_array().unwrap().len(), 2);
    for group in &lines[1..] {
        assert!(group["Score"].as_f64().unwrap() < 0.0);
        assert_eq!(group["Jobs"].as_array().unwrap().len(), 1);
    }

    // per-job summaries
    let jobs = body["Jobs"].as_object().unwrap();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs["1"]["Worker"], "worker1");
    assert_eq!(jobs["1"]["ProcessingTime"], 60.0);
    assert_eq!(jobs["1"]["Failed"], "2000-01-01T10:00:00");
}

#[actix_rt::test]
async fn test_failures_time_window() {
    let Some(ctx) = helpers::setup().await else { return };
    ctx.reset_project("failwindow").await;
    let app = ctx.app().await;

    insert_failed_job(&app, "failwindow", "1", "a failure", "2000-01-01 10:00").await;
    insert_failed_job(&app, "failwindow", "2", "b failure", "2000-01-02 10:00").await;

    let req = test::TestRequest::get()
        .uri("/rest_api/v4/failwindow/failures?start=2000-01-01&end=2000-01-02")
        .to_request();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["Start"], "2000-01-01T00:00:00");
    assert_eq!(body["Jobs"].as_object().unwrap().len(), 1);

    // bad time formats are rejected
    let req = test::TestRequest::get()
        .uri("/rest_api/v4/failwindow/failures?start=nonsense")
        .to_request();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
