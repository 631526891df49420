//! Time-bucketed count tests.

use actix_web::http::StatusCode;
use actix_web::test;
use serde_json::json;

use crate::helpers::{self, TEST_URL, call, worker_auth};

/// Jobs claimed at 10:00 (x2, one finished one failed) and 11:00 (x1,
/// finished), plus one untouched job.
async fn insert_count_fixture<S>(app: &S, project: &str)
where
    S: actix_web::dev::Service<
            actix_http::Request,
            Response = actix_web::dev::ServiceResponse,
            Error = actix_web::Error,
        >,
{
    let jobs = json!([
        {"id": "1", "type": "test", "source_url": TEST_URL, "worker": "worker1",
         "added_timestamp": "2000-01-01 10:00", "claimed_timestamp": "2000-01-01 10:00",
         "finished_timestamp": "2000-01-01 10:00", "current_status": "FINISHED",
         "processing_time": 300},
        {"id": "2", "type": "test", "source_url": TEST_URL, "worker": "worker2",
         "added_timestamp": "2000-01-01 10:00", "claimed_timestamp": "2000-01-01 10:00",
         "failed_timestamp": "2000-01-01 10:00", "current_status": "FAILED",
         "processing_time": 200},
        {"id": "3", "type": "test", "source_url": TEST_URL, "worker": "worker1",
         "added_timestamp": "2000-01-01 10:00", "claimed_timestamp": "2000-01-01 11:00",
         "finished_timestamp": "2000-01-01 11:00", "current_status": "FINISHED",
         "processing_time": 300},
        {"id": "4", "type": "test", "source_url": TEST_URL,
         "added_timestamp": "2000-01-01 10:00"},
    ]);
    let req = test::TestRequest::post()
        .uri(&format!("/rest_api/v4/{}/jobs", project))
        .insert_header(worker_auth())
        .set_json(jobs)
        .to_request();
    let (status, body) = call(app, req).await;
    assert_eq!(status, StatusCode::CREATED, "fixture insert failed: {}", body);
}

#[actix_rt::test]
async fn test_hourly_count() {
    let Some(ctx) = helpers::setup().await else { return };
    ctx.reset_project("counthour").await;
    let app = ctx.app().await;
    insert_count_fixture(&app, "counthour").await;

    let req = test::TestRequest::get()
        .uri("/rest_api/v4/counthour/jobs/count?period=hourly")
        .to_request();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["Version"], "v4");
    assert_eq!(body["Project"], "counthour");
    assert_eq!(body["PeriodType"], "Hourly");
    assert_eq!(body["Start"], json!(null));
    assert_eq!(body["End"], json!(null));

    let counts = body["Counts"].as_array().unwrap();
    assert_eq!(counts.len(), 2);

    let first = &counts[0];
    assert_eq!(first["Period"], "2000-01-01 10:00");
    assert_eq!(first["JobsClaimed"], 2);
    assert_eq!(first["JobsFailed"], 1);
    assert_eq!(first["JobsFinished"], 1);
    assert_eq!(first["ActiveWorkers"], 2);
    let claimed_url = first["URLS"]["URL-JobsClaimed"].as_str().unwrap();
    assert!(claimed_url.contains("/counthour/jobs?status=CLAIMED"));
    assert!(claimed_url.contains("start=2000-01-01T10%3A00%3A00"));
    assert!(claimed_url.contains("end=2000-01-01T11%3A00%3A00"));
    let workers_url = first["URLS"]["URL-ActiveWorkers"].as_str().unwrap();
    assert!(workers_url.contains("/counthour/workers?start=2000-01-01T10%3A00%3A00"));

    let second = &counts[1];
    assert_eq!(second["Period"], "2000-01-01 11:00");
    assert_eq!(second["JobsClaimed"], 1);
    assert_eq!(second["JobsFailed"], 0);
    assert_eq!(second["JobsFinished"], 1);
    assert_eq!(second["ActiveWorkers"], 1);
}

#[actix_rt::test]
async fn test_daily_count_with_zoom() {
    let Some(ctx) = helpers::setup().await else { return };
    ctx.reset_project("countday").await;
    let app = ctx.app().await;
    insert_count_fixture(&app, "countday").await;

    // daily is the default period
    let req = test::TestRequest::get()
        .uri("/rest_api/v4/countday/jobs/count")
        .to_request();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["PeriodType"], "Daily");

    let counts = body["Counts"].as_array().unwrap();
    assert_eq!(counts.len(), 1);
    let bucket = &counts[0];
    assert_eq!(bucket["Period"], "2000-01-01");
    assert_eq!(bucket["JobsClaimed"], 3);
    assert_eq!(bucket["JobsFailed"], 1);
    assert_eq!(bucket["JobsFinished"], 2);
    assert_eq!(bucket["ActiveWorkers"], 2);
    let zoom = bucket["URLS"]["URL-Zoom"].as_str().unwrap();
    assert!(zoom.contains("/countday/jobs/count?period=HOURLY"));
    assert!(zoom.contains("start=2000-01-01T00%3A00%3A00"));
}

#[actix_rt::test]
async fn test_count_time_range() {
    let Some(ctx) = helpers::setup().await else { return };
    ctx.reset_project("countrange").await;
    let app = ctx.app().await;
    insert_count_fixture(&app, "countrange").await;

    let req = test::TestRequest::get()
        .uri("/rest_api/v4/countrange/jobs/count?period=hourly&start=2000-01-01+10%3A00&end=2000-01-01+11%3A00")
        .to_request();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["Start"], "2000-01-01T10:00:00");
    assert_eq!(body["End"], "2000-01-01T11:00:00");

    let counts = body["Counts"].as_array().unwrap();
    assert_eq!(counts.len(), 1);
    assert_eq!(counts[0]["Period"], "2000-01-01 10:00");
    assert_eq!(counts[0]["JobsClaimed"], 2);
}

#[actix_rt::test]
async fn test_count_bad_parameters() {
    let Some(ctx) = helpers::setup().await else { return };
    ctx.reset_project("countbad").await;
    let app = ctx.app().await;

    for uri in [
        "/rest_api/v4/countbad/jobs/count?period=weekly",
        "/rest_api/v4/countbad/jobs/count?start=nonsense",
    ] {
        let req = test::TestRequest::get().uri(uri).to_request();
        let (status, _) = call(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "uri {}", uri);
    }
}
