//! Project CRUD, wire shape and priority scheduling tests.

use actix_web::http::StatusCode;
use actix_web::test;
use serde_json::json;

use crate::helpers::{self, TEST_URL, call, get_project, insert_job, worker_auth};

/// The four-job fixture behind the priority scenario: one job still
/// available, three processed for 800 s in total.
async fn insert_prio_fixture<S>(app: &S, project: &str)
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

async fn put_project<S>(app: &S, project: &str, body: serde_json::Value) -> StatusCode
where
    S: actix_web::dev::Service<
            actix_http::Request,
            Response = actix_web::dev::ServiceResponse,
            Error = actix_web::Error,
        >,
{
    let req = test::TestRequest::put()
        .uri(&format!("/rest_api/v4/{}", project))
        .insert_header(worker_auth())
        .set_json(body)
        .to_request();
    let (status, _) = call(app, req).await;
    status
}

#[actix_rt::test]
async fn test_create_and_update_project() {
    let Some(ctx) = helpers::setup().await else { return };
    ctx.reset_project("myproject").await;
    let app = ctx.app().await;

    assert_eq!(
        put_project(&app, "myproject", json!({"name": "My Project"})).await,
        StatusCode::CREATED
    );

    let mut project = get_project(&app, "myproject").await.expect("project listed");
    let created_at = project
        .as_object_mut()
        .unwrap()
        .remove("CreatedAt")
        .unwrap();
    assert!(created_at.is_string());
    let urls = project.as_object_mut().unwrap().remove("URLS").unwrap();
    assert!(urls["URL-Status"].as_str().unwrap().ends_with("/rest_api/v4/myproject"));
    assert_eq!(urls["URL-Processing-image"], json!(null));
    assert_eq!(
        project,
        json!({
            "Id": "myproject",
            "Name": "My Project",
            "Environment": {},
            "CreatedBy": helpers::WORKER_USER,
            "LastJobAddedAt": null,
            "NrJobsAdded": 0,
            "LastJobClaimedAt": null,
            "NrJobsClaimed": 0,
            "NrJobsFinished": 0,
            "NrJobsFailed": 0,
            "TotalProcessingTime": 0.0,
            "Deadline": null,
            "PrioScore": 0.0,
        })
    );

    // update every settable field
    assert_eq!(
        put_project(
            &app,
            "myproject",
            json!({
                "name": "Your Project",
                "deadline": "2001-01-01 10:00",
                "processing_image_url": TEST_URL,
                "environment": {"var": 10},
            })
        )
        .await,
        StatusCode::NO_CONTENT
    );

    let project = get_project(&app, "myproject").await.expect("project listed");
    assert_eq!(project["Name"], "Your Project");
    assert_eq!(project["Deadline"], "2001-01-01T10:00:00");
    assert_eq!(project["Environment"], json!({"var": 10}));
    assert_eq!(project["URLS"]["URL-Processing-image"], TEST_URL);

    // immutable fields are rejected
    assert_eq!(
        put_project(&app, "myproject", json!({"created_by": "cannot_do_this"})).await,
        StatusCode::BAD_REQUEST
    );

    // bad project identifiers are rejected
    assert_eq!(
        put_project(&app, "2badname", json!({})).await,
        StatusCode::BAD_REQUEST
    );

    // delete and verify it is gone
    let req = test::TestRequest::delete()
        .uri("/rest_api/v4/myproject")
        .insert_header(worker_auth())
        .to_request();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert!(get_project(&app, "myproject").await.is_none());
}

#[actix_rt::test]
async fn test_only_active_filter() {
    let Some(ctx) = helpers::setup().await else { return };
    ctx.reset_project("activeprj").await;
    ctx.reset_project("drainedprj").await;
    let app = ctx.app().await;

    assert_eq!(
        insert_job(&app, "activeprj", json!({"id": "1", "source_url": TEST_URL})).await,
        StatusCode::CREATED
    );
    assert_eq!(put_project(&app, "drainedprj", json!({})).await, StatusCode::CREATED);

    let req = test::TestRequest::get()
        .uri("/rest_api/v4/projects?only_active=1")
        .to_request();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body["Projects"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|p| p["Id"].as_str())
        .collect();
    assert!(ids.contains(&"activeprj"));
    assert!(!ids.contains(&"drainedprj"));
}

#[actix_rt::test]
async fn test_priority_scores() {
    let Some(ctx) = helpers::setup().await else { return };
    ctx.reset_project("priotest").await;
    ctx.reset_project("prionew").await;
    let app = ctx.app().await;

    insert_prio_fixture(&app, "priotest").await;

    // no deadline: a flat weight of 1
    let score = get_project(&app, "priotest").await.unwrap()["PrioScore"]
        .as_f64()
        .unwrap();
    assert!((score - 1.0).abs() < 1e-9);

    // past deadline: remaining * mean processing time = 1 * 800/3
    assert_eq!(
        put_project(&app, "priotest", json!({"deadline": "2011-01-01 10:00"})).await,
        StatusCode::NO_CONTENT
    );
    let score = get_project(&app, "priotest").await.unwrap()["PrioScore"]
        .as_f64()
        .unwrap();
    assert!((score - 800.0 / 3.0).abs() < 1e-6, "got {}", score);

    // no processing history: the default mean of 3600 s
    assert_eq!(
        insert_job(&app, "prionew", json!({"id": "1", "source_url": TEST_URL})).await,
        StatusCode::CREATED
    );
    assert_eq!(
        put_project(&app, "prionew", json!({"deadline": "2011-01-01 10:00"})).await,
        StatusCode::NO_CONTENT
    );
    let score = get_project(&app, "prionew").await.unwrap()["PrioScore"]
        .as_f64()
        .unwrap();
    assert!((score - 3600.0).abs() < 1e-6, "got {}", score);

    // nothing left to do: weight 0
    ctx.reset_project("priodone").await;
    assert_eq!(
        put_project(&app, "priodone", json!({"deadline": "2011-01-01 10:00"})).await,
        StatusCode::CREATED
    );
    let score = get_project(&app, "priodone").await.unwrap()["PrioScore"]
        .as_f64()
        .unwrap();
    assert_eq!(score, 0.0);
}

#[actix_rt::test]
async fn test_project_status_view() {
    let Some(ctx) = helpers::setup().await else { return };
    ctx.reset_project("statustest").await;
    let app = ctx.app().await;

    insert_prio_fixture(&app, "statustest").await;

    let req = test::TestRequest::get()
        .uri("/rest_api/v4/statustest?now=2000-01-01T11%3A00%3A00")
        .to_request();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(body["Version"], "v4");
    assert_eq!(body["Project"], "statustest");
    assert_eq!(body["NrJobsAdded"], 4);
    assert_eq!(body["NrJobsClaimed"], 3);
    assert_eq!(body["NrJobsFinished"], 2);
    assert_eq!(body["NrJobsFailed"], 1);
    assert_eq!(body["TotalProcessingTime"], 800.0);
    assert_eq!(
        body["JobStates"],
        json!({"Available": 1, "Failed": 1, "Finished": 2})
    );
    // one available job over two claims in the last complete hour
    assert_eq!(body["ETA"], "0:30:00");
    assert!(body["URLS"]["URL-DailyCount"]
        .as_str()
        .unwrap()
        .ends_with("/statustest/jobs/count?period=daily"));
    assert!(body["URLS"]["URL-Jobs"].as_str().unwrap().ends_with("/statustest/jobs"));

    // unknown projects 404
    let req = test::TestRequest::get()
        .uri("/rest_api/v4/nosuchproject")
        .to_request();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_rt::test]
async fn test_fetch_job_prio_distribution() {
    let Some(ctx) = helpers::setup().await else { return };
    ctx.reset_project("prioheavy").await;
    ctx.reset_project("priolight").await;
    let app = ctx.app().await;

    // priolight: 1 remaining, mean 800/3, past deadline -> weight 266.67
    insert_prio_fixture(&app, "priolight").await;
    assert_eq!(
        put_project(&app, "priolight", json!({"deadline": "2011-01-01 10:00"})).await,
        StatusCode::NO_CONTENT
    );

    // prioheavy: 1 remaining, no history, past deadline -> weight 3600
    assert_eq!(
        insert_job(&app, "prioheavy", json!({"id": "1", "source_url": TEST_URL})).await,
        StatusCode::CREATED
    );
    assert_eq!(
        put_project(&app, "prioheavy", json!({"deadline": "2011-01-01 10:00"})).await,
        StatusCode::NO_CONTENT
    );

    let mut heavy = 0;
    let mut light = 0;
    for _ in 0..100 {
        let req = test::TestRequest::get()
            .uri("/rest_api/v4/projects/jobs/fetch")
            .insert_header(worker_auth())
            .to_request();
        let (status, body) = call(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        match body["Project"].as_str() {
            Some("prioheavy") => heavy += 1,
            Some("priolight") => light += 1,
            // other suites may have active projects in a shared database
            _ => {}
        }
    }

    // p(priolight) = (800/3) / (800/3 + 3600) = 0.069; the heavy project
    // must dominate
    assert!(heavy > light, "heavy={} light={}", heavy, light);
}
