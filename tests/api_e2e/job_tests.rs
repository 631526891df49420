//! Job insertion, validation, listing and status transition tests.

use actix_web::http::StatusCode;
use actix_web::test;
use serde_json::json;

use crate::helpers::{self, TEST_URL, call, get_project, insert_job, worker_auth};

/// Four jobs spread over types, workers and lifecycle states.
async fn insert_list_fixture<S>(app: &S, project: &str)
where
    S: actix_web::dev::Service<
            actix_http::Request,
            Response = actix_web::dev::ServiceResponse,
            Error = actix_web::Error,
        >,
{
    let jobs = json!([
        {"id": "1", "type": "test_type", "source_url": format!("{}/source", TEST_URL),
         "target_url": format!("{}/target", TEST_URL),
         "view_result_url": format!("{}/view_result", TEST_URL)},
        {"id": "2", "type": "test_type", "source_url": TEST_URL, "target_url": TEST_URL,
         "claimed_timestamp": "2016-01-01 10:00", "current_status": "CLAIMED",
         "worker": "worker1"},
        {"id": "3", "type": "test_type", "source_url": TEST_URL, "target_url": TEST_URL,
         "claimed_timestamp": "2016-01-01 11:00", "finished_timestamp": "2016-01-01 11:10",
         "current_status": "FINISHED", "worker": "worker2"},
        {"id": "4", "type": "other_type", "source_url": TEST_URL, "target_url": TEST_URL,
         "claimed_timestamp": "2016-01-01 12:00", "failed_timestamp": "2016-01-01 12:10",
         "current_status": "FAILED", "worker": "worker2"},
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
async fn test_bad_job_inserts() {
    let Some(ctx) = helpers::setup().await else { return };
    ctx.reset_project("badjobs").await;
    let app = ctx.app().await;

    // missing source_url
    assert_eq!(
        insert_job(&app, "badjobs", json!({"id": "1"})).await,
        StatusCode::BAD_REQUEST
    );
    // unsupported field
    assert_eq!(
        insert_job(
            &app,
            "badjobs",
            json!({"id": "1", "source_url": TEST_URL, "unknown": "s"})
        )
        .await,
        StatusCode::BAD_REQUEST
    );
    // id must be a string
    assert_eq!(
        insert_job(&app, "badjobs", json!({"id": 1, "source_url": TEST_URL})).await,
        StatusCode::BAD_REQUEST
    );

    // per-item messages for lists
    let req = test::TestRequest::post()
        .uri("/rest_api/v4/badjobs/jobs")
        .insert_header(worker_auth())
        .set_json(json!([
            {"id": "1", "source_url": TEST_URL},
            {"id": "2"},
        ]))
        .to_request();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(
        body["error"].as_str().unwrap().contains("Job#1:"),
        "got {}",
        body
    );

    // nothing was stored
    let req = test::TestRequest::get()
        .uri("/rest_api/v4/badjobs/jobs")
        .to_request();
    let (_, body) = call(&app, req).await;
    assert_eq!(body["Jobs"].as_array().unwrap().len(), 0);
}

#[actix_rt::test]
async fn test_list_jobs_and_filters() {
    let Some(ctx) = helpers::setup().await else { return };
    ctx.reset_project("listjobs").await;
    let app = ctx.app().await;
    insert_list_fixture(&app, "listjobs").await;

    // bad requests
    for uri in [
        "/rest_api/v4/listjobs/jobs?start=a",
        "/rest_api/v4/listjobs/jobs?start=2016-01-01",
        "/rest_api/v4/listjobs/jobs?status=a",
    ] {
        let req = test::TestRequest::get().uri(uri).to_request();
        let (status, _) = call(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "uri {}", uri);
    }

    // everything
    let req = test::TestRequest::get()
        .uri("/rest_api/v4/listjobs/jobs")
        .to_request();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["Jobs"].as_array().unwrap().len(), 4);

    // available only, with the full wire shape
    let req = test::TestRequest::get()
        .uri("/rest_api/v4/listjobs/jobs?status=available")
        .to_request();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    let jobs = body["Jobs"].as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    let mut job = jobs[0].clone();
    let added = job.as_object_mut().unwrap().remove("Added").unwrap();
    assert!(added.is_string());
    let urls = job.as_object_mut().unwrap().remove("URLS").unwrap();
    assert_eq!(urls["URL-Input"], format!("{}/source", TEST_URL));
    assert_eq!(urls["URL-Result"], format!("{}/view_result", TEST_URL));
    assert!(urls["URL-Output"]
        .as_str()
        .unwrap()
        .ends_with("/rest_api/v4/listjobs/jobs/1/output"));
    assert_eq!(
        job,
        json!({
            "Id": "1",
            "Type": "test_type",
            "Status": "AVAILABLE",
            "Claimed": null,
            "IsClaimed": false,
            "Failed": null,
            "Finished": null,
            "ProcessingTime": null,
            "Worker": null,
        })
    );

    // equality filters
    for (params, expected) in [
        ("status=finished", 1),
        ("worker=worker2", 2),
        ("type=other_type", 1),
        ("type=other_type&worker=worker1", 0),
    ] {
        let req = test::TestRequest::get()
            .uri(&format!("/rest_api/v4/listjobs/jobs?{}", params))
            .to_request();
        let (status, body) = call(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["Jobs"].as_array().unwrap().len(),
            expected,
            "params {}",
            params
        );
    }

    // time windows select on the state timestamp, not the current status
    for (start, end, status_param, expected) in [
        ("2016-01-01", "2016-01-02", "claimed", 3),
        ("2016-01-01 10:00", "2016-01-01 11:00", "claimed", 1),
        ("2016-01-01 11:00", "2016-01-01 12:00", "failed", 0),
        ("2016-01-01 12:00", "2016-01-01 13:00", "failed", 1),
    ] {
        let uri = format!(
            "/rest_api/v4/listjobs/jobs?status={}&start={}&end={}",
            status_param,
            urlencoding::encode(start),
            urlencoding::encode(end),
        );
        let req = test::TestRequest::get().uri(&uri).to_request();
        let (status, body) = call(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["Jobs"].as_array().unwrap().len(),
            expected,
            "window {} {} {}",
            status_param,
            start,
            end
        );
    }
}

#[actix_rt::test]
async fn test_duplicate_inserts() {
    let Some(ctx) = helpers::setup().await else { return };
    ctx.reset_project("dupjobs").await;
    let app = ctx.app().await;

    let job = json!({"id": "42", "type": "test", "source_url": TEST_URL});
    assert_eq!(insert_job(&app, "dupjobs", job.clone()).await, StatusCode::CREATED);

    // the exact same payload is idempotent
    assert_eq!(insert_job(&app, "dupjobs", job.clone()).await, StatusCode::CREATED);
    let req = test::TestRequest::get()
        .uri("/rest_api/v4/dupjobs/jobs")
        .to_request();
    let (_, body) = call(&app, req).await;
    assert_eq!(body["Jobs"].as_array().unwrap().len(), 1);
    assert_eq!(get_project(&app, "dupjobs").await.unwrap()["NrJobsAdded"], 1);

    // the same id with different content conflicts
    assert_eq!(
        insert_job(
            &app,
            "dupjobs",
            json!({"id": "42", "type": "test", "source_url": format!("{}/other", TEST_URL)})
        )
        .await,
        StatusCode::CONFLICT
    );

    // a list containing a conflicting job is all-or-nothing
    let req = test::TestRequest::post()
        .uri("/rest_api/v4/dupjobs/jobs")
        .insert_header(worker_auth())
        .set_json(json!([
            {"id": "43", "source_url": TEST_URL},
            {"id": "42", "source_url": format!("{}/other", TEST_URL)},
        ]))
        .to_request();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("Job#1:"));

    let req = test::TestRequest::get()
        .uri("/rest_api/v4/dupjobs/jobs")
        .to_request();
    let (_, body) = call(&app, req).await;
    assert_eq!(body["Jobs"].as_array().unwrap().len(), 1);
}

#[actix_rt::test]
async fn test_multiple_projects_are_separated() {
    let Some(ctx) = helpers::setup().await else { return };
    ctx.reset_project("sepa").await;
    ctx.reset_project("sepb").await;
    let app = ctx.app().await;

    for id in ["1", "2"] {
        assert_eq!(
            insert_job(&app, "sepa", json!({"id": id, "source_url": TEST_URL})).await,
            StatusCode::CREATED
        );
    }
    assert_eq!(
        insert_job(&app, "sepb", json!({"id": "1", "source_url": TEST_URL})).await,
        StatusCode::CREATED
    );

    for (project, expected) in [("sepa", 2), ("sepb", 1)] {
        let req = test::TestRequest::get()
            .uri(&format!("/rest_api/v4/{}/jobs", project))
            .to_request();
        let (_, body) = call(&app, req).await;
        assert_eq!(body["Jobs"].as_array().unwrap().len(), expected);
    }

    // deleting one project leaves the other alone
    let req = test::TestRequest::delete()
        .uri("/rest_api/v4/sepa")
        .insert_header(worker_auth())
        .to_request();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);

    let req = test::TestRequest::get()
        .uri("/rest_api/v4/sepb/jobs")
        .to_request();
    let (_, body) = call(&app, req).await;
    assert_eq!(body["Jobs"].as_array().unwrap().len(), 1);
}

#[actix_rt::test]
async fn test_status_transitions_and_counters() {
    let Some(ctx) = helpers::setup().await else { return };
    ctx.reset_project("statusjobs").await;
    let app = ctx.app().await;

    assert_eq!(
        insert_job(&app, "statusjobs", json!({"id": "1", "source_url": TEST_URL})).await,
        StatusCode::CREATED
    );

    // missing and invalid status fields
    let req = test::TestRequest::put()
        .uri("/rest_api/v4/statusjobs/jobs/1/status")
        .insert_header(worker_auth())
        .set_json(json!({"BadStatus": "x"}))
        .to_request();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing \"Status\" field in request data");

    let req = test::TestRequest::put()
        .uri("/rest_api/v4/statusjobs/jobs/1/status")
        .insert_header(worker_auth())
        .set_json(json!({"Status": "NOT_A_STATUS"}))
        .to_request();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // STARTED is informational
    let req = test::TestRequest::put()
        .uri("/rest_api/v4/statusjobs/jobs/1/status")
        .insert_header(worker_auth())
        .set_json(json!({"Status": "started"}))
        .to_request();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);

    let req = test::TestRequest::get()
        .uri("/rest_api/v4/statusjobs/jobs/1/status")
        .to_request();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["Status"], "STARTED");

    // finishing stores the processing time and bumps the counters once
    let req = test::TestRequest::put()
        .uri("/rest_api/v4/statusjobs/jobs/1/status")
        .insert_header(worker_auth())
        .set_json(json!({"Status": "FINISHED", "ProcessingTime": 300}))
        .to_request();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);

    let project = get_project(&app, "statusjobs").await.unwrap();
    assert_eq!(project["NrJobsFinished"], 1);
    assert_eq!(project["TotalProcessingTime"], 300.0);

    // repeating the final status does not double-count
    let req = test::TestRequest::put()
        .uri("/rest_api/v4/statusjobs/jobs/1/status")
        .insert_header(worker_auth())
        .set_json(json!({"Status": "FINISHED", "ProcessingTime": 300}))
        .to_request();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);

    let project = get_project(&app, "statusjobs").await.unwrap();
    assert_eq!(project["NrJobsFinished"], 1);
    assert_eq!(project["TotalProcessingTime"], 300.0);

    // the opposite final state is a conflict
    let req = test::TestRequest::put()
        .uri("/rest_api/v4/statusjobs/jobs/1/status")
        .insert_header(worker_auth())
        .set_json(json!({"Status": "FAILED"}))
        .to_request();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::CONFLICT);

    // unknown jobs 404
    let req = test::TestRequest::get()
        .uri("/rest_api/v4/statusjobs/jobs/none/status")
        .to_request();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_rt::test]
async fn test_output_update() {
    let Some(ctx) = helpers::setup().await else { return };
    ctx.reset_project("outjobs").await;
    let app = ctx.app().await;

    assert_eq!(
        insert_job(&app, "outjobs", json!({"id": "1", "source_url": TEST_URL})).await,
        StatusCode::CREATED
    );

    let req = test::TestRequest::put()
        .uri("/rest_api/v4/outjobs/jobs/1/output")
        .insert_header(worker_auth())
        .set_json(json!({"BadOutput": "x"}))
        .to_request();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing \"Output\" field in request data");

    let req = test::TestRequest::put()
        .uri("/rest_api/v4/outjobs/jobs/1/output")
        .insert_header(worker_auth())
        .set_json(json!({"Output": "Testing output update."}))
        .to_request();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);

    let req = test::TestRequest::get()
        .uri("/rest_api/v4/outjobs/jobs/1/output")
        .to_request();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["Output"], "Testing output update.");

    let req = test::TestRequest::get()
        .uri("/rest_api/v4/outjobs/jobs/none/output")
        .to_request();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
