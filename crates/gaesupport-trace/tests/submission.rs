//! End-to-end submission: queue worker → submit endpoint, and Cloud Trace
//! client → patch API, both against axum fakes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Form, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{patch, post};
use axum::{Json, Router};
use gaesupport_trace::{
    CloudTraceClient, ReporterOptions, SUBMIT_FORM_FIELD, TaskQueueDispatcher, TeardownOutcome,
    TraceBackend, TraceContext, TraceError, TraceReporter, Traces,
};
use gaesupport_types::StaticTokenProvider;
use parking_lot::Mutex;

type Received = Arc<Mutex<Vec<Traces>>>;

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}", addr)
}

async fn spawn_submit_endpoint() -> (String, Received) {
    let received: Received = Arc::default();
    let app = Router::new()
        .route(
            "/gae/trace_submit",
            post(
                |State(received): State<Received>, Form(form): Form<HashMap<String, String>>| async move {
                    let data = form.get(SUBMIT_FORM_FIELD).cloned().unwrap_or_default();
                    let traces: Traces = serde_json::from_str(&data).unwrap();
                    received.lock().push(traces);
                    StatusCode::OK
                },
            ),
        )
        .with_state(Arc::clone(&received));
    (serve(app).await, received)
}

async fn wait_for(received: &Received, count: usize) {
    for _ in 0..100 {
        if received.lock().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_queue_worker_posts_each_page() {
    let (url, received) = spawn_submit_endpoint().await;
    let dispatcher = TaskQueueDispatcher::spawn(format!("{}/gae/trace_submit", url), 8);

    let mut reporter = TraceReporter::new(
        TraceContext::parse("trace-1/99;o=1"),
        ReporterOptions::new("my-app").with_page_size(2),
    );
    for name in ["a", "b", "c"] {
        reporter.start_span(name);
    }

    let report = reporter.finish(&dispatcher);
    assert_eq!(
        report.outcome,
        TeardownOutcome::Dispatched {
            batches: 2,
            accepted: 2
        }
    );

    wait_for(&received, 2).await;
    let received = received.lock();
    assert_eq!(received.len(), 2);
    let total: usize = received.iter().map(Traces::span_count).sum();
    assert_eq!(total, 3);
    let trace = &received[0].traces[0];
    assert_eq!(trace.project_id, "my-app");
    assert_eq!(trace.trace_id, "trace-1");
    assert!(trace.spans.iter().all(|s| s.end_time.is_some()));
    assert!(
        trace
            .spans
            .iter()
            .all(|s| s.parent_span_id.as_deref() == Some("99"))
    );
}

type Patched = Arc<Mutex<Vec<(String, Option<String>, Traces)>>>;

async fn spawn_cloud_trace(status: StatusCode) -> (String, Patched) {
    let patched: Patched = Arc::default();
    let app = Router::new()
        .route(
            "/v1/projects/{project}/traces",
            patch(
                move |State(patched): State<Patched>,
                      Path(project): Path<String>,
                      headers: HeaderMap,
                      Json(traces): Json<Traces>| async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    patched.lock().push((project, auth, traces));
                    status
                },
            ),
        )
        .with_state(Arc::clone(&patched));
    (serve(app).await, patched)
}

fn sample_traces() -> Traces {
    serde_json::from_value(serde_json::json!({
        "traces": [{
            "projectId": "my-app",
            "traceId": "t",
            "spans": [{
                "spanId": "1",
                "kind": "SPAN_KIND_UNSPECIFIED",
                "name": "request",
                "startTime": "2024-05-01T12:00:00.000000Z",
                "endTime": "2024-05-01T12:00:01.000000Z"
            }]
        }]
    }))
    .unwrap()
}

#[tokio::test]
async fn test_cloud_trace_client_patches_with_token() {
    let (url, patched) = spawn_cloud_trace(StatusCode::OK).await;
    let client =
        CloudTraceClient::new(Arc::new(StaticTokenProvider::new("tok"))).with_base_url(&url);

    client.patch_traces("my-app", &sample_traces()).await.unwrap();

    let patched = patched.lock();
    assert_eq!(patched.len(), 1);
    assert_eq!(patched[0].0, "my-app");
    assert_eq!(patched[0].1.as_deref(), Some("Bearer tok"));
    assert_eq!(patched[0].2, sample_traces());
}

#[tokio::test]
async fn test_cloud_trace_client_surfaces_api_errors() {
    let (url, _patched) = spawn_cloud_trace(StatusCode::FORBIDDEN).await;
    let client =
        CloudTraceClient::new(Arc::new(StaticTokenProvider::anonymous())).with_base_url(&url);

    let err = client
        .patch_traces("my-app", &sample_traces())
        .await
        .unwrap_err();
    assert!(matches!(err, TraceError::Api { status: 403, .. }));
}
