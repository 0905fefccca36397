//! DatastoreClient against an axum fake of the Datastore v1 REST API.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use chrono::{TimeZone, Utc};
use gaesupport_session::{
    DataStoreSessionHandler, DatastoreClient, EntityError, EntityStore, FilterOp, InMemoryCache,
    Key, MAX_MUTATIONS_PER_COMMIT, Query, SessionStoreConfig, Value, session_schema,
};
use gaesupport_types::StaticTokenProvider;
use parking_lot::Mutex;
use serde_json::{Value as JsonValue, json};

const PAGE_SIZE: usize = 2;

#[derive(Default)]
struct Fake {
    /// Entity JSON by key name.
    entities: BTreeMap<String, JsonValue>,
    commit_sizes: Vec<usize>,
    auth_headers: Vec<Option<String>>,
    query_bodies: Vec<JsonValue>,
}

type Shared = Arc<Mutex<Fake>>;

async fn rpc(
    State(fake): State<Shared>,
    Path(call): Path<String>,
    headers: HeaderMap,
    Json(body): Json<JsonValue>,
) -> Result<Json<JsonValue>, (StatusCode, String)> {
    let mut fake = fake.lock();
    fake.auth_headers.push(
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    );

    let method = call.rsplit(':').next().unwrap_or_default().to_string();
    match method.as_str() {
        "lookup" => {
            let name = body["keys"][0]["path"][0]["name"].as_str().unwrap_or_default();
            let found: Vec<JsonValue> = fake
                .entities
                .get(name)
                .map(|e| json!({ "entity": e }))
                .into_iter()
                .collect();
            Ok(Json(json!({ "found": found })))
        }
        "commit" => {
            assert_eq!(body["mode"], "NON_TRANSACTIONAL");
            let mutations = body["mutations"].as_array().cloned().unwrap_or_default();
            fake.commit_sizes.push(mutations.len());
            for m in mutations {
                if let Some(entity) = m.get("upsert") {
                    let name = entity["key"]["path"][0]["name"].as_str().unwrap().to_string();
                    fake.entities.insert(name, entity.clone());
                } else if let Some(key) = m.get("delete") {
                    let name = key["path"][0]["name"].as_str().unwrap();
                    fake.entities.remove(name);
                }
            }
            Ok(Json(json!({ "indexUpdates": 1 })))
        }
        "runQuery" => {
            fake.query_bodies.push(body.clone());
            let start: usize = body["query"]["startCursor"]
                .as_str()
                .and_then(|c| c.strip_prefix("page-"))
                .and_then(|n| n.parse().ok())
                .unwrap_or(0);
            let keys_only = body["query"]["projection"][0]["property"]["name"] == "__key__";
            let all: Vec<JsonValue> = fake
                .entities
                .values()
                .map(|e| {
                    if keys_only {
                        json!({ "key": e["key"] })
                    } else {
                        e.clone()
                    }
                })
                .collect();
            let end = (start + PAGE_SIZE).min(all.len());
            let results: Vec<JsonValue> = all[start..end]
                .iter()
                .map(|e| json!({ "entity": e }))
                .collect();
            let more = if end < all.len() {
                "NOT_FINISHED"
            } else {
                "NO_MORE_RESULTS"
            };
            Ok(Json(json!({
                "batch": {
                    "entityResults": results,
                    "endCursor": format!("page-{}", end),
                    "moreResults": more,
                }
            })))
        }
        _ => Err((StatusCode::NOT_FOUND, format!("unknown method {}", method))),
    }
}

async fn spawn_fake() -> (String, Shared) {
    let fake: Shared = Arc::default();
    let app = Router::new()
        .route("/v1/projects/{call}", post(rpc))
        .with_state(Arc::clone(&fake));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{}", addr), fake)
}

fn session(name: &str, data: &str) -> gaesupport_session::Entity {
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    session_schema()
        .create_entity(
            name,
            [("data", Value::from(data)), ("lastaccess", Value::from(at))],
        )
        .unwrap()
}

#[tokio::test]
async fn test_upsert_then_lookup() {
    let (url, fake) = spawn_fake().await;
    let client = DatastoreClient::emulator(&url, "my-app");

    client.upsert(&session("s1", "payload")).await.unwrap();
    let found = client
        .fetch_by_key(&Key::new("sessions", "s1"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(found, session("s1", "payload"));
    assert_eq!(fake.lock().commit_sizes, vec![1]);
}

#[tokio::test]
async fn test_lookup_missing() {
    let (url, _fake) = spawn_fake().await;
    let client = DatastoreClient::emulator(&url, "my-app");
    assert!(
        client
            .fetch_by_key(&Key::new("sessions", "nope"))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_bearer_token_sent_unless_emulator() {
    let (url, fake) = spawn_fake().await;

    let authed = DatastoreClient::new("my-app", Arc::new(StaticTokenProvider::new("tok")))
        .with_base_url(&url);
    authed.fetch_by_key(&Key::new("sessions", "a")).await.unwrap();

    let emulator = DatastoreClient::emulator(&url, "my-app");
    emulator.fetch_by_key(&Key::new("sessions", "a")).await.unwrap();

    let headers = fake.lock().auth_headers.clone();
    assert_eq!(headers, vec![Some("Bearer tok".to_string()), None]);
}

#[tokio::test]
async fn test_query_follows_cursor() {
    let (url, fake) = spawn_fake().await;
    let client = DatastoreClient::emulator(&url, "my-app");
    for i in 0..5 {
        client
            .upsert(&session(&format!("s{}", i), "x"))
            .await
            .unwrap();
    }

    let cutoff = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    let query = Query::kind("sessions").filter("lastaccess", FilterOp::LessThan, cutoff.into());
    let found = client.query(&query).await.unwrap();

    assert_eq!(found.len(), 5);
    let fake = fake.lock();
    assert_eq!(fake.query_bodies.len(), 3);
    assert_eq!(
        fake.query_bodies[0]["query"]["filter"]["propertyFilter"]["property"]["name"],
        "lastaccess"
    );
    assert_eq!(fake.query_bodies[1]["query"]["startCursor"], "page-2");
}

#[tokio::test]
async fn test_purge_ignores_undecodable_properties() {
    let (url, fake) = spawn_fake().await;
    let client = Arc::new(DatastoreClient::emulator(&url, "my-app"));
    client.upsert(&session("good", "x")).await.unwrap();
    fake.lock().entities.insert(
        "bad".to_string(),
        json!({
            "key": { "path": [{ "kind": "sessions", "name": "bad" }] },
            "properties": { "data": { "blobValue": "AAEC" } },
        }),
    );

    let full = client.query(&Query::kind("sessions")).await.unwrap_err();
    assert!(matches!(full, EntityError::Decode(_)));

    let keys = client
        .query(&Query::kind("sessions").keys_only())
        .await
        .unwrap();
    assert_eq!(keys.len(), 2);
    assert!(keys.iter().all(|e| e.properties.is_empty()));

    let handler = DataStoreSessionHandler::new(
        Arc::new(InMemoryCache::new()),
        client,
        SessionStoreConfig::new("app."),
    );
    let report = handler.purge_stale().await.unwrap();

    assert_eq!(report.deleted, 2);
    let fake = fake.lock();
    assert!(fake.entities.is_empty());
    assert_eq!(
        fake.query_bodies.last().unwrap()["query"]["projection"][0]["property"]["name"],
        "__key__"
    );
}

#[tokio::test]
async fn test_delete_is_chunked() {
    let (url, fake) = spawn_fake().await;
    let client = DatastoreClient::emulator(&url, "my-app");

    let keys: Vec<Key> = (0..MAX_MUTATIONS_PER_COMMIT + 20)
        .map(|i| Key::new("sessions", format!("s{}", i)))
        .collect();
    client.delete(&keys).await.unwrap();

    assert_eq!(
        fake.lock().commit_sizes,
        vec![MAX_MUTATIONS_PER_COMMIT, 20]
    );
}

#[tokio::test]
async fn test_api_error_status() {
    let (url, _fake) = spawn_fake().await;
    let client = DatastoreClient::emulator(&format!("{}/missing", url), "my-app");

    let err = client
        .fetch_by_key(&Key::new("sessions", "a"))
        .await
        .unwrap_err();
    assert!(matches!(err, EntityError::Api { status: 404, .. }));
}
