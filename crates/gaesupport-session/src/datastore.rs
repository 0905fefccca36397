//! Cloud Datastore v1 REST adapter for the entity store port.
//!
//! Uses three RPCs: `:lookup` for key fetches, `:commit` in
//! `NON_TRANSACTIONAL` mode for upserts and deletes, and `:runQuery` for
//! filtered scans. Requests carry a bearer token from a [`TokenProvider`]
//! unless the client points at the emulator.
//!
//! [`TokenProvider`]: gaesupport_types::TokenProvider

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use gaesupport_types::SharedTokenProvider;
use gaesupport_types::config::defaults;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value as Json, json};
use tracing::{debug, trace};

use crate::entity::{Entity, EntityStore, FilterOp, Key, Property, Query, Value};
use crate::error::{EntityError, EntityResult};

/// Production Cloud Datastore endpoint.
pub const DATASTORE_API_URL: &str = "https://datastore.googleapis.com";

/// Service limit on mutations in one commit.
pub const MAX_MUTATIONS_PER_COMMIT: usize = 500;

/// Pseudo-property projected by keys-only queries.
const KEY_PROPERTY: &str = "__key__";

/// Entity store backed by Cloud Datastore.
#[derive(Debug, Clone)]
pub struct DatastoreClient {
    client: reqwest::Client,
    base_url: String,
    project_id: String,
    tokens: Option<SharedTokenProvider>,
}

impl DatastoreClient {
    /// Client for the production endpoint, authenticated by `tokens`.
    pub fn new(project_id: impl Into<String>, tokens: SharedTokenProvider) -> Self {
        Self {
            client: http_client(),
            base_url: DATASTORE_API_URL.to_string(),
            project_id: project_id.into(),
            tokens: Some(tokens),
        }
    }

    /// Client for a datastore emulator at `host` (`localhost:8081` or a full
    /// URL). No token is sent.
    pub fn emulator(host: &str, project_id: impl Into<String>) -> Self {
        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", host.trim_end_matches('/'))
        };
        Self {
            client: http_client(),
            base_url,
            project_id: project_id.into(),
            tokens: None,
        }
    }

    /// Override the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/v1/projects/{}:{}", self.base_url, self.project_id, method)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: &Json) -> EntityResult<T> {
        let mut request = self.client.post(self.endpoint(method)).json(body);
        if let Some(tokens) = &self.tokens
            && let Some(token) = tokens.access_token().await?
        {
            request = request.bearer_auth(token);
        }

        trace!(method, project = %self.project_id, "Datastore request");
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EntityError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| EntityError::Decode(e.to_string()))
    }

    async fn commit(&self, mutations: Vec<Json>) -> EntityResult<()> {
        let body = json!({
            "mode": "NON_TRANSACTIONAL",
            "mutations": mutations,
        });
        let _: CommitResponse = self.call("commit", &body).await?;
        Ok(())
    }

    fn encode_key(&self, key: &Key) -> Json {
        json!({
            "partitionId": { "projectId": self.project_id },
            "path": [{ "kind": key.kind, "name": key.name }],
        })
    }

    fn encode_entity(&self, entity: &Entity) -> Json {
        let properties: serde_json::Map<String, Json> = entity
            .properties
            .iter()
            .map(|(name, prop)| (name.clone(), encode_property(prop)))
            .collect();
        json!({
            "key": self.encode_key(&entity.key),
            "properties": properties,
        })
    }

    fn encode_query(&self, query: &Query, cursor: Option<&str>) -> Json {
        let mut q = json!({ "kind": [{ "name": query.kind }] });

        let filters: Vec<Json> = query
            .filters
            .iter()
            .map(|f| {
                json!({
                    "propertyFilter": {
                        "property": { "name": f.property },
                        "op": filter_op(f.op),
                        "value": encode_value(&f.value),
                    }
                })
            })
            .collect();

        match filters.len() {
            0 => {}
            1 => q["filter"] = filters.into_iter().next().unwrap_or(Json::Null),
            _ => q["filter"] = json!({ "compositeFilter": { "op": "AND", "filters": filters } }),
        }

        if query.keys_only {
            q["projection"] = json!([{ "property": { "name": KEY_PROPERTY } }]);
        }

        if let Some(cursor) = cursor {
            q["startCursor"] = json!(cursor);
        }

        json!({
            "partitionId": { "projectId": self.project_id },
            "query": q,
        })
    }
}

#[async_trait]
impl EntityStore for DatastoreClient {
    async fn fetch_by_key(&self, key: &Key) -> EntityResult<Option<Entity>> {
        let body = json!({ "keys": [self.encode_key(key)] });
        let response: LookupResponse = self.call("lookup", &body).await?;
        response
            .found
            .into_iter()
            .next()
            .map(|r| decode_entity(r.entity))
            .transpose()
    }

    async fn upsert(&self, entity: &Entity) -> EntityResult<()> {
        self.commit(vec![json!({ "upsert": self.encode_entity(entity) })])
            .await
    }

    async fn delete(&self, keys: &[Key]) -> EntityResult<()> {
        for chunk in keys.chunks(MAX_MUTATIONS_PER_COMMIT) {
            let mutations = chunk
                .iter()
                .map(|k| json!({ "delete": self.encode_key(k) }))
                .collect();
            self.commit(mutations).await?;
            debug!(count = chunk.len(), "Deleted datastore entities");
        }
        Ok(())
    }

    async fn query(&self, query: &Query) -> EntityResult<Vec<Entity>> {
        let mut entities = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let body = self.encode_query(query, cursor.as_deref());
            let response: RunQueryResponse = self.call("runQuery", &body).await?;
            let batch = response.batch;

            for result in batch.entity_results {
                let entity = if query.keys_only {
                    Entity::new(decode_key(result.entity.key)?)
                } else {
                    decode_entity(result.entity)?
                };
                entities.push(entity);
            }

            match (batch.more_results.as_str(), batch.end_cursor) {
                ("NOT_FINISHED", Some(next)) if cursor.as_deref() != Some(next.as_str()) => {
                    cursor = Some(next);
                }
                _ => break,
            }
        }

        Ok(entities)
    }
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(defaults::http_timeout())
        .build()
        .unwrap_or_default()
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire encoding
// ─────────────────────────────────────────────────────────────────────────────

fn filter_op(op: FilterOp) -> &'static str {
    match op {
        FilterOp::LessThan => "LESS_THAN",
        FilterOp::LessThanOrEqual => "LESS_THAN_OR_EQUAL",
        FilterOp::GreaterThan => "GREATER_THAN",
        FilterOp::GreaterThanOrEqual => "GREATER_THAN_OR_EQUAL",
        FilterOp::Equal => "EQUAL",
    }
}

fn encode_value(value: &Value) -> Json {
    match value {
        Value::String(s) => json!({ "stringValue": s }),
        Value::Timestamp(t) => {
            json!({ "timestampValue": t.to_rfc3339_opts(SecondsFormat::Micros, true) })
        }
        // int64 travels as a JSON string
        Value::Integer(i) => json!({ "integerValue": i.to_string() }),
        Value::Boolean(b) => json!({ "booleanValue": b }),
        Value::Null => json!({ "nullValue": null }),
    }
}

fn encode_property(prop: &Property) -> Json {
    let mut encoded = encode_value(&prop.value);
    if !prop.indexed {
        encoded["excludeFromIndexes"] = json!(true);
    }
    encoded
}

fn decode_value(name: &str, raw: &Json) -> EntityResult<Property> {
    let obj = raw
        .as_object()
        .ok_or_else(|| EntityError::Decode(format!("property '{}' is not an object", name)))?;
    let indexed = !obj
        .get("excludeFromIndexes")
        .and_then(Json::as_bool)
        .unwrap_or(false);

    let value = if let Some(s) = obj.get("stringValue").and_then(Json::as_str) {
        Value::String(s.to_string())
    } else if let Some(t) = obj.get("timestampValue").and_then(Json::as_str) {
        let parsed = DateTime::parse_from_rfc3339(t)
            .map_err(|e| EntityError::Decode(format!("property '{}': {}", name, e)))?;
        Value::Timestamp(parsed.with_timezone(&Utc))
    } else if let Some(i) = obj.get("integerValue") {
        let parsed = match i {
            Json::String(s) => s.parse().ok(),
            other => other.as_i64(),
        };
        Value::Integer(parsed.ok_or_else(|| {
            EntityError::Decode(format!("property '{}': bad integer {}", name, i))
        })?)
    } else if let Some(b) = obj.get("booleanValue").and_then(Json::as_bool) {
        Value::Boolean(b)
    } else if obj.contains_key("nullValue") {
        Value::Null
    } else {
        return Err(EntityError::Decode(format!(
            "property '{}' has an unsupported value type",
            name
        )));
    };

    Ok(Property { value, indexed })
}

fn decode_key(wire: WireKey) -> EntityResult<Key> {
    let element = wire
        .path
        .into_iter()
        .last()
        .ok_or_else(|| EntityError::Decode("entity key has an empty path".to_string()))?;
    let name = element
        .name
        .or(element.id)
        .ok_or_else(|| EntityError::Decode("entity key has neither name nor id".to_string()))?;
    Ok(Key::new(element.kind, name))
}

fn decode_entity(wire: WireEntity) -> EntityResult<Entity> {
    let mut entity = Entity::new(decode_key(wire.key)?);
    for (prop_name, raw) in &wire.properties {
        let prop = decode_value(prop_name, raw)?;
        entity.properties.insert(prop_name.clone(), prop);
    }
    Ok(entity)
}

#[derive(Debug, Deserialize)]
struct WirePathElement {
    kind: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireKey {
    #[serde(default)]
    path: Vec<WirePathElement>,
}

#[derive(Debug, Deserialize)]
struct WireEntity {
    key: WireKey,
    #[serde(default)]
    properties: BTreeMap<String, Json>,
}

#[derive(Debug, Deserialize)]
struct WireEntityResult {
    entity: WireEntity,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    found: Vec<WireEntityResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResultBatch {
    #[serde(default)]
    entity_results: Vec<WireEntityResult>,
    #[serde(default)]
    end_cursor: Option<String>,
    #[serde(default)]
    more_results: String,
}

#[derive(Debug, Deserialize)]
struct RunQueryResponse {
    batch: QueryResultBatch,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {}
