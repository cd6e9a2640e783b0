//! HTTP implementation of [`ClusterActions`] against the cluster's
//! native REST API.
//!
//! Status-code classification: transport errors, 408/429, and 5xx are
//! retryable; 401/403 are auth failures; 400 is fatal unless the error
//! type names an already-existing resource.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use docshift_types::{
    AliasAction, BulkItemFailure, BulkResponse, ClusterError, ControlRecord, CursorToken,
    DocumentBatch, DocumentRecord, HealthStatus, IndexDescriptor, IndexFamily, IndexName,
    Mappings, MigrationState, OutdatedQuery,
};

use crate::actions::ClusterActions;

/// Keep-alive for point-in-time cursors.
const CURSOR_KEEP_ALIVE: &str = "2m";

fn default_control_index() -> String {
    ".docshift-control".to_string()
}

/// Connection settings for [`HttpCluster`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSettings {
    /// Base URL of the cluster, e.g. `http://localhost:9200`.
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Index holding migration control documents.
    #[serde(default = "default_control_index")]
    pub control_index: String,
}

/// Cluster client speaking the native HTTP API.
pub struct HttpCluster {
    client: Client,
    settings: ClusterSettings,
}

impl HttpCluster {
    /// Create a client from connection settings.
    #[must_use]
    pub fn new(settings: ClusterSettings) -> Self {
        Self {
            client: Client::new(),
            settings,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.settings.url.trim_end_matches('/'), path)
    }

    async fn send(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<(StatusCode, Value), ClusterError> {
        let req = match &self.settings.username {
            Some(user) => req.basic_auth(user, self.settings.password.as_deref()),
            None => req,
        };
        let resp = req
            .send()
            .await
            .map_err(|e| ClusterError::network(e.to_string()))?;
        let status = resp.status();
        let body = resp.json::<Value>().await.unwrap_or(Value::Null);
        Ok((status, body))
    }

    async fn get(&self, path: &str) -> Result<(StatusCode, Value), ClusterError> {
        self.send(self.client.get(self.url(path))).await
    }

    async fn put_json(&self, path: &str, body: Value) -> Result<(StatusCode, Value), ClusterError> {
        self.send(self.client.put(self.url(path)).json(&body)).await
    }

    async fn post_json(
        &self,
        path: &str,
        body: Value,
    ) -> Result<(StatusCode, Value), ClusterError> {
        self.send(self.client.post(self.url(path)).json(&body))
            .await
    }
}

/// Map a non-success response to a classified error.
fn classify_response(status: StatusCode, body: &Value) -> ClusterError {
    let err_type = body
        .pointer("/error/type")
        .and_then(Value::as_str)
        .unwrap_or("");
    let reason = body
        .pointer("/error/reason")
        .and_then(Value::as_str)
        .unwrap_or("");
    let message = if reason.is_empty() {
        format!("http status {status}")
    } else {
        format!("{err_type}: {reason}")
    };

    match status.as_u16() {
        401 | 403 => ClusterError::auth(message),
        404 => ClusterError::not_found(message),
        409 => ClusterError::version_conflict(message),
        408 | 429 => ClusterError::not_ready(message),
        400 => match err_type {
            "resource_already_exists_exception" => ClusterError::already_exists(message),
            "mapper_parsing_exception"
            | "illegal_argument_exception"
            | "strict_dynamic_mapping_exception" => ClusterError::mapping_conflict(message),
            _ => ClusterError::bad_request(message),
        },
        s if s >= 500 => ClusterError::internal(message),
        _ => ClusterError::bad_request(message),
    }
}

fn mappings_body(mappings: &Mappings) -> Value {
    json!({
        "_meta": { "version": mappings.version },
        "properties": mappings.properties,
    })
}

#[allow(clippy::cast_possible_truncation)]
fn mappings_from_body(body: &Value) -> Mappings {
    Mappings {
        version: body
            .pointer("/_meta/version")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32,
        properties: body.get("properties").cloned().unwrap_or_else(|| json!({})),
    }
}

/// Query DSL for "documents older than the current version of their type".
fn outdated_query_dsl(query: &OutdatedQuery) -> Value {
    let clauses: Vec<Value> = query
        .current_versions
        .iter()
        .map(|(doc_type, version)| {
            json!({
                "bool": {
                    "filter": [
                        { "term": { "doc_type": doc_type } },
                        { "range": { "schema_version": { "lt": version } } },
                    ]
                }
            })
        })
        .collect();
    json!({ "bool": { "should": clauses, "minimum_should_match": 1 } })
}

/// Wire form of a stored document's `_source`.
#[derive(Debug, Serialize, Deserialize)]
struct StoredSource {
    doc_type: String,
    schema_version: u32,
    attributes: Value,
}

fn doc_source(doc: &DocumentRecord) -> Value {
    json!({
        "doc_type": doc.doc_type,
        "schema_version": doc.schema_version,
        "attributes": doc.attributes,
    })
}

fn doc_from_hit(hit: &Value) -> Option<DocumentRecord> {
    let id = hit.get("_id")?.as_str()?.to_string();
    let source: StoredSource = serde_json::from_value(hit.get("_source")?.clone()).ok()?;
    Some(DocumentRecord {
        id,
        doc_type: source.doc_type,
        schema_version: source.schema_version,
        attributes: source.attributes,
        seq_no: hit.get("_seq_no").and_then(Value::as_u64),
        primary_term: hit.get("_primary_term").and_then(Value::as_u64),
    })
}

/// Serialized state of an HTTP cursor: a point-in-time id plus the
/// `search_after` position. Opaque to the engine.
#[derive(Debug, Serialize, Deserialize)]
struct HttpCursor {
    pit_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    search_after: Option<Value>,
    size: u32,
    query: Value,
}

impl HttpCursor {
    fn to_token(&self) -> Result<CursorToken, ClusterError> {
        serde_json::to_string(self)
            .map(CursorToken::new)
            .map_err(|e| ClusterError::bad_request(format!("cursor encode: {e}")))
    }

    fn from_token(token: &CursorToken) -> Result<Self, ClusterError> {
        serde_json::from_str(token.as_str())
            .map_err(|e| ClusterError::bad_request(format!("cursor decode: {e}")))
    }
}

#[async_trait]
impl ClusterActions for HttpCluster {
    async fn fetch_index(&self, name: &IndexName) -> Result<Option<IndexDescriptor>, ClusterError> {
        let (status, body) = self.get(name.as_str()).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(classify_response(status, &body));
        }
        let entry = body
            .get(name.as_str())
            .ok_or_else(|| ClusterError::internal("index response missing entry"))?;
        let aliases = entry
            .get("aliases")
            .and_then(Value::as_object)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        let write_blocked = entry
            .pointer("/settings/index/blocks/write")
            .and_then(Value::as_str)
            == Some("true");
        let mappings = entry
            .get("mappings")
            .map(mappings_from_body)
            .unwrap_or_else(|| Mappings::empty(0));
        Ok(Some(IndexDescriptor {
            name: name.clone(),
            aliases,
            write_blocked,
            mappings,
        }))
    }

    async fn resolve_alias(&self, alias: &str) -> Result<Option<IndexName>, ClusterError> {
        let (status, body) = self.get(&format!("_alias/{alias}")).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(classify_response(status, &body));
        }
        Ok(body
            .as_object()
            .and_then(|m| m.keys().next().cloned())
            .map(IndexName::new))
    }

    async fn create_index(
        &self,
        name: &IndexName,
        mappings: &Mappings,
    ) -> Result<bool, ClusterError> {
        let body = json!({ "mappings": mappings_body(mappings) });
        let (status, resp) = self.put_json(name.as_str(), body).await?;
        if status.is_success() {
            return Ok(true);
        }
        let err = classify_response(status, &resp);
        if err.category == docshift_types::ErrorCategory::AlreadyExists {
            tracing::debug!(index = %name, "Index already exists, treating as created");
            return Ok(false);
        }
        Err(err)
    }

    async fn clone_index(
        &self,
        source: &IndexName,
        target: &IndexName,
    ) -> Result<bool, ClusterError> {
        let path = format!("{source}/_clone/{target}");
        let (status, resp) = self.post_json(&path, json!({})).await?;
        if status.is_success() {
            return Ok(true);
        }
        let err = classify_response(status, &resp);
        if err.category == docshift_types::ErrorCategory::AlreadyExists {
            tracing::debug!(index = %target, "Clone target already exists, treating as cloned");
            return Ok(false);
        }
        Err(err)
    }

    async fn set_write_block(&self, name: &IndexName, blocked: bool) -> Result<(), ClusterError> {
        let body = json!({ "index.blocks.write": blocked });
        let (status, resp) = self.put_json(&format!("{name}/_settings"), body).await?;
        if status.is_success() {
            Ok(())
        } else {
            Err(classify_response(status, &resp))
        }
    }

    async fn put_mappings(
        &self,
        name: &IndexName,
        mappings: &Mappings,
    ) -> Result<(), ClusterError> {
        let (status, resp) = self
            .put_json(&format!("{name}/_mapping"), mappings_body(mappings))
            .await?;
        if status.is_success() {
            Ok(())
        } else {
            Err(classify_response(status, &resp))
        }
    }

    async fn update_aliases(&self, actions: &[AliasAction]) -> Result<(), ClusterError> {
        let actions: Vec<Value> = actions
            .iter()
            .map(|action| match action {
                AliasAction::Add { index, alias } => {
                    json!({ "add": { "index": index, "alias": alias } })
                }
                AliasAction::Remove { index, alias } => {
                    json!({ "remove": { "index": index, "alias": alias } })
                }
            })
            .collect();
        let (status, resp) = self
            .post_json("_aliases", json!({ "actions": actions }))
            .await?;
        if status.is_success() {
            Ok(())
        } else {
            Err(classify_response(status, &resp))
        }
    }

    async fn wait_for_health(
        &self,
        name: &IndexName,
        at_least: HealthStatus,
        timeout: Duration,
    ) -> Result<HealthStatus, ClusterError> {
        let path = format!(
            "_cluster/health/{name}?wait_for_status={at_least}&timeout={}ms",
            timeout.as_millis()
        );
        let (status, body) = self.get(&path).await?;
        if !status.is_success() && status != StatusCode::REQUEST_TIMEOUT {
            return Err(classify_response(status, &body));
        }
        let observed = match body.get("status").and_then(Value::as_str) {
            Some("green") => HealthStatus::Green,
            Some("yellow") => HealthStatus::Yellow,
            _ => HealthStatus::Red,
        };
        let timed_out = body.get("timed_out").and_then(Value::as_bool) == Some(true);
        if timed_out || observed < at_least {
            return Err(ClusterError::not_ready(format!(
                "index '{name}' health {observed}, waiting for {at_least}"
            )));
        }
        Ok(observed)
    }

    async fn reindex(&self, source: &IndexName, dest: &IndexName) -> Result<u64, ClusterError> {
        let body = json!({
            "source": { "index": source },
            "dest": { "index": dest },
        });
        let (status, resp) = self
            .post_json("_reindex?wait_for_completion=true&refresh=true", body)
            .await?;
        if !status.is_success() {
            return Err(classify_response(status, &resp));
        }
        Ok(resp.get("total").and_then(Value::as_u64).unwrap_or(0))
    }

    async fn count_documents(&self, name: &IndexName) -> Result<u64, ClusterError> {
        let (status, body) = self.get(&format!("{name}/_count")).await?;
        if !status.is_success() {
            return Err(classify_response(status, &body));
        }
        Ok(body.get("count").and_then(Value::as_u64).unwrap_or(0))
    }

    async fn open_cursor(
        &self,
        name: &IndexName,
        query: &OutdatedQuery,
        batch_size: u32,
    ) -> Result<CursorToken, ClusterError> {
        let path = format!("{name}/_pit?keep_alive={CURSOR_KEEP_ALIVE}");
        let (status, body) = self.post_json(&path, json!({})).await?;
        if !status.is_success() {
            return Err(classify_response(status, &body));
        }
        let pit_id = body
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| ClusterError::internal("point-in-time response missing id"))?
            .to_string();
        HttpCursor {
            pit_id,
            search_after: None,
            size: batch_size,
            query: outdated_query_dsl(query),
        }
        .to_token()
    }

    async fn next_page(&self, cursor: &CursorToken) -> Result<DocumentBatch, ClusterError> {
        let parsed = HttpCursor::from_token(cursor)?;
        let mut body = json!({
            "size": parsed.size,
            "query": parsed.query,
            "pit": { "id": parsed.pit_id, "keep_alive": CURSOR_KEEP_ALIVE },
            "sort": [{ "_shard_doc": "asc" }],
            "seq_no_primary_term": true,
        });
        if let Some(after) = &parsed.search_after {
            body["search_after"] = after.clone();
        }
        let (status, resp) = self.post_json("_search", body).await?;
        if !status.is_success() {
            return Err(classify_response(status, &resp));
        }
        let hits = resp
            .pointer("/hits/hits")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let documents: Vec<DocumentRecord> = hits.iter().filter_map(doc_from_hit).collect();
        let continuation = if hits.len() == parsed.size as usize {
            let last_sort = hits.last().and_then(|h| h.get("sort")).cloned();
            Some(
                HttpCursor {
                    pit_id: parsed.pit_id,
                    search_after: last_sort,
                    size: parsed.size,
                    query: parsed.query,
                }
                .to_token()?,
            )
        } else {
            None
        };
        Ok(DocumentBatch {
            documents,
            continuation,
        })
    }

    async fn close_cursor(&self, cursor: &CursorToken) -> Result<(), ClusterError> {
        let parsed = HttpCursor::from_token(cursor)?;
        let req = self
            .client
            .delete(self.url("_pit"))
            .json(&json!({ "id": parsed.pit_id }));
        let (status, body) = self.send(req).await?;
        if status.is_success() || status == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(classify_response(status, &body))
        }
    }

    async fn bulk_index(
        &self,
        name: &IndexName,
        documents: &[DocumentRecord],
    ) -> Result<BulkResponse, ClusterError> {
        let mut ndjson = String::new();
        for doc in documents {
            let action = json!({ "index": { "_index": name, "_id": doc.id } });
            ndjson.push_str(&action.to_string());
            ndjson.push('\n');
            ndjson.push_str(&doc_source(doc).to_string());
            ndjson.push('\n');
        }
        let req = self
            .client
            .post(self.url("_bulk?refresh=true"))
            .header("content-type", "application/x-ndjson")
            .body(ndjson);
        let (status, resp) = self.send(req).await?;
        if !status.is_success() {
            return Err(classify_response(status, &resp));
        }

        let mut response = BulkResponse::default();
        let items = resp
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for item in items {
            let Some(op) = item.get("index") else { continue };
            if let Some(error) = op.get("error") {
                let doc_id = op
                    .get("_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let item_status = op
                    .get("status")
                    .and_then(Value::as_u64)
                    .and_then(|s| u16::try_from(s).ok())
                    .and_then(|s| StatusCode::from_u16(s).ok())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                response.failures.push(BulkItemFailure {
                    doc_id,
                    error: classify_response(item_status, &json!({ "error": error })),
                });
            } else {
                response.indexed += 1;
            }
        }
        Ok(response)
    }

    async fn read_control(
        &self,
        family: &IndexFamily,
    ) -> Result<Option<ControlRecord>, ClusterError> {
        let path = format!("{}/_doc/{family}", self.settings.control_index);
        let (status, body) = self.get(&path).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(classify_response(status, &body));
        }
        let source = body
            .get("_source")
            .ok_or_else(|| ClusterError::internal("control document missing _source"))?;
        let state: MigrationState = serde_json::from_value(source.clone())
            .map_err(|e| ClusterError::internal(format!("control document decode: {e}")))?;
        let seq_no = body
            .get("_seq_no")
            .and_then(Value::as_u64)
            .ok_or_else(|| ClusterError::internal("control document missing _seq_no"))?;
        Ok(Some(ControlRecord { state, seq_no }))
    }

    async fn cas_control(
        &self,
        family: &IndexFamily,
        state: &MigrationState,
        expected_seq: Option<u64>,
    ) -> Result<Option<u64>, ClusterError> {
        let body = serde_json::to_value(state)
            .map_err(|e| ClusterError::internal(format!("control document encode: {e}")))?;
        let path = match expected_seq {
            Some(seq) => {
                // CAS on the cluster needs the primary term alongside the
                // sequence number; look it up from the current document.
                let current = self.read_control(family).await?;
                let Some(current) = current else {
                    return Ok(None);
                };
                if current.seq_no != seq {
                    return Ok(None);
                }
                let (_, doc) = self
                    .get(&format!("{}/_doc/{family}", self.settings.control_index))
                    .await?;
                let term = doc
                    .get("_primary_term")
                    .and_then(Value::as_u64)
                    .unwrap_or(1);
                format!(
                    "{}/_doc/{family}?if_seq_no={seq}&if_primary_term={term}&refresh=true",
                    self.settings.control_index
                )
            }
            None => format!(
                "{}/_create/{family}?refresh=true",
                self.settings.control_index
            ),
        };
        let (status, resp) = self.put_json(&path, body).await?;
        if status == StatusCode::CONFLICT {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(classify_response(status, &resp));
        }
        Ok(resp.get("_seq_no").and_then(Value::as_u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_maps_auth_statuses_to_fatal() {
        let err = classify_response(StatusCode::FORBIDDEN, &Value::Null);
        assert_eq!(err.category, docshift_types::ErrorCategory::Auth);
        assert!(!err.is_retryable());
    }

    #[test]
    fn classify_maps_server_errors_to_retryable() {
        let err = classify_response(StatusCode::SERVICE_UNAVAILABLE, &Value::Null);
        assert_eq!(err.category, docshift_types::ErrorCategory::Internal);
        assert!(err.is_retryable());
    }

    #[test]
    fn classify_recognizes_already_exists() {
        let body = json!({
            "error": {
                "type": "resource_already_exists_exception",
                "reason": "index [docs_v2] already exists"
            }
        });
        let err = classify_response(StatusCode::BAD_REQUEST, &body);
        assert_eq!(err.category, docshift_types::ErrorCategory::AlreadyExists);
        assert!(err.message.contains("docs_v2"));
    }

    #[test]
    fn classify_recognizes_mapping_conflicts_as_fatal() {
        let body = json!({
            "error": {
                "type": "mapper_parsing_exception",
                "reason": "cannot change field type"
            }
        });
        let err = classify_response(StatusCode::BAD_REQUEST, &body);
        assert_eq!(err.category, docshift_types::ErrorCategory::MappingConflict);
        assert!(!err.is_retryable());
    }

    #[test]
    fn outdated_query_dsl_emits_one_clause_per_type() {
        let mut query = OutdatedQuery::default();
        query.current_versions.insert("a".into(), 2);
        query.current_versions.insert("b".into(), 5);
        let dsl = outdated_query_dsl(&query);
        let clauses = dsl.pointer("/bool/should").unwrap().as_array().unwrap();
        assert_eq!(clauses.len(), 2);
        assert_eq!(
            clauses[0].pointer("/bool/filter/1/range/schema_version/lt"),
            Some(&json!(2))
        );
    }

    #[test]
    fn cursor_token_round_trips() {
        let cursor = HttpCursor {
            pit_id: "pit-abc".into(),
            search_after: Some(json!([42, "doc-id"])),
            size: 500,
            query: json!({ "match_all": {} }),
        };
        let token = cursor.to_token().unwrap();
        let back = HttpCursor::from_token(&token).unwrap();
        assert_eq!(back.pit_id, "pit-abc");
        assert_eq!(back.size, 500);
        assert_eq!(back.search_after, Some(json!([42, "doc-id"])));
    }

    #[test]
    fn doc_from_hit_extracts_seq_metadata() {
        let hit = json!({
            "_id": "a:1",
            "_seq_no": 12,
            "_primary_term": 2,
            "_source": {
                "doc_type": "a",
                "schema_version": 1,
                "attributes": { "title": "x" }
            }
        });
        let doc = doc_from_hit(&hit).unwrap();
        assert_eq!(doc.id, "a:1");
        assert_eq!(doc.seq_no, Some(12));
        assert_eq!(doc.schema_version, 1);
    }
}
