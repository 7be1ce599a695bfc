//! In-process [`Transport`] for tests and offline runs.
//!
//! Stores chunk documents in a map keyed by chunk uuid and answers searches
//! by evaluating the query-language `where` clause against the stored
//! fields. The evaluator understands exactly the grammar this crate emits:
//! `and`/`or`/`!`, parenthesized groups, `contains` on strings, arrays and
//! weighted sets, numeric comparisons, and the annotated `userInput` /
//! `nearestNeighbor` match clauses.
//!
//! Every request is recorded, and failures can be injected per operation
//! (next N calls) or per target (always).

use async_trait::async_trait;
use docindex_core::codec::{chunk_uuid, fields};
use docindex_core::error::Result;
use docindex_core::query::QueryParams;
use docindex_core::sanitize::remove_invalid_unicode_chars;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{RawResponse, Transport};

const DEFAULT_HITS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Get,
    Put,
    Update,
    Delete,
    Search,
    Deploy,
}

/// One request as seen by the fake. `target` is the chunk uuid for point
/// operations and the query string for searches.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub op: Operation,
    pub target: String,
}

#[derive(Default)]
struct State {
    docs: BTreeMap<String, Map<String, Value>>,
    requests: Vec<RecordedRequest>,
    searches: Vec<QueryParams>,
    fail_next: HashMap<Operation, VecDeque<u16>>,
    fail_target: HashMap<(Operation, String), u16>,
    fail_query: Vec<(String, u16)>,
    deployed: Option<Vec<u8>>,
}

pub struct InMemoryTransport {
    index_name: String,
    state: Mutex<State>,
}

impl InMemoryTransport {
    pub fn new(index_name: impl Into<String>) -> Self {
        Self {
            index_name: index_name.into(),
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn engine_id(&self, uuid: &str) -> String {
        format!("id:default:{}::{}", self.index_name, uuid)
    }

    /// Fail the next `times` calls of `op` with `status`.
    pub fn fail_next(&self, op: Operation, status: u16, times: usize) {
        let mut state = self.state();
        let queue = state.fail_next.entry(op).or_default();
        queue.extend(std::iter::repeat(status).take(times));
    }

    /// Fail every `op` on one chunk with `status`.
    pub fn fail_chunk(&self, op: Operation, document_id: &str, chunk_id: usize, status: u16) {
        let uuid = chunk_uuid(document_id, chunk_id).to_string();
        self.state().fail_target.insert((op, uuid), status);
    }

    /// Fail every search whose query string contains `fragment`.
    pub fn fail_query_containing(&self, fragment: impl Into<String>, status: u16) {
        self.state().fail_query.push((fragment.into(), status));
    }

    /// Store raw fields under a chunk uuid, bypassing validation.
    pub fn insert_fields(&self, uuid: impl Into<String>, fields: Map<String, Value>) {
        self.state().docs.insert(uuid.into(), fields);
    }

    /// Stored fields of one chunk.
    pub fn chunk(&self, document_id: &str, chunk_id: usize) -> Option<Map<String, Value>> {
        let uuid = chunk_uuid(document_id, chunk_id).to_string();
        self.state().docs.get(&uuid).cloned()
    }

    /// Stored chunk ids of a document, ascending.
    pub fn chunk_ids(&self, document_id: &str) -> Vec<usize> {
        let mut ids: Vec<usize> = self
            .state()
            .docs
            .values()
            .filter(|f| f.get(fields::DOCUMENT_ID).and_then(Value::as_str) == Some(document_id))
            .filter_map(|f| f.get(fields::CHUNK_ID).and_then(Value::as_u64))
            .map(|id| id as usize)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.state().docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().docs.is_empty()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state().requests.clone()
    }

    pub fn request_count(&self, op: Operation) -> usize {
        self.state().requests.iter().filter(|r| r.op == op).count()
    }

    pub fn clear_requests(&self) {
        let mut state = self.state();
        state.requests.clear();
        state.searches.clear();
    }

    /// Parameters of every search received, in order.
    pub fn searches(&self) -> Vec<QueryParams> {
        self.state().searches.clone()
    }

    pub fn deployed_package(&self) -> Option<Vec<u8>> {
        self.state().deployed.clone()
    }

    /// Record the request and return an injected failure, if any.
    fn begin(&self, state: &mut State, op: Operation, target: &str) -> Option<RawResponse> {
        state.requests.push(RecordedRequest {
            op,
            target: target.to_string(),
        });

        let status = state
            .fail_target
            .get(&(op, target.to_string()))
            .copied()
            .or_else(|| {
                if op == Operation::Search {
                    state
                        .fail_query
                        .iter()
                        .find(|(fragment, _)| target.contains(fragment.as_str()))
                        .map(|(_, status)| *status)
                } else {
                    None
                }
            })
            .or_else(|| state.fail_next.get_mut(&op).and_then(VecDeque::pop_front))?;

        Some(RawResponse::new(
            status,
            json!({ "message": "injected failure" }).to_string(),
        ))
    }

    fn evaluate(&self, state: &State, params: &QueryParams) -> Value {
        let yql = params.yql.as_str();
        let id_only = yql.starts_with(&format!("select {} from", fields::DOCUMENTID));
        let clause = yql.split_once(" where ").map(|(_, w)| w).unwrap_or("");
        let query = params.query.as_deref();

        let mut matches: Vec<(f64, &String, &Map<String, Value>)> = state
            .docs
            .iter()
            .filter(|(_, doc)| eval(clause, doc, query))
            .map(|(uuid, doc)| (text_overlap(doc, query) as f64, uuid, doc))
            .collect();
        matches.sort_by(|a, b| b.0.total_cmp(&a.0));

        let total = matches.len();
        let hits = if params.hits == 0 { DEFAULT_HITS } else { params.hits };
        let children: Vec<Value> = matches
            .into_iter()
            .skip(params.offset)
            .take(hits)
            .map(|(relevance, uuid, doc)| {
                let engine_id = self.engine_id(uuid);
                let mut out = if id_only { Map::new() } else { doc.clone() };
                out.insert(fields::DOCUMENTID.to_string(), Value::String(engine_id.clone()));
                json!({ "id": engine_id, "relevance": relevance, "fields": out })
            })
            .collect();

        let mut root = json!({ "id": "toplevel", "fields": { "totalCount": total } });
        if !children.is_empty() {
            root["children"] = Value::Array(children);
        }
        json!({ "root": root })
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn get_document(&self, id: &str) -> Result<RawResponse> {
        let mut state = self.state();
        if let Some(failure) = self.begin(&mut state, Operation::Get, id) {
            return Ok(failure);
        }
        let path_id = format!("/document/v1/default/{}/docid/{}", self.index_name, id);
        Ok(match state.docs.get(id) {
            Some(doc) => RawResponse::new(
                200,
                json!({ "pathId": path_id, "id": self.engine_id(id), "fields": doc }).to_string(),
            ),
            None => RawResponse::new(404, json!({ "pathId": path_id }).to_string()),
        })
    }

    async fn put_document(&self, id: &str, body: &Value) -> Result<RawResponse> {
        let mut state = self.state();
        if let Some(failure) = self.begin(&mut state, Operation::Put, id) {
            return Ok(failure);
        }
        let Some(doc) = body.get("fields").and_then(Value::as_object) else {
            return Ok(RawResponse::new(400, r#"{"message":"missing fields"}"#));
        };
        let invalid = doc
            .values()
            .filter_map(Value::as_str)
            .any(|s| remove_invalid_unicode_chars(s) != s);
        if invalid {
            return Ok(RawResponse::new(
                400,
                r#"{"message":"Could not parse field: invalid character"}"#,
            ));
        }
        state.docs.insert(id.to_string(), doc.clone());
        Ok(RawResponse::new(200, json!({ "id": self.engine_id(id) }).to_string()))
    }

    async fn update_document(&self, id: &str, body: &Value) -> Result<RawResponse> {
        let mut state = self.state();
        if let Some(failure) = self.begin(&mut state, Operation::Update, id) {
            return Ok(failure);
        }
        let Some(doc) = state.docs.get_mut(id) else {
            return Ok(RawResponse::new(404, r#"{"message":"Document not found"}"#));
        };
        if let Some(updates) = body.get("fields").and_then(Value::as_object) {
            for (name, update) in updates {
                if let Some(value) = update.get("assign") {
                    doc.insert(name.clone(), value.clone());
                }
            }
        }
        Ok(RawResponse::new(200, json!({ "id": self.engine_id(id) }).to_string()))
    }

    async fn delete_document(&self, id: &str) -> Result<RawResponse> {
        let mut state = self.state();
        if let Some(failure) = self.begin(&mut state, Operation::Delete, id) {
            return Ok(failure);
        }
        state.docs.remove(id);
        Ok(RawResponse::new(200, json!({ "id": self.engine_id(id) }).to_string()))
    }

    async fn search(&self, params: &QueryParams) -> Result<RawResponse> {
        let mut state = self.state();
        state.searches.push(params.clone());
        if let Some(failure) = self.begin(&mut state, Operation::Search, &params.yql) {
            return Ok(failure);
        }
        let body = self.evaluate(&state, params);
        Ok(RawResponse::new(200, body.to_string()))
    }

    async fn deploy_application(&self, package: Vec<u8>) -> Result<RawResponse> {
        let mut state = self.state();
        if let Some(failure) = self.begin(&mut state, Operation::Deploy, "application") {
            return Ok(failure);
        }
        state.deployed = Some(package);
        Ok(RawResponse::new(200, r#"{"message":"activated"}"#))
    }
}

fn eval(expr: &str, doc: &Map<String, Value>, query: Option<&str>) -> bool {
    let expr = expr.trim();
    if expr.is_empty() {
        return true;
    }

    let alternatives = split_top_level(expr, " or ");
    if alternatives.len() > 1 {
        return alternatives.iter().any(|e| eval(e, doc, query));
    }
    let terms = split_top_level(expr, " and ");
    if terms.len() > 1 {
        return terms.iter().all(|e| eval(e, doc, query));
    }

    if let Some(rest) = expr.strip_prefix('!') {
        return !eval(rest, doc, query);
    }
    if let Some(inner) = unwrap_parens(expr) {
        return eval(inner, doc, query);
    }
    if expr.starts_with('{') {
        if expr.contains("nearestNeighbor(") {
            return true;
        }
        if expr.contains("userInput(") {
            return text_overlap(doc, query) > 0;
        }
        return false;
    }
    eval_atom(expr, doc)
}

fn eval_atom(atom: &str, doc: &Map<String, Value>) -> bool {
    if let Some((field, literal)) = atom.split_once(" contains ") {
        let Some(needle) = unquote(literal.trim()) else {
            return false;
        };
        return match doc.get(field.trim()) {
            Some(Value::Object(set)) => set.contains_key(&needle),
            Some(Value::Array(items)) => items.iter().any(|v| v.as_str() == Some(needle.as_str())),
            Some(Value::String(s)) => *s == needle,
            Some(Value::Number(n)) => n.to_string() == needle,
            Some(Value::Bool(b)) => b.to_string() == needle,
            _ => false,
        };
    }

    for op in [">=", "<=", "!=", "<", ">", "="] {
        let Some((field, literal)) = atom.split_once(op) else {
            continue;
        };
        let value = doc.get(field.trim());
        let literal = literal.trim();
        if literal == "true" || literal == "false" {
            let expected = literal == "true";
            let actual = value.and_then(Value::as_bool);
            return match op {
                "=" => actual == Some(expected),
                "!=" => actual != Some(expected),
                _ => false,
            };
        }
        let (Some(actual), Ok(expected)) = (value.and_then(Value::as_f64), literal.parse::<f64>())
        else {
            return false;
        };
        return match op {
            ">=" => actual >= expected,
            "<=" => actual <= expected,
            "!=" => actual != expected,
            "<" => actual < expected,
            ">" => actual > expected,
            _ => actual == expected,
        };
    }
    false
}

/// Number of distinct query terms found in the chunk's text fields.
fn text_overlap(doc: &Map<String, Value>, query: Option<&str>) -> usize {
    let Some(query) = query else {
        return 0;
    };
    let haystack: String = [fields::CONTENT, fields::TITLE, fields::SEMANTIC_IDENTIFIER]
        .iter()
        .filter_map(|f| doc.get(*f).and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    let mut terms: Vec<String> = query
        .split_whitespace()
        .map(|t| {
            t.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|t| !t.is_empty())
        .collect();
    terms.sort();
    terms.dedup();
    terms.iter().filter(|t| haystack.contains(t.as_str())).count()
}

/// Split on `sep` outside of parentheses, braces, and quoted strings.
fn split_top_level<'a>(expr: &'a str, sep: &str) -> Vec<&'a str> {
    let bytes = expr.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_quote = false;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if in_quote {
            match b {
                b'\\' => i += 1,
                b'"' => in_quote = false,
                _ => {}
            }
        } else {
            match b {
                b'"' => in_quote = true,
                b'(' | b'{' => depth += 1,
                b')' | b'}' => depth -= 1,
                _ if depth == 0 && bytes[i..].starts_with(sep.as_bytes()) => {
                    parts.push(&expr[start..i]);
                    i += sep.len();
                    start = i;
                    continue;
                }
                _ => {}
            }
        }
        i += 1;
    }
    parts.push(&expr[start..]);
    parts
}

/// Inner text if `expr` is one parenthesized group.
fn unwrap_parens(expr: &str) -> Option<&str> {
    let inner = expr.strip_prefix('(')?.strip_suffix(')')?;
    let mut depth = 0i32;
    let mut in_quote = false;
    let mut escaped = false;
    for c in inner.chars() {
        if in_quote {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_quote = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_quote = true,
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return None;
                }
            }
            _ => {}
        }
    }
    Some(inner)
}

fn unquote(literal: &str) -> Option<String> {
    let inner = literal.strip_prefix('"')?.strip_suffix('"')?;
    serde_json::from_str(&format!("\"{}\"", inner)).ok()
}
