//! Tool vocabulary translation for the ChatGPT client profile.
//!
//! ChatGPT connectors only call two tools, `search` and `fetch`. The origin
//! exposes its own memory tools instead, so calls are rewritten on the way in
//! and the single text result is reshaped on the way out.

use serde_json::{json, Map, Value};

use crate::profile::ClientProfile;
use crate::protocol::{JsonRpcRequest, JsonRpcResponse};

pub const SEARCH_TOOL: &str = "search";
pub const FETCH_TOOL: &str = "fetch";
pub const ORIGIN_ASK_TOOL: &str = "ask_memory";
pub const ORIGIN_SEARCH_TOOL: &str = "search_memory";

const INVALID_PARAMS: i64 = -32602;
const MAX_SEARCH_RESULTS: usize = 10;
const TITLE_CHARS: usize = 100;

/// Result reshaping owed to a rewritten call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolShape {
    Search,
    Fetch { id: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Translation {
    /// Answered locally; the origin is never contacted.
    Answer(JsonRpcResponse),
    /// Send to the origin, then apply `reshape` to its response if present.
    Forward {
        request: JsonRpcRequest,
        reshape: Option<ToolShape>,
    },
}

pub fn translate_request(profile: &ClientProfile, request: JsonRpcRequest) -> Translation {
    if !profile.translates_tools() {
        return Translation::Forward {
            request,
            reshape: None,
        };
    }

    match request.method.as_str() {
        "tools/list" => {
            let id = request.id.unwrap_or(Value::Null);
            Translation::Answer(JsonRpcResponse::success(id, tools_list_result()))
        }
        "tools/call" => translate_tools_call(request),
        _ => Translation::Forward {
            request,
            reshape: None,
        },
    }
}

fn translate_tools_call(mut request: JsonRpcRequest) -> Translation {
    let name = request
        .params
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let arguments = request
        .params
        .get("arguments")
        .cloned()
        .unwrap_or(Value::Null);

    let (params, reshape) = match name.as_str() {
        SEARCH_TOOL => {
            let Some(query) = argument_text(&arguments, "query") else {
                return missing_argument(request, "query");
            };
            (
                json!({"name": ORIGIN_ASK_TOOL, "arguments": {"question": query}}),
                ToolShape::Search,
            )
        }
        FETCH_TOOL => {
            let Some(id) = argument_text(&arguments, "id") else {
                return missing_argument(request, "id");
            };
            (
                json!({"name": ORIGIN_SEARCH_TOOL, "arguments": {"query": id, "limit": 1}}),
                ToolShape::Fetch { id },
            )
        }
        _ => {
            return Translation::Forward {
                request,
                reshape: None,
            }
        }
    };

    request.params = params;
    Translation::Forward {
        request,
        reshape: Some(reshape),
    }
}

fn argument_text(arguments: &Value, key: &str) -> Option<String> {
    match arguments.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn missing_argument(request: JsonRpcRequest, key: &str) -> Translation {
    Translation::Answer(JsonRpcResponse::error(
        request.id.unwrap_or(Value::Null),
        INVALID_PARAMS,
        format!("missing required argument: {key}"),
    ))
}

pub fn tools_list_result() -> Value {
    json!({
        "tools": [
            {
                "name": SEARCH_TOOL,
                "description": "Search stored memories and return matching documents.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "description": "Natural language search query."}
                    },
                    "required": ["query"]
                }
            },
            {
                "name": FETCH_TOOL,
                "description": "Fetch one stored memory by id.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "id": {"type": "string", "description": "Memory id returned by search."}
                    },
                    "required": ["id"]
                }
            }
        ]
    })
}

/// Reshapes an origin response into the shape the client asked for.
///
/// Error responses and results without text content are returned untouched.
pub fn reshape_result(shape: &ToolShape, response: JsonRpcResponse) -> JsonRpcResponse {
    if response.is_error() {
        return response;
    }
    let Some(raw) = response.result.as_ref().and_then(first_text_content) else {
        return response;
    };

    let payload = match shape {
        ToolShape::Search => {
            let results = match parse_items(&raw) {
                Some(items) => items
                    .iter()
                    .take(MAX_SEARCH_RESULTS)
                    .enumerate()
                    .map(|(idx, item)| search_entry(idx, item))
                    .collect::<Vec<_>>(),
                None => vec![json!({
                    "id": "memory-result",
                    "title": title_of(&raw),
                    "text": raw,
                    "link": Value::Null
                })],
            };
            json!({"results": results})
        }
        ToolShape::Fetch { id } => {
            match parse_items(&raw).as_ref().and_then(|items| items.first()) {
                Some(item) => fetch_document(id, item),
                None => json!({
                    "id": id,
                    "title": title_of(&raw),
                    "text": raw,
                    "link": Value::Null,
                    "metadata": Value::Null
                }),
            }
        }
    };

    JsonRpcResponse {
        result: Some(json!({
            "content": [{"type": "text", "text": payload.to_string()}]
        })),
        ..response
    }
}

fn first_text_content(result: &Value) -> Option<String> {
    result
        .get("content")?
        .as_array()?
        .iter()
        .find(|item| item.get("type").and_then(Value::as_str) == Some("text"))?
        .get("text")?
        .as_str()
        .map(ToString::to_string)
}

fn parse_items(raw: &str) -> Option<Vec<Value>> {
    match serde_json::from_str::<Value>(raw).ok()? {
        Value::Array(items) => Some(items),
        Value::Object(mut map) => match map
            .remove("results")
            .or_else(|| map.remove("memories"))?
        {
            Value::Array(items) => Some(items),
            _ => None,
        },
        _ => None,
    }
}

fn item_id(idx: usize, item: &Value) -> String {
    match item.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => format!("memory-{idx}"),
    }
}

fn item_text(item: &Value) -> String {
    if let Value::String(s) = item {
        return s.clone();
    }
    ["memory", "content", "text"]
        .iter()
        .find_map(|key| item.get(*key).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string()
}

fn title_of(text: &str) -> String {
    let head = text.chars().take(TITLE_CHARS).collect::<String>();
    format!("{head}...")
}

fn search_entry(idx: usize, item: &Value) -> Value {
    let text = item_text(item);
    json!({
        "id": item_id(idx, item),
        "title": title_of(&text),
        "text": text,
        "link": Value::Null
    })
}

fn fetch_document(requested_id: &str, item: &Value) -> Value {
    let text = item_text(item);
    let id = match item.get("id") {
        Some(_) => item_id(0, item),
        None => requested_id.to_string(),
    };
    let metadata = item
        .get("metadata")
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()));
    json!({
        "id": id,
        "title": title_of(&text),
        "text": text,
        "link": Value::Null,
        "metadata": metadata
    })
}
