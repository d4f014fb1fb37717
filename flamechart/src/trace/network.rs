// Copyright (C) 2025 Category Labs, Inc.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use super::{Micros, NetworkRequestData};
use chrome_trace_format::RawTraceEvent;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Document,
    Stylesheet,
    Script,
    Image,
    Font,
    Media,
    Fetch,
    Xhr,
    WebSocket,
    Manifest,
    Other,
}

impl ResourceType {
    pub fn parse(resource_type: Option<&str>, mime_type: Option<&str>) -> Self {
        match resource_type {
            Some("Document") => return ResourceType::Document,
            Some("Stylesheet") => return ResourceType::Stylesheet,
            Some("Script") => return ResourceType::Script,
            Some("Image") => return ResourceType::Image,
            Some("Font") => return ResourceType::Font,
            Some("Media") => return ResourceType::Media,
            Some("Fetch") => return ResourceType::Fetch,
            Some("XHR") => return ResourceType::Xhr,
            Some("WebSocket") => return ResourceType::WebSocket,
            Some("Manifest") => return ResourceType::Manifest,
            _ => {}
        }
        let Some(mime) = mime_type else {
            return ResourceType::Other;
        };
        if mime.starts_with("text/html") {
            ResourceType::Document
        } else if mime.starts_with("text/css") {
            ResourceType::Stylesheet
        } else if mime.contains("javascript") || mime.contains("ecmascript") {
            ResourceType::Script
        } else if mime.starts_with("image/") {
            ResourceType::Image
        } else if mime.starts_with("font/") || mime.contains("font-woff") {
            ResourceType::Font
        } else if mime.starts_with("audio/") || mime.starts_with("video/") {
            ResourceType::Media
        } else if mime.contains("json") {
            ResourceType::Fetch
        } else {
            ResourceType::Other
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            ResourceType::Document => "Document",
            ResourceType::Stylesheet => "Stylesheet",
            ResourceType::Script => "Script",
            ResourceType::Image => "Image",
            ResourceType::Font => "Font",
            ResourceType::Media => "Media",
            ResourceType::Fetch => "Fetch",
            ResourceType::Xhr => "XHR",
            ResourceType::WebSocket => "WebSocket",
            ResourceType::Manifest => "Manifest",
            ResourceType::Other => "Other",
        }
    }
}

pub(super) fn is_network_event(name: &str) -> bool {
    matches!(
        name,
        "ResourceWillSendRequest"
            | "ResourceSendRequest"
            | "ResourceReceiveResponse"
            | "ResourceReceivedData"
            | "ResourceFinish"
            | "ResourceChangePriority"
    )
}

fn request_id(raw: &RawTraceEvent) -> Option<String> {
    match raw.data()?.get("requestId")? {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

fn data_str(raw: &RawTraceEvent, key: &str) -> Option<String> {
    raw.data()?.get(key)?.as_str().map(str::to_string)
}

fn seconds_to_micros(seconds: f64) -> Micros {
    (seconds * 1_000_000.0).max(0.0).round() as Micros
}

pub(super) fn raw_ts(ts: f64) -> Micros {
    ts.max(0.0).round() as Micros
}

#[derive(Debug, Default)]
struct PendingRequest {
    raw_index: Option<usize>,
    pid: u32,
    tid: u32,
    url: String,
    method: String,
    priority: String,
    resource_type: Option<String>,
    mime_type: Option<String>,
    status_code: Option<u32>,
    from_cache: bool,
    failed: bool,
    encoded_data_length: u64,
    will_send: Option<Micros>,
    send: Option<Micros>,
    send_from_timing: Option<Micros>,
    response: Option<Micros>,
    headers_end_from_timing: Option<Micros>,
    last_data: Option<Micros>,
    finish: Option<Micros>,
    server_timing: Option<String>,
}

/// A request assembled from its `Resource*` events.
#[derive(Debug)]
pub(super) struct CollectedRequest {
    pub raw_index: usize,
    pub pid: u32,
    pub tid: u32,
    pub data: NetworkRequestData,
    pub server_timing: Option<String>,
}

#[derive(Debug, Default)]
pub(super) struct RequestCollector {
    pending: HashMap<String, PendingRequest>,
    order: Vec<String>,
}

impl RequestCollector {
    pub(super) fn observe(&mut self, raw_index: usize, raw: &RawTraceEvent) {
        let Some(id) = request_id(raw) else {
            return;
        };
        let ts = raw_ts(raw.ts);
        if !self.pending.contains_key(&id) {
            self.order.push(id.clone());
        }
        let request = self.pending.entry(id).or_default();
        let data = raw.data();
        match raw.name.as_str() {
            "ResourceWillSendRequest" => {
                request.will_send.get_or_insert(ts);
            }
            "ResourceSendRequest" => {
                if request.raw_index.is_none() {
                    request.raw_index = Some(raw_index);
                    request.pid = raw.pid;
                    request.tid = raw.tid;
                    request.send = Some(ts);
                }
                request.url = data_str(raw, "url").unwrap_or_default();
                request.method = data_str(raw, "requestMethod").unwrap_or_else(|| "GET".into());
                if let Some(priority) = data_str(raw, "priority") {
                    request.priority = priority;
                }
                if let Some(resource_type) = data_str(raw, "resourceType") {
                    request.resource_type = Some(resource_type);
                }
            }
            "ResourceChangePriority" => {
                if let Some(priority) = data_str(raw, "priority") {
                    request.priority = priority;
                }
            }
            "ResourceReceiveResponse" => {
                request.response = Some(ts);
                request.mime_type = data_str(raw, "mimeType");
                request.status_code = data
                    .and_then(|data| data.get("statusCode"))
                    .and_then(Value::as_u64)
                    .map(|code| code as u32);
                request.from_cache = data
                    .and_then(|data| data.get("fromCache"))
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                if let Some(timing) = data.and_then(|data| data.get("timing")) {
                    let request_time = timing.get("requestTime").and_then(Value::as_f64);
                    if let Some(request_time) = request_time.filter(|time| *time > 0.0) {
                        let base = request_time * 1_000.0;
                        let offset = |key: &str| {
                            timing
                                .get(key)
                                .and_then(Value::as_f64)
                                .filter(|value| *value >= 0.0)
                                .map(|value| seconds_to_micros((base + value) / 1_000.0))
                        };
                        request.send_from_timing = offset("sendStart");
                        request.headers_end_from_timing = offset("receiveHeadersEnd");
                    }
                }
                request.server_timing = data
                    .and_then(|data| data.get("headers"))
                    .and_then(Value::as_array)
                    .and_then(|headers| {
                        headers.iter().find_map(|header| {
                            let name = header.get("name")?.as_str()?;
                            if name.eq_ignore_ascii_case("server-timing") {
                                header.get("value")?.as_str().map(str::to_string)
                            } else {
                                None
                            }
                        })
                    });
            }
            "ResourceReceivedData" => {
                request.last_data = Some(request.last_data.map_or(ts, |last| last.max(ts)));
            }
            "ResourceFinish" => {
                let finish_time = data
                    .and_then(|data| data.get("finishTime"))
                    .and_then(Value::as_f64)
                    .filter(|time| *time > 0.0)
                    .map(seconds_to_micros);
                request.finish = Some(finish_time.unwrap_or(ts));
                request.failed = data
                    .and_then(|data| data.get("didFail"))
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                if let Some(length) = data
                    .and_then(|data| data.get("encodedDataLength"))
                    .and_then(Value::as_f64)
                {
                    request.encoded_data_length = length.max(0.0) as u64;
                }
            }
            _ => {}
        }
    }

    /// Requests in first-seen order; those never sent are dropped.
    pub(super) fn finish(mut self) -> Vec<CollectedRequest> {
        let mut requests = Vec::with_capacity(self.order.len());
        for id in self.order {
            let Some(pending) = self.pending.remove(&id) else {
                continue;
            };
            let (Some(raw_index), Some(send)) = (pending.raw_index, pending.send) else {
                tracing::debug!(request_id = %id, "dropping request without ResourceSendRequest");
                continue;
            };

            let queueing_start = pending.will_send.map_or(send, |will_send| will_send.min(send));
            let send_start = pending.send_from_timing.unwrap_or(send).max(queueing_start);
            let headers_end = pending
                .headers_end_from_timing
                .or(pending.response)
                .unwrap_or(send_start)
                .max(send_start);
            let finish = pending
                .finish
                .or(pending.last_data)
                .unwrap_or(headers_end)
                .max(headers_end);
            let end = pending.last_data.map_or(finish, |last| last.max(finish));

            let resource_type = ResourceType::parse(
                pending.resource_type.as_deref(),
                pending.mime_type.as_deref(),
            );
            requests.push(CollectedRequest {
                raw_index,
                pid: pending.pid,
                tid: pending.tid,
                data: NetworkRequestData {
                    request_id: id,
                    url: pending.url,
                    method: pending.method,
                    priority: pending.priority,
                    mime_type: pending.mime_type,
                    resource_type,
                    status_code: pending.status_code,
                    from_cache: pending.from_cache,
                    failed: pending.failed,
                    encoded_data_length: pending.encoded_data_length,
                    queueing_start,
                    send_start,
                    headers_end,
                    finish,
                    end,
                },
                server_timing: pending.server_timing,
            });
        }
        requests
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerTimingMetric {
    pub name: String,
    pub duration_ms: Option<f64>,
    pub description: Option<String>,
}

/// Parses a `Server-Timing` header value: `name;dur=12.5;desc="db", other`.
pub fn parse_server_timing(header: &str) -> Vec<ServerTimingMetric> {
    split_unquoted(header, ',')
        .into_iter()
        .filter_map(|entry| {
            let mut parts = split_unquoted(entry, ';').into_iter();
            let name = parts.next()?.trim();
            if name.is_empty() {
                return None;
            }
            let mut metric = ServerTimingMetric {
                name: name.to_string(),
                duration_ms: None,
                description: None,
            };
            for param in parts {
                let Some((key, value)) = param.split_once('=') else {
                    continue;
                };
                let value = value.trim().trim_matches('"');
                match key.trim().to_ascii_lowercase().as_str() {
                    "dur" => metric.duration_ms = value.parse().ok(),
                    "desc" => metric.description = Some(value.to_string()),
                    _ => {}
                }
            }
            Some(metric)
        })
        .collect()
}

fn split_unquoted(input: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (index, ch) in input.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            c if c == separator && !in_quotes => {
                parts.push(&input[start..index]);
                start = index + ch.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

/// `scheme://host[:port]` of a URL, or the URL itself when it has no authority.
pub fn url_origin(url: &str) -> &str {
    let Some(scheme_end) = url.find("://") else {
        return url;
    };
    let authority_start = scheme_end + 3;
    match url[authority_start..].find('/') {
        Some(path_start) => &url[..authority_start + path_start],
        None => url,
    }
}
