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

//! Raw event helpers shared by unit tests.

use crate::trace::TraceData;
use chrome_trace_format::{Phase, RawTrace, RawTraceEvent};
use serde_json::{json, Value};

pub const PID: u32 = 1;
pub const MAIN_TID: u32 = 1;

pub fn thread_name(tid: u32, name: &str) -> RawTraceEvent {
    RawTraceEvent::builder()
        .name("thread_name")
        .cat("__metadata")
        .ph(Phase::Metadata)
        .pid(PID)
        .tid(tid)
        .args(json!({ "name": name }))
        .build()
}

pub fn complete(name: &str, ts: f64, dur: f64) -> RawTraceEvent {
    complete_on(MAIN_TID, name, ts, dur)
}

pub fn complete_on(tid: u32, name: &str, ts: f64, dur: f64) -> RawTraceEvent {
    RawTraceEvent::builder()
        .name(name)
        .cat("devtools.timeline")
        .ph(Phase::Complete)
        .ts(ts)
        .dur(dur)
        .pid(PID)
        .tid(tid)
        .build()
}

pub fn with_data(mut event: RawTraceEvent, data: Value) -> RawTraceEvent {
    event.args = json!({ "data": data });
    event
}

pub fn instant(name: &str, cat: &str, ts: f64) -> RawTraceEvent {
    RawTraceEvent::builder()
        .name(name)
        .cat(cat)
        .ph(Phase::Instant)
        .ts(ts)
        .pid(PID)
        .tid(MAIN_TID)
        .build()
}

pub fn async_pair(name: &str, cat: &str, id: &str, start: f64, end: f64, data: Value) -> [RawTraceEvent; 2] {
    let id = chrome_trace_format::Id::String(id.to_string());
    let begin = RawTraceEvent::builder()
        .name(name)
        .cat(cat)
        .ph(Phase::AsyncBegin)
        .ts(start)
        .pid(PID)
        .tid(MAIN_TID)
        .id(id.clone())
        .args(json!({ "data": data }))
        .build();
    let end = RawTraceEvent::builder()
        .name(name)
        .cat(cat)
        .ph(Phase::AsyncEnd)
        .ts(end)
        .pid(PID)
        .tid(MAIN_TID)
        .id(id)
        .build();
    [begin, end]
}

pub fn interaction(id: &str, interaction_id: u64, start: f64, end: f64) -> [RawTraceEvent; 2] {
    async_pair(
        "EventTiming",
        "devtools.timeline",
        id,
        start,
        end,
        json!({ "interactionId": interaction_id, "type": "pointerdown" }),
    )
}

pub fn screenshot(ts: f64) -> RawTraceEvent {
    RawTraceEvent::builder()
        .name("Screenshot")
        .cat("disabled-by-default-devtools.screenshot")
        .ph(Phase::ObjectSnapshot)
        .ts(ts)
        .pid(PID)
        .tid(MAIN_TID)
        .id(chrome_trace_format::Id::String("0x1".to_string()))
        .build()
}

pub fn network_request(request_id: &str, url: &str, start: f64, end: f64) -> Vec<RawTraceEvent> {
    let event = |name: &str, ts: f64, data: Value| with_data(instant(name, "devtools.timeline", ts), data);
    vec![
        event(
            "ResourceSendRequest",
            start,
            json!({ "requestId": request_id, "url": url, "priority": "High" }),
        ),
        event(
            "ResourceReceiveResponse",
            start + (end - start) / 2.0,
            json!({ "requestId": request_id, "mimeType": "text/html", "statusCode": 200 }),
        ),
        event("ResourceFinish", end, json!({ "requestId": request_id })),
    ]
}

/// A main thread named like a renderer plus the given events.
pub fn trace_from(events: impl IntoIterator<Item = RawTraceEvent>) -> TraceData {
    let mut all = vec![thread_name(MAIN_TID, "CrRendererMain")];
    all.extend(events);
    TraceData::build(&RawTrace::from_events(all))
}
