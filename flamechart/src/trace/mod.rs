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

//! The event store.
//!
//! Every renderable thing in a trace lives in one arena and is referred to by
//! its [`EventId`]. Ids are assigned once, at build time, and never change for
//! the lifetime of a [`TraceData`]; caches elsewhere key on them instead of on
//! object identity.

mod builder;
pub mod categories;
mod frames;
mod initiators;
mod interactions;
mod layout_shifts;
mod network;
mod profile;

pub use categories::EventCategory;
pub use network::{parse_server_timing, url_origin, ResourceType, ServerTimingMetric};

use chrome_trace_format::Phase;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Microseconds on the trace clock.
pub type Micros = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u32);

impl EventId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadKey {
    pub pid: u32,
    pub tid: u32,
}

/// Where an event came from; the basis of its durable key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOrigin {
    /// The raw event at this index in the loaded file.
    Raw { raw_index: usize },
    /// Derived from the raw event at this index (B/E pairs, async pairs,
    /// network requests, layout shift clusters).
    Synthetic { raw_index: usize },
    /// A call reconstructed from CPU profile samples.
    ProfileCall { sample_index: usize, node_id: u32 },
    /// Derived without a one-to-one source event; has no durable key.
    Derived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    Navigation,
    FirstPaint,
    FirstContentfulPaint,
    LargestContentfulPaint,
    DomContentLoaded,
    Load,
    UserMark,
    TimeStamp,
}

impl MarkerKind {
    pub fn from_event_name(name: &str) -> Option<Self> {
        match name {
            "navigationStart" => Some(MarkerKind::Navigation),
            "firstPaint" => Some(MarkerKind::FirstPaint),
            "firstContentfulPaint" => Some(MarkerKind::FirstContentfulPaint),
            "largestContentfulPaint::Candidate" => Some(MarkerKind::LargestContentfulPaint),
            "MarkDOMContent" => Some(MarkerKind::DomContentLoaded),
            "MarkLoad" => Some(MarkerKind::Load),
            _ => None,
        }
    }

    /// Fixed short label for page-load markers.
    pub fn short_title(self) -> Option<&'static str> {
        match self {
            MarkerKind::Navigation => Some("Nav"),
            MarkerKind::FirstPaint => Some("FP"),
            MarkerKind::FirstContentfulPaint => Some("FCP"),
            MarkerKind::LargestContentfulPaint => Some("LCP"),
            MarkerKind::DomContentLoaded => Some("DCL"),
            MarkerKind::Load => Some("L"),
            MarkerKind::UserMark | MarkerKind::TimeStamp => None,
        }
    }

    pub fn is_page_load(self) -> bool {
        self.short_title().is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InteractionData {
    pub interaction_id: u64,
    pub interaction_type: String,
    pub processing_start: Micros,
    pub processing_end: Micros,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutShiftSource {
    pub node_id: Option<u64>,
    pub old_rect: Option<[f64; 4]>,
    pub new_rect: Option<[f64; 4]>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutShiftData {
    pub score: f64,
    pub had_recent_input: bool,
    pub sources: Vec<LayoutShiftSource>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutShiftClusterData {
    pub shifts: Vec<EventId>,
    pub cumulative_score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerTimingData {
    pub metric: String,
    pub description: Option<String>,
    pub origin: String,
    pub request: EventId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkRequestData {
    pub request_id: String,
    pub url: String,
    pub method: String,
    pub priority: String,
    pub mime_type: Option<String>,
    pub resource_type: ResourceType,
    pub status_code: Option<u32>,
    pub from_cache: bool,
    pub failed: bool,
    pub encoded_data_length: u64,
    pub queueing_start: Micros,
    pub send_start: Micros,
    pub headers_end: Micros,
    pub finish: Micros,
    pub end: Micros,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProfileCallData {
    pub function_name: String,
    pub url: String,
    pub line_number: i64,
    pub column_number: i64,
    pub node_id: u32,
    pub sample_index: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Generic,
    Marker(MarkerKind),
    Interaction(InteractionData),
    LayoutShift(LayoutShiftData),
    LayoutShiftCluster(LayoutShiftClusterData),
    ServerTiming(ServerTimingData),
    GpuTask,
    NetworkRequest(Box<NetworkRequestData>),
    ProfileCall(ProfileCallData),
    Screenshot,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraceEvent {
    pub id: EventId,
    pub name: String,
    pub cat: String,
    pub ph: Phase,
    pub ts: Micros,
    /// `None` for point-in-time events.
    pub dur: Option<Micros>,
    pub pid: u32,
    pub tid: u32,
    pub args: Value,
    pub origin: EventOrigin,
    pub kind: EventKind,
}

impl TraceEvent {
    pub fn end(&self) -> Micros {
        self.ts + self.dur.unwrap_or(0)
    }

    pub fn duration(&self) -> Micros {
        self.dur.unwrap_or(0)
    }

    pub fn is_instant(&self) -> bool {
        self.dur.is_none()
    }

    pub fn thread(&self) -> ThreadKey {
        ThreadKey {
            pid: self.pid,
            tid: self.tid,
        }
    }

    pub fn data(&self) -> Option<&Value> {
        self.args.get("data")
    }

    pub fn profile_call(&self) -> Option<&ProfileCallData> {
        match &self.kind {
            EventKind::ProfileCall(call) => Some(call),
            _ => None,
        }
    }

    pub fn network_request(&self) -> Option<&NetworkRequestData> {
        match &self.kind {
            EventKind::NetworkRequest(request) => Some(request),
            _ => None,
        }
    }

    /// What makes two calls "the same function" for aggregation and
    /// repeated-descendant detection.
    pub fn signature(&self) -> String {
        match &self.kind {
            EventKind::ProfileCall(call) => format!(
                "{}@{}:{}:{}",
                call.function_name, call.url, call.line_number, call.column_number
            ),
            _ => self.name.clone(),
        }
    }

    /// Name shown to users: the function for profile calls, otherwise the
    /// readable form of the event name.
    pub fn display_name(&self) -> String {
        match self.profile_call() {
            Some(call) if call.function_name.is_empty() => "(anonymous)".to_string(),
            Some(call) => call.function_name.clone(),
            None => categories::readable_name(&self.name)
                .map(str::to_string)
                .unwrap_or_else(|| self.name.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TraceBounds {
    pub min: Micros,
    pub max: Micros,
}

impl TraceBounds {
    pub fn range(&self) -> Micros {
        self.max.saturating_sub(self.min)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ThreadData {
    pub key: Option<ThreadKey>,
    pub name: Option<String>,
    pub process_name: Option<String>,
    pub is_main: bool,
    /// Trace events and profile calls, sorted by start time with ancestors
    /// before descendants.
    pub entries: Vec<EventId>,
    pub profile_calls: Vec<EventId>,
}

impl ThreadData {
    pub fn key(&self) -> ThreadKey {
        self.key.unwrap_or(ThreadKey { pid: 0, tid: 0 })
    }
}

#[derive(Debug, Clone, Default)]
pub struct Timings {
    pub page_load_markers: Vec<EventId>,
    pub user_marks: Vec<EventId>,
    pub user_measures: Vec<EventId>,
}

impl Timings {
    pub fn is_empty(&self) -> bool {
        self.page_load_markers.is_empty() && self.user_marks.is_empty() && self.user_measures.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Interactions {
    pub all: Vec<EventId>,
    /// The longest interaction of every nested group, in start order.
    pub no_nesting: Vec<EventId>,
    pub longest: Option<EventId>,
}

#[derive(Debug, Clone, Default)]
pub struct LayoutShifts {
    pub shifts: Vec<EventId>,
    pub clusters: Vec<EventId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Presented,
    Partial,
    Dropped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimelineFrame {
    pub index: usize,
    pub start: Micros,
    pub end: Micros,
    pub state: FrameState,
}

impl TimelineFrame {
    pub fn duration(&self) -> Micros {
        self.end.saturating_sub(self.start)
    }
}

#[derive(Debug, Default)]
pub struct TraceData {
    events: Vec<TraceEvent>,
    raw_events: HashMap<usize, EventId>,
    synthetic_events: HashMap<usize, EventId>,
    initiator_of: HashMap<EventId, EventId>,
    initiated_by: HashMap<EventId, Vec<EventId>>,
    pub bounds: TraceBounds,
    pub threads: Vec<ThreadData>,
    pub timings: Timings,
    pub interactions: Interactions,
    pub layout_shifts: LayoutShifts,
    pub gpu_tasks: Vec<EventId>,
    pub server_timings: Vec<EventId>,
    pub network_requests: Vec<EventId>,
    pub screenshots: Vec<EventId>,
    pub frames: Vec<TimelineFrame>,
}

impl TraceData {
    /// # Panics
    /// If `id` did not come from this trace.
    pub fn event(&self, id: EventId) -> &TraceEvent {
        &self.events[id.index()]
    }

    pub fn get(&self, id: EventId) -> Option<&TraceEvent> {
        self.events.get(id.index())
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn event_for_raw_index(&self, raw_index: usize) -> Option<EventId> {
        self.raw_events.get(&raw_index).copied()
    }

    pub fn synthetic_for_raw_index(&self, raw_index: usize) -> Option<EventId> {
        self.synthetic_events.get(&raw_index).copied()
    }

    pub fn initiator_of(&self, id: EventId) -> Option<EventId> {
        self.initiator_of.get(&id).copied()
    }

    pub fn initiated_by(&self, id: EventId) -> &[EventId] {
        self.initiated_by.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn thread(&self, key: ThreadKey) -> Option<&ThreadData> {
        self.threads.iter().find(|thread| thread.key == Some(key))
    }

    /// Milliseconds since the start of the trace.
    pub fn to_ms(&self, ts: Micros) -> f64 {
        crate::time::micros_to_ms(ts.saturating_sub(self.bounds.min))
    }

    pub fn duration_ms(&self, event: &TraceEvent) -> f64 {
        crate::time::micros_to_ms(event.duration())
    }
}
