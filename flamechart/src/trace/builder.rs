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

//! Construction of [`TraceData`] from a loaded [`RawTrace`].

use super::frames::{build_frames, FrameSignal};
use super::initiators::link_initiators;
use super::interactions::{self, Span};
use super::layout_shifts::cluster_shifts;
use super::network::{is_network_event, parse_server_timing, raw_ts, url_origin, RequestCollector};
use super::profile::{expand_profile, ProfileCollector};
use super::{
    EventId, EventKind, EventOrigin, InteractionData, LayoutShiftClusterData, LayoutShiftData,
    LayoutShiftSource, MarkerKind, Micros, ProfileCallData, ServerTimingData, ThreadData,
    ThreadKey, TraceBounds, TraceData, TraceEvent,
};
use chrome_trace_format::{CpuProfile, Phase, RawTrace, RawTraceEvent};
use serde_json::{json, Value};
use std::cmp::Reverse;
use std::collections::HashMap;

const USER_TIMING_CATEGORY: &str = "blink.user_timing";
const PROFILE_CALL_CATEGORY: &str = "disabled-by-default-v8.cpu_profiler";
const CPU_PROFILE_THREAD: ThreadKey = ThreadKey { pid: 1, tid: 1 };

impl TraceData {
    pub fn build(raw: &RawTrace) -> Self {
        let data = TraceBuilder::new(raw).build();
        tracing::debug!(
            events = data.events.len(),
            threads = data.threads.len(),
            network_requests = data.network_requests.len(),
            frames = data.frames.len(),
            "built trace data"
        );
        data
    }
}

struct TraceBuilder<'a> {
    raw: &'a RawTrace,
    data: TraceData,
    raw_end: Micros,
    thread_names: HashMap<ThreadKey, String>,
    process_names: HashMap<u32, String>,
    thread_events: HashMap<ThreadKey, Vec<EventId>>,
    profile_calls: HashMap<ThreadKey, Vec<EventId>>,
    open_durations: HashMap<ThreadKey, Vec<usize>>,
    open_async: HashMap<(String, String, String), Vec<usize>>,
    frame_signals: Vec<(Micros, FrameSignal)>,
    requests: RequestCollector,
    profiles: ProfileCollector,
}

fn ms_on_trace_clock(ms: f64) -> Micros {
    raw_ts(ms * 1_000.0)
}

fn merge_args(begin: &Value, end: &Value) -> Value {
    match (begin, end) {
        (Value::Object(begin), Value::Object(end)) => {
            let mut merged = begin.clone();
            for (key, value) in end {
                merged.entry(key.clone()).or_insert_with(|| value.clone());
            }
            Value::Object(merged)
        }
        (Value::Null, end) => end.clone(),
        (begin, _) => begin.clone(),
    }
}

impl<'a> TraceBuilder<'a> {
    fn new(raw: &'a RawTrace) -> Self {
        Self {
            raw,
            data: TraceData::default(),
            raw_end: 0,
            thread_names: HashMap::new(),
            process_names: HashMap::new(),
            thread_events: HashMap::new(),
            profile_calls: HashMap::new(),
            open_durations: HashMap::new(),
            open_async: HashMap::new(),
            frame_signals: Vec::new(),
            requests: RequestCollector::default(),
            profiles: ProfileCollector::default(),
        }
    }

    fn build(mut self) -> TraceData {
        self.read_metadata();
        self.read_events();
        self.close_unmatched();
        self.expand_profiles();
        self.add_network_requests();
        self.cluster_layout_shifts();
        self.compute_bounds();
        self.collect_frames();
        self.collect_interactions();
        self.collect_threads();
        self.collect_initiators();
        self.sort_tracks();
        self.data
    }

    fn read_metadata(&mut self) {
        for raw in &self.raw.events {
            if raw.ph != Phase::Metadata {
                self.raw_end = self.raw_end.max(raw_ts(raw.ts + raw.dur.unwrap_or(0.0)));
                continue;
            }
            let Some(name) = raw.args.get("name").and_then(Value::as_str) else {
                continue;
            };
            match raw.name.as_str() {
                "process_name" => {
                    self.process_names.insert(raw.pid, name.to_string());
                }
                "thread_name" => {
                    self.thread_names.insert(
                        ThreadKey {
                            pid: raw.pid,
                            tid: raw.tid,
                        },
                        name.to_string(),
                    );
                }
                _ => {}
            }
        }
        if let Some(profile) = &self.raw.cpu_profile {
            self.raw_end = self.raw_end.max(raw_ts(profile.end_time));
        }
    }

    fn read_events(&mut self) {
        let raw = self.raw;
        for (raw_index, event) in raw.events.iter().enumerate() {
            if event.ph == Phase::Metadata {
                continue;
            }
            if ProfileCollector::is_profile_event(event) {
                self.profiles.observe(event);
                continue;
            }
            if is_network_event(&event.name) {
                self.requests.observe(raw_index, event);
                continue;
            }
            if let Some(signal) = FrameSignal::from_raw(event) {
                self.frame_signals.push((raw_ts(event.ts), signal));
                continue;
            }

            match event.ph {
                Phase::Complete => {
                    // Round the end rather than the duration so containment survives.
                    let start = raw_ts(event.ts);
                    let end = raw_ts(event.ts + event.dur.unwrap_or(0.0)).max(start);
                    let id = self.push(event, EventOrigin::Raw { raw_index }, start, Some(end - start));
                    self.route(id, false);
                }
                Phase::DurationBegin => {
                    self.open_durations
                        .entry(ThreadKey {
                            pid: event.pid,
                            tid: event.tid,
                        })
                        .or_default()
                        .push(raw_index);
                }
                Phase::DurationEnd => {
                    let thread = ThreadKey {
                        pid: event.pid,
                        tid: event.tid,
                    };
                    let begin = self.open_durations.get_mut(&thread).and_then(Vec::pop);
                    match begin {
                        Some(begin) => self.push_pair(begin, raw_ts(event.ts), &event.args, false),
                        None => tracing::debug!(raw_index, name = %event.name, "unmatched end event"),
                    }
                }
                ph if ph.is_async_begin() => {
                    if let Some(id) = event.async_id() {
                        self.open_async
                            .entry((event.cat.clone(), id, event.name.clone()))
                            .or_default()
                            .push(raw_index);
                    }
                }
                ph if ph.is_async_end() => {
                    let Some(id) = event.async_id() else {
                        continue;
                    };
                    let key = (event.cat.clone(), id, event.name.clone());
                    if let Some(begin) = self.open_async.get_mut(&key).and_then(Vec::pop) {
                        self.push_pair(begin, raw_ts(event.ts), &event.args, true);
                    }
                }
                Phase::ObjectSnapshot if event.name == "Screenshot" => {
                    let id = self.push(event, EventOrigin::Raw { raw_index }, raw_ts(event.ts), None);
                    self.route(id, false);
                }
                ph if ph.is_instant() => {
                    let id = self.push(event, EventOrigin::Raw { raw_index }, raw_ts(event.ts), None);
                    self.route(id, false);
                }
                _ => {}
            }
        }
    }

    /// Durations still open at the end of the trace last until its end;
    /// unterminated async spans are dropped.
    fn close_unmatched(&mut self) {
        let mut open: Vec<usize> = self.open_durations.drain().flat_map(|(_, stack)| stack).collect();
        open.sort_unstable();
        for begin in open {
            self.push_pair(begin, self.raw_end, &Value::Null, false);
        }
        let dropped: usize = self.open_async.values().map(Vec::len).sum();
        if dropped > 0 {
            tracing::debug!(dropped, "dropping async events without an end");
        }
        self.open_async.clear();
    }

    fn push(&mut self, raw: &RawTraceEvent, origin: EventOrigin, ts: Micros, dur: Option<Micros>) -> EventId {
        let id = EventId(self.data.events.len() as u32);
        match origin {
            EventOrigin::Raw { raw_index } => {
                self.data.raw_events.insert(raw_index, id);
            }
            EventOrigin::Synthetic { raw_index } => {
                self.data.synthetic_events.insert(raw_index, id);
            }
            EventOrigin::ProfileCall { .. } | EventOrigin::Derived => {}
        }
        self.data.events.push(TraceEvent {
            id,
            name: raw.name.clone(),
            cat: raw.cat.clone(),
            ph: raw.ph,
            ts,
            dur,
            pid: raw.pid,
            tid: raw.tid,
            args: raw.args.clone(),
            origin,
            kind: EventKind::Generic,
        });
        id
    }

    fn push_pair(&mut self, begin_index: usize, end_ts: Micros, end_args: &Value, is_async: bool) {
        let raw = self.raw;
        let begin = &raw.events[begin_index];
        let ts = raw_ts(begin.ts);
        let dur = end_ts.saturating_sub(ts);
        let id = self.push(begin, EventOrigin::Synthetic { raw_index: begin_index }, ts, Some(dur));
        let event = &mut self.data.events[id.index()];
        event.args = merge_args(&begin.args, end_args);
        self.route(id, is_async);
    }

    /// Decides which track an event belongs to and decodes its payload.
    fn route(&mut self, id: EventId, is_async: bool) {
        let event = &self.data.events[id.index()];
        let name = event.name.clone();
        let is_user_timing = event
            .cat
            .split(',')
            .any(|cat| cat.trim() == USER_TIMING_CATEGORY);

        if let Some(marker) = MarkerKind::from_event_name(&name) {
            self.set_kind(id, EventKind::Marker(marker), true);
            self.data.timings.page_load_markers.push(id);
            return;
        }
        match name.as_str() {
            "EventTiming" => {
                if let Some(interaction) = self.interaction_data(id) {
                    self.set_kind(id, EventKind::Interaction(interaction), false);
                    self.data.interactions.all.push(id);
                }
                return;
            }
            "LayoutShift" => {
                let shift = layout_shift_data(self.data.events[id.index()].data());
                let had_recent_input = shift.had_recent_input;
                self.set_kind(id, EventKind::LayoutShift(shift), true);
                if !had_recent_input {
                    self.data.layout_shifts.shifts.push(id);
                }
                return;
            }
            "GPUTask" => {
                self.set_kind(id, EventKind::GpuTask, false);
                self.data.gpu_tasks.push(id);
                return;
            }
            "Screenshot" => {
                self.set_kind(id, EventKind::Screenshot, true);
                self.data.screenshots.push(id);
                return;
            }
            _ => {}
        }
        if is_user_timing {
            if is_async || !self.data.events[id.index()].is_instant() {
                self.data.timings.user_measures.push(id);
            } else {
                self.set_kind(id, EventKind::Marker(MarkerKind::UserMark), true);
                self.data.timings.user_marks.push(id);
            }
            return;
        }
        if name == "TimeStamp" {
            self.set_kind(id, EventKind::Marker(MarkerKind::TimeStamp), true);
            self.data.timings.user_marks.push(id);
            return;
        }

        let thread = self.data.events[id.index()].thread();
        self.thread_events.entry(thread).or_default().push(id);
    }

    fn set_kind(&mut self, id: EventId, kind: EventKind, instant: bool) {
        let event = &mut self.data.events[id.index()];
        event.kind = kind;
        if instant {
            event.dur = None;
        }
    }

    fn interaction_data(&self, id: EventId) -> Option<InteractionData> {
        let event = &self.data.events[id.index()];
        let data = event.data()?;
        let interaction_id = data.get("interactionId").and_then(Value::as_u64)?;
        if interaction_id == 0 || event.is_instant() {
            return None;
        }
        let interaction_type = data
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        // Processing times share the clock of `timeStamp` (ms); rebase them
        // onto the trace clock through the event start.
        let time_stamp = data.get("timeStamp").and_then(Value::as_f64);
        let to_trace = |ms: f64| match time_stamp {
            Some(base) => {
                let offset = (ms - base) * 1_000.0;
                raw_ts(event.ts as f64 + offset)
            }
            None => ms_on_trace_clock(ms),
        };
        let clamp = |ts: Micros| ts.clamp(event.ts, event.end());
        let processing_start = data
            .get("processingStart")
            .and_then(Value::as_f64)
            .map_or(event.ts, |ms| clamp(to_trace(ms)));
        let processing_end = data
            .get("processingEnd")
            .and_then(Value::as_f64)
            .map_or(event.end(), |ms| clamp(to_trace(ms)))
            .max(processing_start);
        Some(InteractionData {
            interaction_id,
            interaction_type,
            processing_start,
            processing_end,
        })
    }

    fn expand_profiles(&mut self) {
        let mut profiles = std::mem::take(&mut self.profiles).finish();
        if let Some(profile) = &self.raw.cpu_profile {
            self.thread_names
                .entry(CPU_PROFILE_THREAD)
                .or_insert_with(|| "Main".to_string());
            profiles.push((CPU_PROFILE_THREAD, profile.clone()));
        }
        for (thread, profile) in profiles {
            self.push_profile_calls(thread, &profile);
        }
    }

    fn push_profile_calls(&mut self, thread: ThreadKey, profile: &CpuProfile) {
        let frames: HashMap<u32, _> = profile
            .nodes
            .iter()
            .map(|node| (node.id, &node.call_frame))
            .collect();
        for span in expand_profile(profile) {
            let Some(frame) = frames.get(&span.node_id) else {
                continue;
            };
            let id = EventId(self.data.events.len() as u32);
            self.data.events.push(TraceEvent {
                id,
                name: "ProfileCall".to_string(),
                cat: PROFILE_CALL_CATEGORY.to_string(),
                ph: Phase::Complete,
                ts: span.start,
                dur: Some(span.end - span.start),
                pid: thread.pid,
                tid: thread.tid,
                args: Value::Null,
                origin: EventOrigin::ProfileCall {
                    sample_index: span.sample_index,
                    node_id: span.node_id,
                },
                kind: EventKind::ProfileCall(ProfileCallData {
                    function_name: frame.function_name.clone(),
                    url: frame.url.clone(),
                    line_number: frame.line_number,
                    column_number: frame.column_number,
                    node_id: span.node_id,
                    sample_index: span.sample_index,
                }),
            });
            self.thread_events.entry(thread).or_default().push(id);
            self.profile_calls.entry(thread).or_default().push(id);
        }
    }

    fn add_network_requests(&mut self) {
        let raw = self.raw;
        for request in std::mem::take(&mut self.requests).finish() {
            let send = &raw.events[request.raw_index];
            let ts = request.data.queueing_start;
            let dur = request.data.end - ts;
            let origin = EventOrigin::Synthetic {
                raw_index: request.raw_index,
            };
            let id = self.push(send, origin, ts, Some(dur));
            let (send_start, headers_end) = (request.data.send_start, request.data.headers_end);
            let request_origin = url_origin(&request.data.url).to_string();
            {
                let event = &mut self.data.events[id.index()];
                event.name = "SyntheticNetworkRequest".to_string();
                event.ph = Phase::Complete;
                event.pid = request.pid;
                event.tid = request.tid;
                event.kind = EventKind::NetworkRequest(Box::new(request.data));
            }
            self.data.network_requests.push(id);

            let Some(header) = request.server_timing else {
                continue;
            };
            for metric in parse_server_timing(&header) {
                let Some(duration_ms) = metric.duration_ms else {
                    continue;
                };
                let dur = ms_on_trace_clock(duration_ms);
                let start = headers_end.saturating_sub(dur).max(send_start);
                let timing_id = EventId(self.data.events.len() as u32);
                self.data.events.push(TraceEvent {
                    id: timing_id,
                    name: metric.name.clone(),
                    cat: "devtools.server-timing".to_string(),
                    ph: Phase::Complete,
                    ts: start,
                    dur: Some(dur),
                    pid: request.pid,
                    tid: request.tid,
                    args: json!({ "data": { "desc": metric.description } }),
                    origin: EventOrigin::Derived,
                    kind: EventKind::ServerTiming(ServerTimingData {
                        metric: metric.name,
                        description: metric.description,
                        origin: request_origin.clone(),
                        request: id,
                    }),
                });
                self.data.server_timings.push(timing_id);
            }
        }
    }

    fn cluster_layout_shifts(&mut self) {
        let mut shifts = std::mem::take(&mut self.data.layout_shifts.shifts);
        shifts.sort_by_key(|id| (self.data.events[id.index()].ts, *id));
        let timestamps: Vec<Micros> = shifts.iter().map(|id| self.data.events[id.index()].ts).collect();

        for window in cluster_shifts(&timestamps, self.raw_end) {
            let members = shifts[window.members.clone()].to_vec();
            let first = self.data.events[members[0].index()].clone();
            let cumulative_score: f64 = members
                .iter()
                .map(|id| match &self.data.events[id.index()].kind {
                    EventKind::LayoutShift(shift) => shift.score,
                    _ => 0.0,
                })
                .sum();
            let raw_index = match first.origin {
                EventOrigin::Raw { raw_index } | EventOrigin::Synthetic { raw_index } => Some(raw_index),
                _ => None,
            };
            let id = EventId(self.data.events.len() as u32);
            let origin = match raw_index {
                Some(raw_index) => {
                    self.data.synthetic_events.insert(raw_index, id);
                    EventOrigin::Synthetic { raw_index }
                }
                None => EventOrigin::Derived,
            };
            self.data.events.push(TraceEvent {
                id,
                name: "SyntheticLayoutShiftCluster".to_string(),
                cat: first.cat.clone(),
                ph: Phase::Complete,
                ts: window.start,
                dur: Some(window.end - window.start),
                pid: first.pid,
                tid: first.tid,
                args: Value::Null,
                origin,
                kind: EventKind::LayoutShiftCluster(LayoutShiftClusterData {
                    shifts: members,
                    cumulative_score,
                }),
            });
            self.data.layout_shifts.clusters.push(id);
        }
        self.data.layout_shifts.shifts = shifts;
    }

    fn compute_bounds(&mut self) {
        let mut bounds: Option<TraceBounds> = None;
        let ranges = self
            .data
            .events
            .iter()
            .map(|event| (event.ts, event.end()))
            .chain(self.frame_signals.iter().map(|&(ts, _)| (ts, ts)));
        for (start, end) in ranges {
            let bounds = bounds.get_or_insert(TraceBounds { min: start, max: end });
            bounds.min = bounds.min.min(start);
            bounds.max = bounds.max.max(end);
        }
        let mut bounds = bounds.unwrap_or_default();
        bounds.max = bounds.max.max(self.raw_end);
        self.data.bounds = bounds;
    }

    fn collect_frames(&mut self) {
        self.frame_signals.sort_by_key(|&(ts, _)| ts);
        self.data.frames = build_frames(&self.frame_signals, self.data.bounds.max);
    }

    fn collect_interactions(&mut self) {
        let spans: Vec<Span> = self
            .data
            .interactions
            .all
            .iter()
            .map(|&id| {
                let event = &self.data.events[id.index()];
                Span {
                    id,
                    start: event.ts,
                    end: event.end(),
                }
            })
            .collect();
        self.data.interactions.no_nesting = interactions::remove_nested(&spans);
        self.data.interactions.longest = interactions::longest(&spans);
    }

    fn collect_threads(&mut self) {
        let events = &self.data.events;
        let mut threads: Vec<ThreadData> = self
            .thread_events
            .drain()
            .map(|(key, mut entries)| {
                entries.sort_by_key(|id| {
                    let event = &events[id.index()];
                    (event.ts, Reverse(event.duration()), *id)
                });
                let mut profile_calls = self.profile_calls.remove(&key).unwrap_or_default();
                profile_calls.sort_by_key(|id| (events[id.index()].ts, *id));
                ThreadData {
                    key: Some(key),
                    name: self.thread_names.get(&key).cloned(),
                    process_name: self.process_names.get(&key.pid).cloned(),
                    is_main: false,
                    entries,
                    profile_calls,
                }
            })
            .collect();

        let main = ["CrRendererMain", "CrBrowserMain", "Main"]
            .iter()
            .find_map(|candidate| {
                threads
                    .iter()
                    .position(|thread| thread.name.as_deref() == Some(*candidate))
            })
            .or_else(|| {
                threads
                    .iter()
                    .enumerate()
                    .max_by_key(|(_, thread)| (thread.entries.len(), Reverse(thread.key)))
                    .map(|(index, _)| index)
            });
        if let Some(main) = main {
            threads[main].is_main = true;
        }
        threads.sort_by_key(|thread| (!thread.is_main, thread.key));
        self.data.threads = threads;
    }

    fn collect_initiators(&mut self) {
        let mut ordered: Vec<&TraceEvent> = self.data.events.iter().collect();
        ordered.sort_by_key(|event| (event.ts, event.id));
        let links = link_initiators(ordered);
        self.data.initiator_of = links.initiator_of;
        self.data.initiated_by = links.initiated_by;
    }

    fn sort_tracks(&mut self) {
        let events = &self.data.events;
        let by_start = |id: &EventId| (events[id.index()].ts, *id);
        self.data.timings.page_load_markers.sort_by_key(by_start);
        self.data.timings.user_marks.sort_by_key(by_start);
        self.data.timings.user_measures.sort_by_key(|id| {
            let event = &events[id.index()];
            (event.ts, Reverse(event.duration()), *id)
        });
        self.data.interactions.all.sort_by_key(by_start);
        self.data.gpu_tasks.sort_by_key(by_start);
        self.data.server_timings.sort_by_key(by_start);
        self.data.network_requests.sort_by_key(by_start);
        self.data.screenshots.sort_by_key(by_start);
        self.data.layout_shifts.clusters.sort_by_key(by_start);
    }
}

fn layout_shift_data(data: Option<&Value>) -> LayoutShiftData {
    let field = |keys: &[&str]| {
        keys.iter()
            .find_map(|key| data.and_then(|data| data.get(*key)))
            .cloned()
    };
    let score = field(&["weighted_score_delta", "score", "value"])
        .and_then(|value| value.as_f64())
        .unwrap_or(0.0);
    let had_recent_input = field(&["had_recent_input", "hadRecentInput"])
        .and_then(|value| value.as_bool())
        .unwrap_or(false);
    let rect = |value: Option<&Value>| -> Option<[f64; 4]> {
        let values = value?.as_array()?;
        match values.as_slice() {
            [x, y, width, height] => Some([x.as_f64()?, y.as_f64()?, width.as_f64()?, height.as_f64()?]),
            _ => None,
        }
    };
    let sources = field(&["impacted_nodes", "sources"])
        .as_ref()
        .and_then(Value::as_array)
        .map(|nodes| {
            nodes
                .iter()
                .map(|node| LayoutShiftSource {
                    node_id: node
                        .get("node_id")
                        .or_else(|| node.get("nodeId"))
                        .and_then(Value::as_u64),
                    old_rect: rect(node.get("old_rect").or_else(|| node.get("previousRect"))),
                    new_rect: rect(node.get("new_rect").or_else(|| node.get("currentRect"))),
                })
                .collect()
        })
        .unwrap_or_default();
    LayoutShiftData {
        score,
        had_recent_input,
        sources,
    }
}
