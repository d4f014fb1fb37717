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

//! # Chrome Trace Format
//!
//! Rust types for the Chrome Trace Event Format as consumed by a flame chart,
//! plus an incremental loader that turns a byte stream into a [`RawTrace`].
//!
//! ## Input formats
//!
//! Three document shapes are accepted, detected from the first
//! non-whitespace characters of the stream:
//! - **JSON Array Format** (`[`): a bare array of trace events
//! - **JSON Object Format** (`{`): an object whose `traceEvents` array holds the events
//! - **CPU Profile** (`{"nodes":`): a V8 CPU profile with nodes, samples and time deltas
//!
//! ## Timestamps
//!
//! Raw timestamps are microseconds and may be fractional. Consumers normalise
//! them; this crate keeps them exactly as written.

mod error;
mod loader;
mod tokenizer;

pub use error::LoadError;
pub use loader::{load_from_reader, LoadOptions, LoadProgress, LoaderClient, TraceLoader};
pub use tokenizer::BalancedJsonTokenizer;

use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Shape of the document a trace was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceFormat {
    Array,
    Object,
    CpuProfile,
}

/// A fully loaded trace, ready to be turned into an event store.
#[derive(Debug, Clone)]
pub struct RawTrace {
    pub format: TraceFormat,
    /// Events in file order. The position of an event in this vector is its
    /// raw index, the durable identity other layers key on.
    pub events: Vec<RawTraceEvent>,
    /// Top-level `metadata` of the object format, when present.
    pub metadata: Option<Value>,
    /// Only set for CPU-profile documents.
    pub cpu_profile: Option<CpuProfile>,
}

impl RawTrace {
    pub fn from_events(events: Vec<RawTraceEvent>) -> Self {
        Self {
            format: TraceFormat::Array,
            events,
            metadata: None,
            cpu_profile: None,
        }
    }

    pub fn from_cpu_profile(profile: CpuProfile) -> Self {
        Self {
            format: TraceFormat::CpuProfile,
            events: Vec::new(),
            metadata: None,
            cpu_profile: Some(profile),
        }
    }
}

/// The JSON Object Format envelope. Only the fields the loader cares about
/// are modelled; everything else is ignored on read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceObject {
    #[serde(rename = "traceEvents", default)]
    pub trace_events: Vec<RawTraceEvent>,
    #[serde(rename = "displayTimeUnit", skip_serializing_if = "Option::is_none")]
    pub display_time_unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// A single trace event as written in the file.
///
/// Every phase shares this flat shape; what a field means depends on `ph`.
/// Specialised payloads (layout shifts, interactions, network timing) live
/// in `args` and are decoded by the event store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct RawTraceEvent {
    #[builder(into)]
    pub name: String,
    /// Comma-separated list of categories.
    #[serde(default)]
    #[builder(into, default)]
    pub cat: String,
    pub ph: Phase,
    /// Timestamp in microseconds.
    #[serde(default)]
    #[builder(default)]
    pub ts: f64,
    /// Duration in microseconds, only meaningful for complete events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dur: Option<f64>,
    #[serde(default)]
    #[builder(default)]
    pub pid: u32,
    #[serde(default)]
    #[builder(default)]
    pub tid: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id2: Option<Id2>,
    /// Scope of an instant event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s: Option<InstantScope>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    #[builder(default)]
    pub args: Value,
}

impl RawTraceEvent {
    /// `args.data`, the conventional home of structured payloads.
    pub fn data(&self) -> Option<&Value> {
        self.args.get("data")
    }

    pub fn has_category(&self, category: &str) -> bool {
        self.cat.split(',').any(|cat| cat.trim() == category)
    }

    /// Identifier used to pair async begin/end events.
    pub fn async_id(&self) -> Option<String> {
        if let Some(id) = &self.id {
            return Some(id.key());
        }
        self.id2.as_ref().map(Id2::key)
    }
}

/// Event phase, serialised as the single character the format uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Opens a duration on a thread; closed by the next matching `E`.
    #[serde(rename = "B")]
    DurationBegin,
    #[serde(rename = "E")]
    DurationEnd,
    /// Begin and end folded into one event carrying `dur`.
    #[serde(rename = "X")]
    Complete,
    #[serde(rename = "i")]
    Instant,
    #[serde(rename = "I")]
    InstantDeprecated,
    #[serde(rename = "C")]
    Counter,
    #[serde(rename = "b")]
    AsyncBegin,
    #[serde(rename = "n")]
    AsyncStep,
    #[serde(rename = "e")]
    AsyncEnd,
    #[serde(rename = "S")]
    LegacyAsyncBegin,
    #[serde(rename = "T")]
    LegacyAsyncStepInto,
    #[serde(rename = "p")]
    LegacyAsyncStepPast,
    #[serde(rename = "F")]
    LegacyAsyncEnd,
    #[serde(rename = "s")]
    FlowBegin,
    #[serde(rename = "t")]
    FlowStep,
    #[serde(rename = "f")]
    FlowEnd,
    /// Sample events; CPU profiles arrive as `Profile`/`ProfileChunk` with this phase.
    #[serde(rename = "P")]
    Sample,
    #[serde(rename = "N")]
    ObjectCreated,
    #[serde(rename = "D")]
    ObjectDestroyed,
    #[serde(rename = "O")]
    ObjectSnapshot,
    #[serde(rename = "M")]
    Metadata,
    #[serde(rename = "V")]
    GlobalMemoryDump,
    #[serde(rename = "v")]
    ProcessMemoryDump,
    #[serde(rename = "R")]
    Mark,
    #[serde(rename = "c")]
    ClockSync,
    #[serde(rename = "(")]
    ContextEnter,
    #[serde(rename = ")")]
    ContextLeave,
    #[serde(rename = "=")]
    LinkedId,
}

impl Phase {
    /// Phases drawn as a point in time rather than a box.
    pub fn is_instant(self) -> bool {
        matches!(
            self,
            Phase::Instant | Phase::InstantDeprecated | Phase::Mark | Phase::AsyncStep
        )
    }

    pub fn is_async_begin(self) -> bool {
        matches!(self, Phase::AsyncBegin | Phase::LegacyAsyncBegin)
    }

    pub fn is_async_end(self) -> bool {
        matches!(self, Phase::AsyncEnd | Phase::LegacyAsyncEnd)
    }
}

/// Scope of an instant event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstantScope {
    #[serde(rename = "g")]
    Global,
    #[serde(rename = "p")]
    Process,
    #[serde(rename = "t")]
    Thread,
}

/// Event identifier: a string, a number or an explicitly process-local id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    String(String),
    Number(u64),
    Local(LocalId),
}

impl Id {
    pub fn key(&self) -> String {
        match self {
            Id::String(s) => s.clone(),
            Id::Number(n) => n.to_string(),
            Id::Local(local) => format!("local:{}", local.local),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalId {
    pub local: String,
}

/// Explicit global/local identifier pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Id2 {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local: Option<String>,
}

impl Id2 {
    pub fn key(&self) -> String {
        match (&self.global, &self.local) {
            (Some(global), _) => format!("global:{global}"),
            (None, Some(local)) => format!("local:{local}"),
            (None, None) => String::new(),
        }
    }
}

/// A V8 CPU profile, either a whole `.cpuprofile` document or the
/// accumulated content of `ProfileChunk` events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuProfile {
    #[serde(default)]
    pub nodes: Vec<ProfileNode>,
    /// Node id sampled at each tick.
    #[serde(default)]
    pub samples: Vec<u32>,
    /// Microseconds between consecutive samples; the first delta is relative
    /// to `start_time`.
    #[serde(rename = "timeDeltas", default)]
    pub time_deltas: Vec<f64>,
    #[serde(rename = "startTime", default)]
    pub start_time: f64,
    #[serde(rename = "endTime", default)]
    pub end_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileNode {
    pub id: u32,
    #[serde(rename = "callFrame")]
    pub call_frame: CallFrame,
    /// Chunked profiles link nodes upwards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<u32>,
    /// Whole-document profiles link nodes downwards.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallFrame {
    #[serde(rename = "functionName", default)]
    pub function_name: String,
    #[serde(default)]
    pub url: String,
    #[serde(rename = "scriptId", default)]
    pub script_id: Value,
    #[serde(rename = "lineNumber", default)]
    pub line_number: i64,
    #[serde(rename = "columnNumber", default)]
    pub column_number: i64,
}
