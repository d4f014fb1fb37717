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

//! Flame chart data pipeline.
//!
//! Turns a loaded trace into the parallel entry arrays a flame chart widget
//! draws from, and answers the queries the widget asks about them: colors,
//! titles, hover details, search, initiator arrows, and tree filtering.
//!
//! The pieces, leaves first:
//! - [`trace`]: the event store, built once per trace from a [`chrome_trace_format::RawTrace`]
//! - [`appenders`]: per-track layout of events into levels
//! - [`compat`]: orchestration of all track appenders over one shared buffer
//! - [`provider`]: the facade the widget talks to
//! - [`network_provider`]: the parallel provider for network request bars
//! - [`serializer`]: durable keys for entries across rebuilds and reloads
//! - [`entries_filter`] and [`modifications`]: user-driven hide/collapse and annotations
//! - [`tree_view`] and [`range_stats`]: call trees and summaries of a selected range

pub mod appenders;
pub mod color;
pub mod compat;
pub mod config;
pub mod entries_filter;
pub mod error;
pub mod modifications;
pub mod network_provider;
pub mod provider;
pub mod range_stats;
pub mod search;
pub mod serializer;
pub mod time;
pub mod timeline_data;
pub mod trace;
pub mod tree_view;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{Error, Result};
pub use provider::FlameChartDataProvider;
pub use timeline_data::{EntryData, FlameChartTimelineData};
pub use trace::{EventId, TraceData, TraceEvent};
