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

//! Per-track layout.
//!
//! Each track kind knows how to pack its events into flame chart levels and
//! how to describe them. The set is closed; [`TrackAppender`] dispatches with
//! a `match` so adding a track kind is checked exhaustively.

mod gpu;
mod interactions;
mod layout_shifts;
mod server_timings;
mod thread;
mod timings;

pub use gpu::GpuAppender;
pub use interactions::InteractionsAppender;
pub use layout_shifts::LayoutShiftsAppender;
pub use server_timings::ServerTimingsAppender;
pub use thread::ThreadAppender;
pub use timings::TimingsAppender;

use crate::color::ColorGenerator;
use crate::compat::TrackBuilder;
use crate::config::LayoutConfig;
use crate::time::{format_ms, micros_to_ms};
use crate::timeline_data::{Group, GroupStyle};
use crate::trace::{EventId, TraceData, TraceEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackIndex(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Timings,
    Interactions,
    Gpu,
    LayoutShifts,
    ServerTimings,
    Thread,
}

/// Hover content for one entry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HighlightedEntryInfo {
    pub title: String,
    pub formatted_time: String,
    pub warnings: Vec<String>,
}

/// Color generators shared by all tracks for the lifetime of a model.
#[derive(Debug)]
pub struct Palette {
    pub scripts: ColorGenerator,
    pub timings: ColorGenerator,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            scripts: ColorGenerator::for_scripts(),
            timings: ColorGenerator::wide(),
        }
    }
}

/// Read-only state needed to describe an event.
#[derive(Clone, Copy)]
pub struct AppenderContext<'a> {
    pub trace: &'a TraceData,
    pub layout: &'a LayoutConfig,
    pub palette: &'a Palette,
}

#[derive(Debug, Clone)]
pub enum TrackAppender {
    Timings(TimingsAppender),
    Interactions(InteractionsAppender),
    Gpu(GpuAppender),
    LayoutShifts(LayoutShiftsAppender),
    ServerTimings(ServerTimingsAppender),
    Thread(ThreadAppender),
}

impl TrackAppender {
    pub fn kind(&self) -> TrackKind {
        match self {
            TrackAppender::Timings(_) => TrackKind::Timings,
            TrackAppender::Interactions(_) => TrackKind::Interactions,
            TrackAppender::Gpu(_) => TrackKind::Gpu,
            TrackAppender::LayoutShifts(_) => TrackKind::LayoutShifts,
            TrackAppender::ServerTimings(_) => TrackKind::ServerTimings,
            TrackAppender::Thread(_) => TrackKind::Thread,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            TrackAppender::Timings(_) => "Timings",
            TrackAppender::Interactions(_) => "Interactions",
            TrackAppender::Gpu(_) => "GPU",
            TrackAppender::LayoutShifts(_) => "Layout shifts",
            TrackAppender::ServerTimings(_) => "Server Timings",
            TrackAppender::Thread(appender) => appender.name(),
        }
    }

    /// Appends the header group and events starting at `start_level` and
    /// returns the first free level after the track. A track without
    /// visible events appends nothing and returns `start_level`.
    pub fn append_track_at_level(
        &self,
        builder: &mut TrackBuilder<'_>,
        track: TrackIndex,
        start_level: usize,
        expanded: bool,
    ) -> usize {
        match self {
            TrackAppender::Timings(appender) => appender.append_track_at_level(builder, track, start_level, expanded),
            TrackAppender::Interactions(appender) => {
                appender.append_track_at_level(builder, track, start_level, expanded)
            }
            TrackAppender::Gpu(appender) => appender.append_track_at_level(builder, track, start_level, expanded),
            TrackAppender::LayoutShifts(appender) => {
                appender.append_track_at_level(builder, track, start_level, expanded)
            }
            TrackAppender::ServerTimings(appender) => {
                appender.append_track_at_level(builder, track, start_level, expanded)
            }
            TrackAppender::Thread(appender) => appender.append_track_at_level(builder, track, start_level, expanded),
        }
    }

    pub fn color_for_event(&self, event: &TraceEvent, context: AppenderContext<'_>) -> String {
        match self {
            TrackAppender::Timings(appender) => appender.color_for_event(event, context),
            TrackAppender::Interactions(appender) => appender.color_for_event(event, context),
            TrackAppender::Gpu(appender) => appender.color_for_event(event),
            TrackAppender::LayoutShifts(appender) => appender.color_for_event(event),
            TrackAppender::ServerTimings(appender) => appender.color_for_event(event, context),
            TrackAppender::Thread(appender) => appender.color_for_event(event, context),
        }
    }

    pub fn title_for_event(&self, event: &TraceEvent) -> String {
        match self {
            TrackAppender::Timings(appender) => appender.title_for_event(event),
            TrackAppender::Interactions(appender) => appender.title_for_event(event),
            TrackAppender::Gpu(appender) => appender.title_for_event(event),
            TrackAppender::LayoutShifts(appender) => appender.title_for_event(event),
            TrackAppender::ServerTimings(appender) => appender.title_for_event(event),
            TrackAppender::Thread(appender) => appender.title_for_event(event),
        }
    }

    pub fn highlighted_entry_info(&self, event: &TraceEvent, context: AppenderContext<'_>) -> HighlightedEntryInfo {
        let title = self.title_for_event(event);
        match self {
            TrackAppender::Timings(appender) => appender.highlighted_entry_info(event, title, context),
            TrackAppender::Interactions(appender) => appender.highlighted_entry_info(event, title, context),
            TrackAppender::Thread(appender) => appender.highlighted_entry_info(event, title, context),
            TrackAppender::Gpu(_) | TrackAppender::LayoutShifts(_) | TrackAppender::ServerTimings(_) => {
                default_entry_info(event, title, context.trace)
            }
        }
    }

    /// Events eligible for the call tree and bottom-up views.
    pub fn events_for_tree_view(&self, trace: &TraceData) -> Vec<EventId> {
        match self {
            TrackAppender::Thread(appender) => appender.events(trace).to_vec(),
            TrackAppender::Timings(_) => trace.timings.user_measures.clone(),
            TrackAppender::Interactions(_)
            | TrackAppender::Gpu(_)
            | TrackAppender::LayoutShifts(_)
            | TrackAppender::ServerTimings(_) => Vec::new(),
        }
    }
}

pub(crate) fn track_group(name: impl Into<String>, start_level: usize, expanded: bool, track: TrackIndex) -> Group {
    Group {
        name: name.into(),
        start_level,
        style: GroupStyle {
            nesting_level: 0,
            collapsible: true,
            use_first_line_for_overview: false,
            share_header_line: false,
        },
        selectable: true,
        expanded,
        show_stack_context_menu: false,
        track: Some(track),
    }
}

/// Duration of the event, or for instants the time since trace start.
pub(crate) fn formatted_time(event: &TraceEvent, trace: &TraceData) -> String {
    if event.is_instant() {
        format_ms(trace.to_ms(event.ts))
    } else {
        format_ms(micros_to_ms(event.duration()))
    }
}

pub(crate) fn default_entry_info(event: &TraceEvent, title: String, trace: &TraceData) -> HighlightedEntryInfo {
    HighlightedEntryInfo {
        title,
        formatted_time: formatted_time(event, trace),
        warnings: Vec::new(),
    }
}
