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

use super::{formatted_time, track_group, AppenderContext, HighlightedEntryInfo, TrackIndex};
use crate::compat::TrackBuilder;
use crate::time::{format_ms, micros_to_ms};
use crate::timeline_data::Decoration;
use crate::trace::{EventCategory, EventId, ThreadData, TraceData, TraceEvent};

const LONG_TASK_NAME: &str = "RunTask";

/// One thread: trace events and profile calls nested by time.
#[derive(Debug, Clone)]
pub struct ThreadAppender {
    thread_index: usize,
    name: String,
}

impl ThreadAppender {
    pub fn new(thread_index: usize, thread: &ThreadData) -> Self {
        let name = if thread.is_main {
            "Main".to_string()
        } else {
            match &thread.name {
                Some(name) => name.clone(),
                None => format!("Thread {}", thread.key().tid),
            }
        };
        Self { thread_index, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn thread_index(&self) -> usize {
        self.thread_index
    }

    pub fn events<'t>(&self, trace: &'t TraceData) -> &'t [EventId] {
        trace
            .threads
            .get(self.thread_index)
            .map(|thread| thread.entries.as_slice())
            .unwrap_or(&[])
    }

    pub fn append_track_at_level(
        &self,
        builder: &mut TrackBuilder<'_>,
        track: TrackIndex,
        start_level: usize,
        expanded: bool,
    ) -> usize {
        let trace = builder.trace();
        let filter = builder.filter();
        let events = self.events(trace);
        if !events.iter().any(|id| filter.is_visible(*id)) {
            return start_level;
        }
        let threshold_ms = builder.layout().long_task_threshold_ms;

        let mut group = track_group(self.name.clone(), start_level, expanded, track);
        group.show_stack_context_menu = true;
        builder.register_track_for_group(group, track);
        builder.append_events_at_level(events, start_level, track, |builder, event, index| {
            let start_ms = builder.trace().to_ms(event.ts);
            let is_expandable = builder.filter().is_expandable(event.id);
            let data = builder.data_mut();
            if is_expandable {
                data.add_decoration(index, Decoration::HiddenDescendantsArrow);
            }
            if event.name == LONG_TASK_NAME && micros_to_ms(event.duration()) > threshold_ms {
                data.add_decoration(
                    index,
                    Decoration::CandyStripe {
                        start_ms: start_ms + threshold_ms,
                    },
                );
                data.add_decoration(index, Decoration::WarningTriangle { custom_end_ms: None });
            }
        })
    }

    pub fn color_for_event(&self, event: &TraceEvent, context: AppenderContext<'_>) -> String {
        match event.profile_call() {
            Some(call) if !call.url.is_empty() => context.palette.scripts.color_for_id(&call.url),
            Some(call) => context.palette.scripts.color_for_id(&call.function_name),
            None => EventCategory::for_event(event).color().to_string(),
        }
    }

    pub fn title_for_event(&self, event: &TraceEvent) -> String {
        event.display_name()
    }

    pub fn highlighted_entry_info(
        &self,
        event: &TraceEvent,
        title: String,
        context: AppenderContext<'_>,
    ) -> HighlightedEntryInfo {
        let mut warnings = Vec::new();
        let duration_ms = micros_to_ms(event.duration());
        if event.name == LONG_TASK_NAME && duration_ms > context.layout.long_task_threshold_ms {
            warnings.push(format!("Long task took {}.", format_ms(duration_ms)));
        }
        HighlightedEntryInfo {
            title,
            formatted_time: formatted_time(event, context.trace),
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appenders::Palette;
    use crate::compat::CompatibilityTracksAppender;
    use crate::config::LayoutConfig;
    use crate::entries_filter::{EntriesFilter, FilterAction};
    use crate::test_support::*;
    use crate::timeline_data::FlameChartTimelineData;
    use rstest::rstest;
    use std::sync::Arc;

    #[rstest]
    fn test_long_task_is_flagged() {
        let trace = Arc::new(trace_from([
            complete("RunTask", 0.0, 80_000.0),
            complete("RunTask", 100_000.0, 10_000.0),
        ]));
        let filter = EntriesFilter::new(trace.clone());
        let mut appender = CompatibilityTracksAppender::new(trace.clone(), LayoutConfig::default());
        let mut data = FlameChartTimelineData::new();
        appender.append_all_tracks(&mut data, &filter, 0);

        assert!(data.decorations(0).contains(&Decoration::CandyStripe { start_ms: 50.0 }));
        assert!(data.decorations(1).is_empty());
        let long = trace.event(trace.threads[0].entries[0]);
        let info = appender.highlighted_entry_info(long, 0).unwrap();
        assert_eq!(info.title, "Task");
        assert_eq!(info.formatted_time, "80.0 ms");
        assert_eq!(info.warnings, vec!["Long task took 80.0 ms.".to_string()]);
    }

    #[rstest]
    fn test_collapsed_entry_gets_arrow() {
        let trace = Arc::new(trace_from([complete("Parent", 0.0, 100.0), complete("Child", 10.0, 20.0)]));
        let mut filter = EntriesFilter::new(trace.clone());
        let parent = trace.event_for_raw_index(1).unwrap();
        filter.apply_action(FilterAction::CollapseFunction, parent);

        let mut appender = CompatibilityTracksAppender::new(trace.clone(), LayoutConfig::default());
        let mut data = FlameChartTimelineData::new();
        appender.append_all_tracks(&mut data, &filter, 0);

        assert_eq!(data.len(), 1);
        assert_eq!(data.decorations(0), &[Decoration::HiddenDescendantsArrow]);
    }

    #[rstest]
    fn test_thread_names() {
        let trace = trace_from([complete("A", 0.0, 1.0), complete_on(7, "B", 0.0, 1.0), thread_name(7, "Compositor")]);
        let names: Vec<_> = trace
            .threads
            .iter()
            .enumerate()
            .map(|(index, thread)| ThreadAppender::new(index, thread).name().to_string())
            .collect();
        assert_eq!(names, vec!["Main", "Compositor"]);

        let palette = Palette::default();
        let layout = LayoutConfig::default();
        let context = AppenderContext {
            trace: &trace,
            layout: &layout,
            palette: &palette,
        };
        let appender = ThreadAppender::new(0, &trace.threads[0]);
        let event = trace.event(trace.threads[0].entries[0]);
        assert_eq!(appender.color_for_event(event, context), EventCategory::Other.color());
    }
}
