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

use super::{default_entry_info, formatted_time, track_group, AppenderContext, HighlightedEntryInfo, TrackIndex};
use crate::compat::TrackBuilder;
use crate::trace::{EventId, EventKind, MarkerKind, TraceEvent};

/// Page load markers and user timings: marks on the first levels, measures
/// packed below them.
#[derive(Debug, Clone, Default)]
pub struct TimingsAppender;

fn marker_color(kind: MarkerKind) -> Option<&'static str> {
    match kind {
        MarkerKind::Navigation => Some("#ff9800"),
        MarkerKind::FirstPaint => Some("#228847"),
        MarkerKind::FirstContentfulPaint => Some("#1a6937"),
        MarkerKind::LargestContentfulPaint => Some("#1a3422"),
        MarkerKind::DomContentLoaded => Some("#0867cb"),
        MarkerKind::Load => Some("#b31412"),
        MarkerKind::UserMark | MarkerKind::TimeStamp => None,
    }
}

impl TimingsAppender {
    pub fn append_track_at_level(
        &self,
        builder: &mut TrackBuilder<'_>,
        track: TrackIndex,
        start_level: usize,
        expanded: bool,
    ) -> usize {
        let trace = builder.trace();
        let filter = builder.filter();
        let mut marks: Vec<EventId> = trace
            .timings
            .page_load_markers
            .iter()
            .chain(&trace.timings.user_marks)
            .copied()
            .filter(|id| filter.is_visible(*id))
            .collect();
        marks.sort_by_key(|id| (trace.event(*id).ts, *id));
        let measures: Vec<EventId> = trace
            .timings
            .user_measures
            .iter()
            .copied()
            .filter(|id| filter.is_visible(*id))
            .collect();
        if marks.is_empty() && measures.is_empty() {
            return start_level;
        }

        builder.register_track_for_group(track_group("Timings", start_level, expanded, track), track);
        let level = builder.append_events_at_level(&marks, start_level, track, |_, _, _| {});
        builder.append_events_at_level(&measures, level, track, |_, _, _| {})
    }

    pub fn color_for_event(&self, event: &TraceEvent, context: AppenderContext<'_>) -> String {
        if let EventKind::Marker(kind) = event.kind {
            if let Some(color) = marker_color(kind) {
                return color.to_string();
            }
        }
        context.palette.timings.color_for_id(&event.name)
    }

    pub fn title_for_event(&self, event: &TraceEvent) -> String {
        match event.kind {
            EventKind::Marker(kind) => kind.short_title().map_or_else(|| event.name.clone(), str::to_string),
            _ => event.name.clone(),
        }
    }

    pub fn highlighted_entry_info(
        &self,
        event: &TraceEvent,
        title: String,
        context: AppenderContext<'_>,
    ) -> HighlightedEntryInfo {
        match event.kind {
            // Markers report when they happened rather than a zero duration.
            EventKind::Marker(_) => HighlightedEntryInfo {
                title,
                formatted_time: formatted_time(event, context.trace),
                warnings: Vec::new(),
            },
            _ => default_entry_info(event, title, context.trace),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appenders::Palette;
    use crate::config::LayoutConfig;
    use crate::test_support::*;
    use rstest::rstest;

    #[rstest]
    fn test_marker_titles_and_times() {
        let trace = trace_from([
            complete("RunTask", 1_000.0, 10.0),
            instant("MarkLoad", "devtools.timeline", 3_500.0),
            instant("my-mark", "blink.user_timing", 2_000.0),
        ]);
        let layout = LayoutConfig::default();
        let palette = Palette::default();
        let context = AppenderContext {
            trace: &trace,
            layout: &layout,
            palette: &palette,
        };
        let appender = TimingsAppender;

        let load = trace.event(trace.timings.page_load_markers[0]);
        assert_eq!(appender.title_for_event(load), "L");
        assert_eq!(appender.color_for_event(load, context), "#b31412");
        let info = appender.highlighted_entry_info(load, "L".into(), context);
        assert_eq!(info.formatted_time, "2.50 ms");

        let mark = trace.event(trace.timings.user_marks[0]);
        assert_eq!(appender.title_for_event(mark), "my-mark");
        assert!(appender.color_for_event(mark, context).starts_with("hsl("));
    }
}
