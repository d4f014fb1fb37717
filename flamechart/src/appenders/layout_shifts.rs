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

use super::{track_group, TrackIndex};
use crate::compat::TrackBuilder;
use crate::trace::{EventId, EventKind, TraceEvent};
use std::cmp::Reverse;

/// Layout shift clusters with their shifts nested underneath.
#[derive(Debug, Clone, Default)]
pub struct LayoutShiftsAppender;

impl LayoutShiftsAppender {
    pub fn append_track_at_level(
        &self,
        builder: &mut TrackBuilder<'_>,
        track: TrackIndex,
        start_level: usize,
        expanded: bool,
    ) -> usize {
        let trace = builder.trace();
        let filter = builder.filter();
        let mut events: Vec<EventId> = trace
            .layout_shifts
            .clusters
            .iter()
            .chain(&trace.layout_shifts.shifts)
            .copied()
            .filter(|id| filter.is_visible(*id))
            .collect();
        if events.is_empty() {
            return start_level;
        }
        events.sort_by_key(|id| {
            let event = trace.event(*id);
            (event.ts, Reverse(event.duration()), *id)
        });
        builder.register_track_for_group(track_group("Layout shifts", start_level, expanded, track), track);
        builder.append_events_at_level(&events, start_level, track, |_, _, _| {})
    }

    pub fn color_for_event(&self, event: &TraceEvent) -> String {
        match event.kind {
            EventKind::LayoutShiftCluster(_) => "#9c62d0".to_string(),
            _ => "#7b3fd3".to_string(),
        }
    }

    pub fn title_for_event(&self, event: &TraceEvent) -> String {
        match event.kind {
            EventKind::LayoutShiftCluster(_) => "Layout shift cluster".to_string(),
            _ => "Layout shift".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::compat::CompatibilityTracksAppender;
    use crate::config::LayoutConfig;
    use crate::entries_filter::EntriesFilter;
    use crate::test_support::*;
    use crate::timeline_data::FlameChartTimelineData;
    use rstest::rstest;
    use serde_json::json;
    use std::sync::Arc;

    #[rstest]
    fn test_shifts_nest_under_their_cluster() {
        let shift = |ts: f64| with_data(instant("LayoutShift", "loading", ts), json!({ "score": 0.1 }));
        let trace = Arc::new(trace_from([shift(1_000.0), shift(1_500.0)]));
        let filter = EntriesFilter::new(trace.clone());
        let mut appender = CompatibilityTracksAppender::new(trace.clone(), LayoutConfig::default());
        let mut data = FlameChartTimelineData::new();
        let next = appender.append_all_tracks(&mut data, &filter, 0);

        assert_eq!(next, 2);
        assert_eq!(data.entry_levels(), &[0, 1, 1]);
        assert!(data.entry_total_times()[0] > 0.0);
        assert!(data.entry_total_times()[1].is_nan());
    }
}
