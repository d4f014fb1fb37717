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

//! Orchestration of all track appenders over one shared render buffer.

use crate::appenders::{
    AppenderContext, GpuAppender, HighlightedEntryInfo, InteractionsAppender, LayoutShiftsAppender, Palette,
    ServerTimingsAppender, ThreadAppender, TimingsAppender, TrackAppender, TrackIndex,
};
use crate::config::LayoutConfig;
use crate::entries_filter::EntriesFilter;
use crate::time::micros_to_ms;
use crate::timeline_data::{EntryData, FlameChartTimelineData, Group};
use crate::trace::{EventId, Micros, TraceData, TraceEvent};
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;

/// Write access to the render buffer during one build pass.
///
/// Appenders never touch the entry arrays directly; everything goes through
/// the append and register methods so that level and group lookups stay in
/// sync with what was written.
pub struct TrackBuilder<'a> {
    trace: &'a TraceData,
    layout: &'a LayoutConfig,
    filter: &'a EntriesFilter,
    data: &'a mut FlameChartTimelineData,
    track_for_level: &'a mut Vec<Option<TrackIndex>>,
    track_for_group: &'a mut HashMap<usize, TrackIndex>,
}

impl<'a> TrackBuilder<'a> {
    pub fn trace(&self) -> &'a TraceData {
        self.trace
    }

    pub fn layout(&self) -> &'a LayoutConfig {
        self.layout
    }

    pub fn filter(&self) -> &'a EntriesFilter {
        self.filter
    }

    pub fn data_mut(&mut self) -> &mut FlameChartTimelineData {
        self.data
    }

    /// Packs `events` into levels starting at `start_level` and returns the
    /// first level after the ones used.
    ///
    /// Events must be sorted by start time with ancestors first. Each event
    /// goes to the lowest level whose last entry ended at or before its start;
    /// zero-length events occupy one microsecond. Hidden events are skipped.
    /// `on_appended` runs after each entry is written and knows its index.
    pub fn append_events_at_level<F>(
        &mut self,
        events: &[EventId],
        start_level: usize,
        track: TrackIndex,
        mut on_appended: F,
    ) -> usize
    where
        F: FnMut(&mut Self, &'a TraceEvent, usize),
    {
        let mut last_end_by_level: Vec<Micros> = Vec::new();
        for &id in events {
            if !self.filter.is_visible(id) {
                continue;
            }
            let event = self.trace.event(id);
            let start = event.ts;
            let end = event.end().max(start + 1);

            let level = last_end_by_level
                .iter()
                .position(|&last_end| last_end <= start)
                .unwrap_or(last_end_by_level.len());
            if level == last_end_by_level.len() {
                last_end_by_level.push(end);
            } else {
                last_end_by_level[level] = end;
            }

            let index = self.append_event_at_level(id, start_level + level, track);
            on_appended(self, event, index);
        }
        start_level + last_end_by_level.len()
    }

    /// Writes one event at `level` and returns its entry index.
    pub fn append_event_at_level(&mut self, id: EventId, level: usize, track: TrackIndex) -> usize {
        let event = self.trace.event(id);
        let start = self.trace.to_ms(event.ts);
        let total = if event.is_instant() {
            f64::NAN
        } else {
            micros_to_ms(event.duration())
        };
        self.register_track_for_level(level, track);
        self.data.push_entry(EntryData::Event(id), level, start, total)
    }

    pub fn register_track_for_group(&mut self, group: Group, track: TrackIndex) -> usize {
        let index = self.data.push_group(group);
        self.track_for_group.insert(index, track);
        index
    }

    pub fn register_track_for_level(&mut self, level: usize, track: TrackIndex) {
        if self.track_for_level.len() <= level {
            self.track_for_level.resize(level + 1, None);
        }
        self.track_for_level[level] = Some(track);
    }
}

/// True when the events form one or more strict trees: sorted by start, no
/// event may start inside another and end after it.
pub fn can_build_trees_from_events(events: &[&TraceEvent]) -> bool {
    let mut sorted: Vec<&TraceEvent> = events.to_vec();
    sorted.sort_by_key(|event| (event.ts, Reverse(event.duration()), event.id));

    let mut open_ends: Vec<Micros> = Vec::new();
    for event in sorted {
        while open_ends.last().is_some_and(|&end| end <= event.ts) {
            open_ends.pop();
        }
        if open_ends.last().is_some_and(|&end| event.end() > end) {
            return false;
        }
        open_ends.push(event.end());
    }
    true
}

pub struct CompatibilityTracksAppender {
    trace: Arc<TraceData>,
    layout: LayoutConfig,
    palette: Palette,
    tracks: Vec<TrackAppender>,
    expanded: Vec<bool>,
    track_for_level: Vec<Option<TrackIndex>>,
    track_for_group: HashMap<usize, TrackIndex>,
    visible_tracks: Vec<TrackIndex>,
}

impl CompatibilityTracksAppender {
    pub fn new(trace: Arc<TraceData>, layout: LayoutConfig) -> Self {
        let mut tracks = vec![
            TrackAppender::Timings(TimingsAppender),
            TrackAppender::Interactions(InteractionsAppender),
            TrackAppender::LayoutShifts(LayoutShiftsAppender),
        ];
        let mut expanded = vec![false; tracks.len()];
        for (index, thread) in trace.threads.iter().enumerate() {
            tracks.push(TrackAppender::Thread(ThreadAppender::new(index, thread)));
            expanded.push(thread.is_main);
        }
        tracks.push(TrackAppender::Gpu(GpuAppender));
        tracks.push(TrackAppender::ServerTimings(ServerTimingsAppender));
        expanded.resize(tracks.len(), false);

        Self {
            trace,
            layout,
            palette: Palette::default(),
            tracks,
            expanded,
            track_for_level: Vec::new(),
            track_for_group: HashMap::new(),
            visible_tracks: Vec::new(),
        }
    }

    pub fn trace(&self) -> &Arc<TraceData> {
        &self.trace
    }

    pub fn layout(&self) -> &LayoutConfig {
        &self.layout
    }

    pub fn context(&self) -> AppenderContext<'_> {
        AppenderContext {
            trace: &self.trace,
            layout: &self.layout,
            palette: &self.palette,
        }
    }

    pub fn tracks(&self) -> &[TrackAppender] {
        &self.tracks
    }

    pub fn track(&self, track: TrackIndex) -> Option<&TrackAppender> {
        self.tracks.get(track.0)
    }

    /// Runs every appender from `start_level`, returning the next free level.
    /// Level and group lookups from a previous pass are discarded.
    pub fn append_all_tracks(
        &mut self,
        data: &mut FlameChartTimelineData,
        filter: &EntriesFilter,
        start_level: usize,
    ) -> usize {
        self.track_for_level.clear();
        self.track_for_group.clear();
        self.visible_tracks.clear();

        let mut builder = TrackBuilder {
            trace: &self.trace,
            layout: &self.layout,
            filter,
            data,
            track_for_level: &mut self.track_for_level,
            track_for_group: &mut self.track_for_group,
        };
        let mut level = start_level;
        for (index, appender) in self.tracks.iter().enumerate() {
            let track = TrackIndex(index);
            let expanded = self.expanded.get(index).copied().unwrap_or(false);
            let next = appender.append_track_at_level(&mut builder, track, level, expanded);
            if next != level {
                self.visible_tracks.push(track);
            }
            level = next;
        }
        level
    }

    /// Tracks that produced at least one level in the last pass.
    pub fn all_visible_tracks(&self) -> &[TrackIndex] {
        &self.visible_tracks
    }

    pub fn track_for_level(&self, level: usize) -> Option<TrackIndex> {
        self.track_for_level.get(level).copied().flatten()
    }

    pub fn track_for_group(&self, group: usize) -> Option<TrackIndex> {
        self.track_for_group.get(&group).copied()
    }

    pub fn is_expanded(&self, track: TrackIndex) -> bool {
        self.expanded.get(track.0).copied().unwrap_or(false)
    }

    pub fn set_expanded(&mut self, track: TrackIndex, expanded: bool) {
        if let Some(state) = self.expanded.get_mut(track.0) {
            *state = expanded;
        }
    }

    fn appender_for_level(&self, level: usize) -> Option<&TrackAppender> {
        self.track_for_level(level).and_then(|track| self.track(track))
    }

    pub fn color_for_event_at_level(&self, event: &TraceEvent, level: usize) -> Option<String> {
        self.appender_for_level(level)
            .map(|appender| appender.color_for_event(event, self.context()))
    }

    pub fn title_for_event_at_level(&self, event: &TraceEvent, level: usize) -> Option<String> {
        self.appender_for_level(level)
            .map(|appender| appender.title_for_event(event))
    }

    pub fn highlighted_entry_info(&self, event: &TraceEvent, level: usize) -> Option<HighlightedEntryInfo> {
        self.appender_for_level(level)
            .map(|appender| appender.highlighted_entry_info(event, self.context()))
    }

    /// Events of a track for aggregated tree views, or `None` when the track
    /// has nothing to show or its events overlap in a way no tree can express.
    pub fn events_for_tree_view(&self, track: TrackIndex) -> Option<Vec<EventId>> {
        let appender = self.track(track)?;
        let events = appender.events_for_tree_view(&self.trace);
        if events.is_empty() {
            return None;
        }
        let refs: Vec<&TraceEvent> = events.iter().map(|id| self.trace.event(*id)).collect();
        if !can_build_trees_from_events(&refs) {
            tracing::debug!(track = appender.name(), "track events cannot form a tree");
            return None;
        }
        Some(events)
    }

    pub fn events_for_tree_view_by_name(&self, name: &str) -> Option<Vec<EventId>> {
        let index = self.tracks.iter().position(|appender| appender.name() == name)?;
        self.events_for_tree_view(TrackIndex(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entries_filter::FilterAction;
    use crate::test_support::*;
    use crate::trace::{EventKind, EventOrigin};
    use chrome_trace_format::Phase;
    use rstest::rstest;
    use serde_json::Value;

    fn synthetic(id: u32, ts: Micros, end: Micros) -> TraceEvent {
        TraceEvent {
            id: EventId(id),
            name: format!("async-{id}"),
            cat: "blink".to_string(),
            ph: Phase::AsyncBegin,
            ts,
            dur: Some(end - ts),
            pid: 1,
            tid: 1,
            args: Value::Null,
            origin: EventOrigin::Synthetic { raw_index: id as usize },
            kind: EventKind::Generic,
        }
    }

    #[rstest]
    #[case((0, 10), (5, 15), false)]
    #[case((0, 10), (2, 8), true)]
    #[case((0, 10), (10, 20), true)]
    fn test_can_build_trees_from_events(#[case] a: (Micros, Micros), #[case] b: (Micros, Micros), #[case] expected: bool) {
        let a = synthetic(0, a.0, a.1);
        let b = synthetic(1, b.0, b.1);
        assert_eq!(can_build_trees_from_events(&[&a, &b]), expected);
    }

    fn build(trace: &Arc<TraceData>, filter: &EntriesFilter) -> (CompatibilityTracksAppender, FlameChartTimelineData) {
        let mut appender = CompatibilityTracksAppender::new(trace.clone(), LayoutConfig::default());
        let mut data = FlameChartTimelineData::new();
        appender.append_all_tracks(&mut data, filter, 0);
        (appender, data)
    }

    #[rstest]
    fn test_packed_levels_never_overlap() {
        let trace = Arc::new(trace_from([
            complete("A", 0.0, 100.0),
            complete("B", 10.0, 20.0),
            complete("C", 40.0, 30.0),
            complete("D", 45.0, 0.0),
            complete("E", 45.0, 0.0),
            complete("F", 150.0, 10.0),
        ]));
        let filter = EntriesFilter::new(trace.clone());
        let (_, data) = build(&trace, &filter);

        let levels = data.entry_levels();
        let starts = data.entry_start_times();
        let totals = data.entry_total_times();
        for i in 0..data.len() {
            for j in (i + 1)..data.len() {
                if levels[i] != levels[j] {
                    continue;
                }
                let end_i = starts[i] + totals[i].max(0.001);
                let end_j = starts[j] + totals[j].max(0.001);
                assert!(end_i <= starts[j] || end_j <= starts[i], "entries {i} and {j} overlap");
            }
        }
        // A, then B and C nested once, then D and E stacked below C.
        assert_eq!(levels, &[0, 1, 1, 2, 3, 0]);
    }

    #[rstest]
    fn test_empty_tracks_have_no_group() {
        let trace = Arc::new(trace_from([complete("RunTask", 0.0, 10.0)]));
        let filter = EntriesFilter::new(trace.clone());
        let (appender, data) = build(&trace, &filter);

        assert_eq!(data.groups().len(), 1);
        assert_eq!(appender.all_visible_tracks().len(), 1);
        let track = appender.track_for_level(0).unwrap();
        assert!(matches!(appender.track(track), Some(TrackAppender::Thread(_))));
        assert_eq!(appender.track_for_group(0), Some(track));
    }

    #[rstest]
    fn test_hidden_entries_are_not_packed() {
        let trace = Arc::new(trace_from([
            complete("Parent", 0.0, 100.0),
            complete("Child", 10.0, 20.0),
            complete("Grandchild", 12.0, 5.0),
        ]));
        let mut filter = EntriesFilter::new(trace.clone());
        let child = trace.event_for_raw_index(2).unwrap();
        assert!(filter.apply_action(FilterAction::MergeFunction, child));

        let (_, data) = build(&trace, &filter);
        assert_eq!(data.len(), 2);
        assert_eq!(data.entry_levels(), &[0, 1]);
    }

    #[rstest]
    fn test_tracks_are_stacked() {
        let mut events = vec![
            instant("firstPaint", "loading", 5.0),
            complete("RunTask", 0.0, 10.0),
        ];
        events.extend(interaction("0x1", 1, 2.0, 8.0));
        let trace = Arc::new(trace_from(events));
        let filter = EntriesFilter::new(trace.clone());
        let (appender, data) = build(&trace, &filter);

        let names: Vec<_> = data.groups().iter().map(|group| (group.name.clone(), group.start_level)).collect();
        assert_eq!(
            names,
            vec![
                ("Timings".to_string(), 0),
                ("Interactions".to_string(), 1),
                ("Main".to_string(), 2),
            ]
        );
        let marker = trace.timings.page_load_markers[0];
        let title = appender.title_for_event_at_level(trace.event(marker), 0);
        assert_eq!(title.as_deref(), Some("FP"));
    }

    #[rstest]
    fn test_events_for_tree_view_rejects_overlapping_async() {
        let mut events = vec![complete("RunTask", 0.0, 100.0)];
        events.extend(async_pair("a", "blink", "1", 10.0, 50.0, Value::Null));
        events.extend(async_pair("b", "blink", "2", 30.0, 80.0, Value::Null));
        let trace = Arc::new(trace_from(events));
        let filter = EntriesFilter::new(trace.clone());
        let (appender, _) = build(&trace, &filter);

        assert!(appender.events_for_tree_view_by_name("Main").is_none());
        assert!(appender.events_for_tree_view_by_name("GPU").is_none());
    }
}
