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

//! The facade the flame chart widget talks to.
//!
//! Owns the render buffer and answers every index based query. Any change to
//! the visible entry set goes through [`FlameChartDataProvider::timeline_data`]
//! with `rebuild = true`, which discards the buffer and every cache derived
//! from entry indices before running all appenders again from level 0.

use crate::appenders::{HighlightedEntryInfo, TrackIndex};
use crate::compat::CompatibilityTracksAppender;
use crate::config::LayoutConfig;
use crate::entries_filter::{FilterAction, PossibleFilterActions};
use crate::error::{Error, Result};
use crate::modifications::ModificationsManager;
use crate::search::SearchFilter;
use crate::serializer::{EventsSerializer, SerializableKey};
use crate::time::{format_ms, micros_to_ms};
use crate::timeline_data::{
    Decoration, EntryData, FlameChartTimelineData, Group, GroupStyle, InitiatorEdge,
};
use crate::trace::{EventCategory, EventId, FrameState, TraceData, TraceEvent};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// One search hit: the entry index and its start in ms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchResult {
    pub index: usize,
    pub start_ms: f64,
}

struct Model {
    trace: Arc<TraceData>,
    compat: CompatibilityTracksAppender,
    modifications: ModificationsManager,
    serializer: EventsSerializer,
}

pub struct FlameChartDataProvider {
    layout: LayoutConfig,
    model: Option<Model>,
    timeline_data: Option<FlameChartTimelineData>,
    index_for_event: HashMap<EventId, usize>,
    last_initiator_entry: Option<usize>,
}

fn frame_color(state: FrameState) -> &'static str {
    match state {
        FrameState::Idle => "white",
        FrameState::Presented => "#d7f0d1",
        FrameState::Partial => "#f0e08a",
        FrameState::Dropped => "#f28b82",
    }
}

fn frame_title(state: FrameState) -> &'static str {
    match state {
        FrameState::Idle => "Idle frame",
        FrameState::Presented => "Frame",
        FrameState::Partial => "Partially presented frame",
        FrameState::Dropped => "Dropped frame",
    }
}

impl FlameChartDataProvider {
    pub fn new(layout: LayoutConfig) -> Self {
        Self {
            layout,
            model: None,
            timeline_data: None,
            index_for_event: HashMap::new(),
            last_initiator_entry: None,
        }
    }

    /// Drops the render buffer and everything derived from entry indices.
    pub fn reset(&mut self) {
        self.timeline_data = None;
        self.index_for_event.clear();
        self.last_initiator_entry = None;
    }

    /// Binds a new trace, or none. Filters and annotations start empty.
    pub fn set_model(&mut self, trace: Option<Arc<TraceData>>) {
        self.reset();
        self.model = trace.map(|trace| Model {
            compat: CompatibilityTracksAppender::new(trace.clone(), self.layout.clone()),
            modifications: ModificationsManager::new(trace.clone()),
            serializer: EventsSerializer::new(),
            trace,
        });
    }

    pub fn trace(&self) -> Option<&Arc<TraceData>> {
        self.model.as_ref().map(|model| &model.trace)
    }

    pub fn compat(&self) -> Option<&CompatibilityTracksAppender> {
        self.model.as_ref().map(|model| &model.compat)
    }

    pub fn modifications(&self) -> Option<&ModificationsManager> {
        self.model.as_ref().map(|model| &model.modifications)
    }

    pub fn modifications_mut(&mut self) -> Option<&mut ModificationsManager> {
        self.model.as_mut().map(|model| &mut model.modifications)
    }

    /// Replaces filters and annotations, e.g. with ones restored from disk,
    /// and rebuilds.
    pub fn set_modifications(&mut self, modifications: ModificationsManager) {
        if let Some(model) = self.model.as_mut() {
            model.modifications = modifications;
            self.timeline_data(true);
        }
    }

    /// The render buffer, rebuilt from scratch when asked or when missing.
    pub fn timeline_data(&mut self, rebuild: bool) -> &FlameChartTimelineData {
        if rebuild || self.timeline_data.is_none() {
            let data = self.build_timeline_data();
            self.index_for_event.clear();
            self.last_initiator_entry = None;
            self.timeline_data = Some(data);
        }
        self.timeline_data.get_or_insert_with(FlameChartTimelineData::new)
    }

    fn build_timeline_data(&mut self) -> FlameChartTimelineData {
        let mut data = FlameChartTimelineData::new();
        let Some(model) = self.model.as_mut() else {
            return data;
        };
        let mut level = 0;
        if self.layout.show_frames {
            level = append_frames(&model.trace, &mut data, level);
        }
        let next_level = model
            .compat
            .append_all_tracks(&mut data, model.modifications.entries_filter(), level);
        tracing::debug!(
            entries = data.len(),
            next_level,
            groups = data.groups().len(),
            "rebuilt timeline data"
        );
        data
    }

    fn data(&self) -> Result<&FlameChartTimelineData> {
        self.timeline_data.as_ref().ok_or(Error::NoTimelineData)
    }

    fn entry(&self, index: usize) -> Result<EntryData> {
        self.data()?
            .entry_data()
            .get(index)
            .copied()
            .ok_or(Error::EntryIndexOutOfRange(index))
    }

    pub fn event_by_index(&self, index: usize) -> Option<&TraceEvent> {
        let model = self.model.as_ref()?;
        match self.entry(index).ok()? {
            EntryData::Event(id) | EntryData::Screenshot(id) => model.trace.get(id),
            EntryData::Frame(_) => None,
        }
    }

    /// Entry index of an event in the current buffer.
    ///
    /// The map is filled on first use after a rebuild and discarded on the
    /// next one, so a stale index is never returned.
    pub fn index_for_event(&mut self, id: EventId) -> Option<usize> {
        if self.index_for_event.is_empty() {
            let data = self.timeline_data.as_ref()?;
            self.index_for_event = data
                .entry_data()
                .iter()
                .enumerate()
                .filter_map(|(index, entry)| match entry {
                    EntryData::Event(id) | EntryData::Screenshot(id) => Some((*id, index)),
                    EntryData::Frame(_) => None,
                })
                .collect();
        }
        self.index_for_event.get(&id).copied()
    }

    pub fn entry_color(&self, index: usize) -> Option<String> {
        let model = self.model.as_ref()?;
        let data = self.timeline_data.as_ref()?;
        match *data.entry_data().get(index)? {
            EntryData::Frame(frame) => model
                .trace
                .frames
                .get(frame)
                .map(|frame| frame_color(frame.state).to_string()),
            EntryData::Screenshot(_) => Some("transparent".to_string()),
            EntryData::Event(id) => {
                let event = model.trace.get(id)?;
                let level = data.entry_levels()[index];
                Some(
                    model
                        .compat
                        .color_for_event_at_level(event, level)
                        .unwrap_or_else(|| EventCategory::for_event(event).color().to_string()),
                )
            }
        }
    }

    pub fn entry_title(&self, index: usize) -> Option<String> {
        let model = self.model.as_ref()?;
        let data = self.timeline_data.as_ref()?;
        match *data.entry_data().get(index)? {
            EntryData::Frame(frame) => model
                .trace
                .frames
                .get(frame)
                .map(|frame| format_ms(micros_to_ms(frame.duration()))),
            // Drawn as an image.
            EntryData::Screenshot(_) => None,
            EntryData::Event(id) => {
                let event = model.trace.get(id)?;
                model
                    .compat
                    .title_for_event_at_level(event, data.entry_levels()[index])
                    .or_else(|| Some(event.name.clone()))
            }
        }
    }

    pub fn highlighted_entry_info(&self, index: usize) -> Option<HighlightedEntryInfo> {
        let model = self.model.as_ref()?;
        let data = self.timeline_data.as_ref()?;
        match *data.entry_data().get(index)? {
            EntryData::Frame(frame) => {
                let frame = model.trace.frames.get(frame)?;
                Some(HighlightedEntryInfo {
                    title: frame_title(frame.state).to_string(),
                    formatted_time: format_ms(micros_to_ms(frame.duration())),
                    warnings: Vec::new(),
                })
            }
            EntryData::Screenshot(id) => {
                let event = model.trace.get(id)?;
                Some(HighlightedEntryInfo {
                    title: "Screenshot".to_string(),
                    formatted_time: format_ms(model.trace.to_ms(event.ts)),
                    warnings: Vec::new(),
                })
            }
            EntryData::Event(id) => {
                let event = model.trace.get(id)?;
                model.compat.highlighted_entry_info(event, data.entry_levels()[index])
            }
        }
    }

    /// Decorations to draw for an entry; `None` for entries drawn without any.
    pub fn decorate_entry(&self, index: usize) -> Option<&[Decoration]> {
        let data = self.timeline_data.as_ref()?;
        match data.entry_data().get(index)? {
            EntryData::Event(_) => Some(data.decorations(index)),
            EntryData::Frame(_) | EntryData::Screenshot(_) => None,
        }
    }

    /// Group whose level range contains `level`.
    pub fn group_for_level(&self, level: usize) -> Option<usize> {
        let groups = self.timeline_data.as_ref()?.groups();
        groups.iter().rposition(|group| group.start_level <= level)
    }

    pub fn set_group_expansion(&mut self, group: usize, expanded: bool) {
        let Some(data) = self.timeline_data.as_mut() else {
            return;
        };
        let Some(entry) = data.group_mut(group) else {
            return;
        };
        entry.expanded = expanded;
        if let (Some(track), Some(model)) = (entry.track, self.model.as_mut()) {
            model.compat.set_expanded(track, expanded);
        }
    }

    pub fn set_selected_group(&mut self, group: Option<usize>) {
        if let Some(data) = self.timeline_data.as_mut() {
            data.set_selected_group(group);
        }
    }

    /// Entries overlapping `[start_ms, end_ms]` that `filter` accepts, in
    /// buffer order. Frames and screenshots are never returned.
    pub fn search(&self, start_ms: f64, end_ms: f64, filter: Option<&dyn SearchFilter>) -> Vec<SearchResult> {
        let (Some(model), Some(data)) = (self.model.as_ref(), self.timeline_data.as_ref()) else {
            return Vec::new();
        };
        let mut results = Vec::new();
        for (index, entry) in data.entry_data().iter().enumerate() {
            let EntryData::Event(id) = *entry else {
                continue;
            };
            let start = data.entry_start_times()[index];
            let end = data.entry_end(index).unwrap_or(start);
            if end < start_ms || start > end_ms {
                continue;
            }
            let Some(event) = model.trace.get(id) else {
                continue;
            };
            if filter.is_some_and(|filter| !filter.accept(event)) {
                continue;
            }
            results.push(SearchResult { index, start_ms: start });
        }
        results
    }

    pub fn find_possible_context_menu_actions(&self, index: usize) -> Result<PossibleFilterActions> {
        let EntryData::Event(id) = self.entry(index)? else {
            return Ok(PossibleFilterActions::default());
        };
        let model = self.model.as_ref().ok_or(Error::NoTimelineData)?;
        Ok(model.modifications.entries_filter().find_possible_actions(id))
    }

    /// Applies a tree action to the entry at `index` and, when anything
    /// changed, rebuilds. Returns whether the buffer was rebuilt.
    pub fn modify_tree(&mut self, action: FilterAction, index: usize) -> Result<bool> {
        let EntryData::Event(id) = self.entry(index)? else {
            return Ok(false);
        };
        let model = self.model.as_mut().ok_or(Error::NoTimelineData)?;
        let changed = model.modifications.apply_filter_action(action, id);
        if changed {
            self.timeline_data(true);
        }
        Ok(changed)
    }

    /// Recomputes initiator edges for the selected entry. Returns `false`
    /// when the selection did not change and nothing needs redrawing.
    pub fn build_flow_for_initiator(&mut self, index: Option<usize>) -> Result<bool> {
        if self.last_initiator_entry == index {
            return Ok(false);
        }
        let Some(index) = index else {
            self.last_initiator_entry = None;
            if let Some(data) = self.timeline_data.as_mut() {
                data.set_initiators(Vec::new());
            }
            return Ok(true);
        };
        let entry = self.entry(index)?;
        self.last_initiator_entry = Some(index);
        let model = self.model.as_ref().ok_or(Error::NoTimelineData)?;
        let EntryData::Event(selected) = entry else {
            if let Some(data) = self.timeline_data.as_mut() {
                data.set_initiators(Vec::new());
            }
            return Ok(true);
        };

        let trace = model.trace.clone();
        let mut pairs = Vec::new();
        let mut visited = HashSet::from([selected]);
        let mut current = selected;
        while let Some(initiator) = trace.initiator_of(current) {
            pairs.push((initiator, current));
            if !visited.insert(initiator) {
                break;
            }
            current = initiator;
        }
        pairs.extend(trace.initiated_by(selected).iter().map(|initiated| (selected, *initiated)));

        let mut edges = Vec::with_capacity(pairs.len());
        for (initiator, initiated) in pairs {
            let Some(model) = self.model.as_ref() else {
                break;
            };
            let filter = model.modifications.entries_filter();
            let initiator_visible = filter.first_visible_parent(initiator);
            let initiated_visible = filter.first_visible_parent(initiated);
            let (Some(initiator_visible), Some(initiated_visible)) = (initiator_visible, initiated_visible) else {
                continue;
            };
            let (Some(initiator_index), Some(event_index)) =
                (self.index_for_event(initiator_visible), self.index_for_event(initiated_visible))
            else {
                continue;
            };
            edges.push(InitiatorEdge {
                initiator_index,
                event_index,
                is_initiator_hidden: initiator_visible != initiator,
                is_entry_hidden: initiated_visible != initiated,
            });
        }
        if let Some(data) = self.timeline_data.as_mut() {
            data.set_initiators(edges);
        }
        Ok(true)
    }

    pub fn key_for_entry(&self, index: usize) -> Option<SerializableKey> {
        let model = self.model.as_ref()?;
        let entry = self.entry(index).ok()?;
        EventsSerializer::key_for_entry(&model.trace, entry)
    }

    /// Entry index for a durable key, or `None` when the entry is not drawn.
    pub fn entry_for_key(&mut self, key: &SerializableKey) -> Result<Option<usize>> {
        let model = self.model.as_mut().ok_or(Error::NoTimelineData)?;
        let entry = model.serializer.entry_for_key(key, &model.trace)?;
        match entry {
            EntryData::Event(id) | EntryData::Screenshot(id) => Ok(self.index_for_event(id)),
            EntryData::Frame(_) => Ok(self
                .data()?
                .entry_data()
                .iter()
                .position(|candidate| *candidate == entry)),
        }
    }

    pub fn events_for_tree_view(&self, track: TrackIndex) -> Option<Vec<EventId>> {
        self.compat()?.events_for_tree_view(track)
    }
}

/// Frames on one level and screenshots on the next, under one group.
/// Each screenshot lasts until the next one; the last until trace end.
fn append_frames(trace: &TraceData, data: &mut FlameChartTimelineData, start_level: usize) -> usize {
    if trace.frames.is_empty() && trace.screenshots.is_empty() {
        return start_level;
    }
    data.push_group(Group {
        name: "Frames".to_string(),
        start_level,
        style: GroupStyle {
            nesting_level: 0,
            collapsible: true,
            use_first_line_for_overview: true,
            share_header_line: false,
        },
        selectable: false,
        expanded: true,
        show_stack_context_menu: false,
        track: None,
    });

    let mut level = start_level;
    if !trace.frames.is_empty() {
        for frame in &trace.frames {
            data.push_entry(
                EntryData::Frame(frame.index),
                level,
                trace.to_ms(frame.start),
                micros_to_ms(frame.duration()),
            );
        }
        level += 1;
    }
    if !trace.screenshots.is_empty() {
        let starts: Vec<_> = trace.screenshots.iter().map(|id| trace.event(*id).ts).collect();
        for (position, id) in trace.screenshots.iter().enumerate() {
            let start = starts[position];
            let end = starts.get(position + 1).copied().unwrap_or(trace.bounds.max).max(start);
            data.push_entry(
                EntryData::Screenshot(*id),
                level,
                trace.to_ms(start),
                micros_to_ms(end - start),
            );
        }
        level += 1;
    }
    level
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::TextFilter;
    use crate::test_support::*;
    use rstest::rstest;
    use serde_json::json;

    fn provider_for(trace: TraceData) -> FlameChartDataProvider {
        let mut provider = FlameChartDataProvider::new(LayoutConfig::default());
        provider.set_model(Some(Arc::new(trace)));
        provider.timeline_data(false);
        provider
    }

    fn assert_aligned(data: &FlameChartTimelineData) {
        assert_eq!(data.entry_data().len(), data.entry_levels().len());
        assert_eq!(data.entry_data().len(), data.entry_start_times().len());
        assert_eq!(data.entry_data().len(), data.entry_total_times().len());
    }

    #[rstest]
    fn test_screenshot_durations() {
        let trace = trace_from([
            screenshot(0.0),
            screenshot(100_000.0),
            screenshot(250_000.0),
            complete("RunTask", 0.0, 300_000.0),
        ]);
        let mut provider = provider_for(trace);
        let data = provider.timeline_data(false);

        let totals: Vec<f64> = data
            .entry_data()
            .iter()
            .zip(data.entry_total_times())
            .filter(|(entry, _)| matches!(entry, EntryData::Screenshot(_)))
            .map(|(_, total)| *total)
            .collect();
        assert_eq!(totals, vec![100.0, 150.0, 50.0]);
        assert_eq!(data.groups()[0].name, "Frames");
        assert!(provider.decorate_entry(0).is_none());
        assert_eq!(provider.entry_title(0), None);
    }

    #[rstest]
    fn test_search_window() {
        let trace = trace_from([
            complete("A", 10_000.0, 1.0),
            complete("B", 50_000.0, 1.0),
            complete("C", 90_000.0, 1.0),
        ]);
        let provider = provider_for(trace);
        let starts: Vec<f64> = provider.search(0.0, 60.0, None).iter().map(|r| r.start_ms).collect();
        assert_eq!(starts, vec![0.0, 40.0]);

        // Bounds start at the first event, so A is at 0 ms, B at 40 ms.
        let filter = TextFilter::new("b").unwrap();
        let results = provider.search(0.0, 60.0, Some(&filter));
        assert_eq!(results.len(), 1);
        assert_eq!(provider.event_by_index(results[0].index).unwrap().name, "B");
    }

    #[rstest]
    fn test_search_skips_frames() {
        let trace = trace_from([screenshot(0.0), complete("RunTask", 0.0, 10.0)]);
        let provider = provider_for(trace);
        let results = provider.search(0.0, 1.0, None);
        assert_eq!(results.len(), 1);
        assert_eq!(provider.event_by_index(results[0].index).unwrap().name, "RunTask");
    }

    #[rstest]
    fn test_modify_tree_rebuilds_and_invalidates_index_cache() {
        let trace = trace_from([
            complete("Parent", 0.0, 100.0),
            complete("Hidden", 10.0, 20.0),
            complete("Other", 200.0, 10.0),
        ]);
        let mut provider = provider_for(trace);
        let trace = provider.trace().unwrap().clone();
        let hidden = trace.event_for_raw_index(2).unwrap();
        let other = trace.event_for_raw_index(3).unwrap();

        let hidden_index = provider.index_for_event(hidden).unwrap();
        assert_eq!(provider.index_for_event(other), Some(2));

        assert!(provider.modify_tree(FilterAction::MergeFunction, hidden_index).unwrap());
        let data = provider.timeline_data(false);
        assert_aligned(data);
        assert_eq!(data.len(), 2);
        assert_eq!(provider.index_for_event(other), Some(1));
        assert_eq!(provider.index_for_event(hidden), None);
        let parent_index = provider.index_for_event(trace.event_for_raw_index(1).unwrap()).unwrap();
        assert_eq!(provider.decorate_entry(parent_index), Some(&[Decoration::HiddenDescendantsArrow][..]));

        let possible = provider.find_possible_context_menu_actions(parent_index).unwrap();
        assert!(possible.reset_children);
        assert!(provider.modify_tree(FilterAction::UndoAllActions, parent_index).unwrap());
        assert_eq!(provider.timeline_data(false).len(), 3);
    }

    #[rstest]
    fn test_initiator_flow() {
        let trace = trace_from([
            with_data(complete("TimerInstall", 0.0, 1.0), json!({ "timerId": 1 })),
            with_data(complete("TimerFire", 100.0, 5.0), json!({ "timerId": 1 })),
        ]);
        let mut provider = provider_for(trace);
        let trace = provider.trace().unwrap().clone();
        let install = provider.index_for_event(trace.event_for_raw_index(1).unwrap()).unwrap();
        let fire = provider.index_for_event(trace.event_for_raw_index(2).unwrap()).unwrap();

        assert!(provider.build_flow_for_initiator(Some(fire)).unwrap());
        let edges = provider.timeline_data(false).initiators().to_vec();
        assert_eq!(
            edges,
            vec![InitiatorEdge {
                initiator_index: install,
                event_index: fire,
                is_initiator_hidden: false,
                is_entry_hidden: false,
            }]
        );
        assert!(!provider.build_flow_for_initiator(Some(fire)).unwrap());

        assert!(provider.build_flow_for_initiator(Some(install)).unwrap());
        assert_eq!(provider.timeline_data(false).initiators().len(), 1);

        assert!(provider.build_flow_for_initiator(None).unwrap());
        assert!(provider.timeline_data(false).initiators().is_empty());
        assert!(matches!(
            provider.build_flow_for_initiator(Some(99)),
            Err(Error::EntryIndexOutOfRange(99))
        ));
    }

    #[rstest]
    fn test_invalid_initiator_index_is_not_remembered() {
        let trace = trace_from([complete("Task", 0.0, 10.0)]);
        let mut provider = provider_for(trace);

        for _ in 0..2 {
            assert!(matches!(
                provider.build_flow_for_initiator(Some(99)),
                Err(Error::EntryIndexOutOfRange(99))
            ));
        }
        assert!(provider.build_flow_for_initiator(Some(0)).unwrap());
        assert!(!provider.build_flow_for_initiator(Some(0)).unwrap());
    }

    #[rstest]
    fn test_hidden_initiator_resolves_to_visible_parent() {
        let trace = trace_from([
            complete("Parent", 0.0, 10.0),
            with_data(complete("TimerInstall", 1.0, 1.0), json!({ "timerId": 1 })),
            with_data(complete("TimerFire", 100.0, 5.0), json!({ "timerId": 1 })),
        ]);
        let mut provider = provider_for(trace);
        let trace = provider.trace().unwrap().clone();
        let install = provider.index_for_event(trace.event_for_raw_index(2).unwrap()).unwrap();
        provider.modify_tree(FilterAction::MergeFunction, install).unwrap();

        let parent = provider.index_for_event(trace.event_for_raw_index(1).unwrap()).unwrap();
        let fire = provider.index_for_event(trace.event_for_raw_index(3).unwrap()).unwrap();
        assert!(provider.build_flow_for_initiator(Some(fire)).unwrap());
        let edge = provider.timeline_data(false).initiators()[0];
        assert_eq!(edge.initiator_index, parent);
        assert!(edge.is_initiator_hidden);
        assert!(!edge.is_entry_hidden);
    }

    #[rstest]
    fn test_keys_resolve_to_entries() {
        let trace = trace_from([complete("RunTask", 0.0, 10.0), complete("Layout", 2.0, 3.0)]);
        let mut provider = provider_for(trace);
        let key = provider.key_for_entry(1).unwrap();
        assert_eq!(key.to_string(), "r-2");
        assert_eq!(provider.entry_for_key(&key).unwrap(), Some(1));
        assert!(provider.entry_for_key(&SerializableKey::Raw { raw_index: 40 }).is_err());
    }

    #[rstest]
    fn test_groups_and_expansion() {
        let trace = trace_from([complete("RunTask", 0.0, 10.0), complete_on(2, "Work", 0.0, 5.0)]);
        let mut provider = provider_for(trace);
        let groups: Vec<(String, usize, bool)> = provider
            .timeline_data(false)
            .groups()
            .iter()
            .map(|group| (group.name.clone(), group.start_level, group.expanded))
            .collect();
        assert_eq!(
            groups,
            vec![("Main".to_string(), 0, true), ("Thread 2".to_string(), 1, false)]
        );
        assert_eq!(provider.group_for_level(0), Some(0));
        assert_eq!(provider.group_for_level(5), Some(1));

        provider.set_group_expansion(1, true);
        let data = provider.timeline_data(true);
        assert!(data.groups()[1].expanded);
        provider.set_selected_group(Some(1));
        assert_eq!(provider.timeline_data(false).selected_group(), Some(1));
        // A rebuild starts without a selection.
        assert_eq!(provider.timeline_data(true).selected_group(), None);
    }

    #[rstest]
    fn test_no_model_gives_empty_data() {
        let mut provider = FlameChartDataProvider::new(LayoutConfig::default());
        assert!(provider.timeline_data(true).is_empty());
        assert!(provider.search(0.0, 100.0, None).is_empty());
        assert!(matches!(provider.modify_tree(FilterAction::MergeFunction, 0), Err(Error::EntryIndexOutOfRange(0))));
    }

    #[rstest]
    fn test_reset_drops_buffer() {
        let mut provider = provider_for(trace_from([complete("RunTask", 0.0, 10.0)]));
        assert_eq!(provider.index_for_event(EventId(0)), Some(0));
        provider.reset();
        assert_eq!(provider.index_for_event(EventId(0)), None);
        assert_eq!(provider.timeline_data(false).len(), 1);
    }
}
