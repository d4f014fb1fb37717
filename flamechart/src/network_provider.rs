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

//! Data provider for the network track, drawn in its own flame chart.
//!
//! Requests are packed into rows independently of the main chart and drawn
//! as bars with queueing, request and download segments.

use crate::appenders::HighlightedEntryInfo;
use crate::time::{format_ms, micros_to_ms};
use crate::timeline_data::{EntryData, FlameChartTimelineData, Group, GroupStyle};
use crate::trace::{EventId, Micros, NetworkRequestData, ResourceType, TraceData, TraceEvent};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;

/// Narrowest bar drawn, in pixels.
pub const MIN_BAR_WIDTH_PX: f64 = 2.0;

/// Assigns each `[start, end)` interval the lowest level free at its start.
///
/// Intervals must be sorted by start. Returns the level of each interval and
/// the number of levels used.
pub fn pack_intervals(intervals: &[(Micros, Micros)]) -> (Vec<usize>, usize) {
    let mut busy: BinaryHeap<Reverse<(Micros, usize)>> = BinaryHeap::new();
    let mut free: BinaryHeap<Reverse<usize>> = BinaryHeap::new();
    let mut levels = Vec::with_capacity(intervals.len());
    let mut level_count = 0;
    for &(start, end) in intervals {
        while let Some(&Reverse((busy_until, level))) = busy.peek() {
            if busy_until > start {
                break;
            }
            busy.pop();
            free.push(Reverse(level));
        }
        let level = match free.pop() {
            Some(Reverse(level)) => level,
            None => {
                level_count += 1;
                level_count - 1
            }
        };
        busy.push(Reverse((end.max(start + 1), level)));
        levels.push(level);
    }
    (levels, level_count)
}

/// Pixel positions of the segments of one request bar. Always
/// non-decreasing from `queueing_start` to `end`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetworkBarBoundaries {
    pub queueing_start: f64,
    pub send_start: f64,
    pub headers_end: f64,
    pub finish: f64,
    pub end: f64,
}

impl NetworkBarBoundaries {
    fn from_request<F>(trace: &TraceData, request: &NetworkRequestData, time_to_px: F) -> Self
    where
        F: Fn(f64) -> f64,
    {
        let px = |ts: Micros| time_to_px(trace.to_ms(ts));
        let queueing_start = px(request.queueing_start);
        let send_start = px(request.send_start).max(queueing_start);
        let headers_end = px(request.headers_end).max(send_start);
        let finish = px(request.finish).max(headers_end);
        let end = px(request.end).max(finish).max(queueing_start + MIN_BAR_WIDTH_PX);
        Self {
            queueing_start,
            send_start,
            headers_end,
            finish,
            end,
        }
    }
}

pub fn resource_type_color(resource_type: ResourceType) -> &'static str {
    match resource_type {
        ResourceType::Document => "hsl(215, 100%, 80%)",
        ResourceType::Stylesheet => "hsl(256, 67%, 70%)",
        ResourceType::Script => "hsl(43, 83%, 64%)",
        ResourceType::Image => "hsl(109, 33%, 55%)",
        ResourceType::Font => "hsl(0, 100%, 80%)",
        ResourceType::Media => "hsl(272, 64%, 80%)",
        ResourceType::Fetch | ResourceType::Xhr => "hsl(190, 70%, 60%)",
        ResourceType::WebSocket => "hsl(180, 40%, 50%)",
        ResourceType::Manifest | ResourceType::Other => "hsl(0, 0%, 70%)",
    }
}

#[derive(Default)]
pub struct NetworkFlameChartDataProvider {
    trace: Option<Arc<TraceData>>,
    timeline_data: Option<FlameChartTimelineData>,
    index_for_event: HashMap<EventId, usize>,
}

impl NetworkFlameChartDataProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.timeline_data = None;
        self.index_for_event.clear();
    }

    pub fn set_model(&mut self, trace: Option<Arc<TraceData>>) {
        self.reset();
        self.trace = trace;
    }

    pub fn is_empty(&self) -> bool {
        self.trace
            .as_ref()
            .map_or(true, |trace| trace.network_requests.is_empty())
    }

    pub fn timeline_data(&mut self, rebuild: bool) -> &FlameChartTimelineData {
        if rebuild || self.timeline_data.is_none() {
            self.index_for_event.clear();
            let data = self.build_timeline_data();
            self.timeline_data = Some(data);
        }
        self.timeline_data.get_or_insert_with(FlameChartTimelineData::new)
    }

    fn build_timeline_data(&self) -> FlameChartTimelineData {
        let mut data = FlameChartTimelineData::new();
        let Some(trace) = self.trace.as_deref() else {
            return data;
        };
        if trace.network_requests.is_empty() {
            return data;
        }
        let intervals: Vec<(Micros, Micros)> = trace
            .network_requests
            .iter()
            .map(|id| {
                let event = trace.event(*id);
                (event.ts, event.end())
            })
            .collect();
        let (levels, level_count) = pack_intervals(&intervals);

        data.push_group(Group {
            name: "Network".to_string(),
            start_level: 0,
            style: GroupStyle {
                nesting_level: 0,
                collapsible: true,
                use_first_line_for_overview: false,
                share_header_line: false,
            },
            selectable: true,
            expanded: true,
            show_stack_context_menu: false,
            track: None,
        });
        for ((id, level), (start, end)) in trace.network_requests.iter().zip(levels).zip(intervals) {
            data.push_entry(EntryData::Event(*id), level, trace.to_ms(start), micros_to_ms(end - start));
        }
        tracing::debug!(requests = data.len(), levels = level_count, "rebuilt network data");
        data
    }

    fn request(&self, index: usize) -> Option<(&TraceData, &TraceEvent, &NetworkRequestData)> {
        let trace = self.trace.as_deref()?;
        let id = self.timeline_data.as_ref()?.entry_data().get(index)?.event()?;
        let event = trace.get(id)?;
        Some((trace, event, event.network_request()?))
    }

    pub fn event_by_index(&self, index: usize) -> Option<&TraceEvent> {
        self.request(index).map(|(_, event, _)| event)
    }

    pub fn index_for_event(&mut self, id: EventId) -> Option<usize> {
        if self.index_for_event.is_empty() {
            let data = self.timeline_data.as_ref()?;
            self.index_for_event = data
                .entry_data()
                .iter()
                .enumerate()
                .filter_map(|(index, entry)| Some((entry.event()?, index)))
                .collect();
        }
        self.index_for_event.get(&id).copied()
    }

    pub fn entry_color(&self, index: usize) -> Option<&'static str> {
        self.request(index)
            .map(|(_, _, request)| resource_type_color(request.resource_type))
    }

    pub fn entry_title(&self, index: usize) -> Option<String> {
        self.request(index).map(|(_, _, request)| request.url.clone())
    }

    pub fn highlighted_entry_info(&self, index: usize) -> Option<HighlightedEntryInfo> {
        let (_, event, request) = self.request(index)?;
        let queueing = micros_to_ms(request.send_start - request.queueing_start);
        let download = micros_to_ms(request.finish - request.headers_end);
        let mut title = format!("{} ({} priority)", request.url, request.priority);
        if request.from_cache {
            title.push_str(" (from cache)");
        }
        let mut warnings = Vec::new();
        if request.failed {
            warnings.push("Request failed.".to_string());
        }
        Some(HighlightedEntryInfo {
            title,
            formatted_time: format!(
                "{} (queueing {}, download {})",
                format_ms(micros_to_ms(event.duration())),
                format_ms(queueing),
                format_ms(download)
            ),
            warnings,
        })
    }

    /// Bar segment positions for the entry at `index`.
    pub fn bar_boundaries<F>(&self, index: usize, time_to_px: F) -> Option<NetworkBarBoundaries>
    where
        F: Fn(f64) -> f64,
    {
        let (trace, _, request) = self.request(index)?;
        Some(NetworkBarBoundaries::from_request(trace, request, time_to_px))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use rstest::rstest;

    #[rstest]
    #[case::reuses_lowest_free(&[(0, 10), (5, 15), (12, 20)], vec![0, 1, 0], 2)]
    #[case::touching(&[(0, 10), (10, 20)], vec![0, 0], 1)]
    #[case::all_overlap(&[(0, 30), (1, 30), (2, 30)], vec![0, 1, 2], 3)]
    #[case::lowest_of_several(&[(0, 10), (1, 5), (2, 20), (6, 8), (11, 12)], vec![0, 1, 2, 1, 0], 3)]
    #[case::empty(&[], vec![], 0)]
    fn test_pack_intervals(#[case] intervals: &[(Micros, Micros)], #[case] levels: Vec<usize>, #[case] count: usize) {
        assert_eq!(pack_intervals(intervals), (levels, count));
    }

    fn provider() -> NetworkFlameChartDataProvider {
        let mut events = network_request("1", "https://example.com/", 0.0, 10_000.0);
        events.extend(network_request("2", "https://example.com/app.js", 5_000.0, 15_000.0));
        events.extend(network_request("3", "https://cdn.example.com/a.png", 12_000.0, 20_000.0));
        let mut provider = NetworkFlameChartDataProvider::new();
        provider.set_model(Some(Arc::new(trace_from(events))));
        provider
    }

    #[rstest]
    fn test_requests_are_packed() {
        let mut provider = provider();
        let data = provider.timeline_data(false);
        assert_eq!(data.entry_levels(), &[0, 1, 0]);
        assert_eq!(data.entry_start_times(), &[0.0, 5.0, 12.0]);
        assert_eq!(data.groups()[0].name, "Network");
        assert_eq!(provider.entry_title(1).as_deref(), Some("https://example.com/app.js"));
        assert_eq!(provider.entry_color(0), Some(resource_type_color(ResourceType::Document)));

        let id = provider.event_by_index(2).unwrap().id;
        assert_eq!(provider.index_for_event(id), Some(2));
    }

    #[rstest]
    fn test_bar_boundaries_are_monotone() {
        let mut provider = provider();
        provider.timeline_data(false);
        let bar = provider.bar_boundaries(0, |ms| ms * 10.0).unwrap();
        assert_eq!(bar.queueing_start, 0.0);
        assert_eq!(bar.headers_end, 50.0);
        assert_eq!(bar.end, 100.0);
        let values = [bar.queueing_start, bar.send_start, bar.headers_end, bar.finish, bar.end];
        assert!(values.windows(2).all(|pair| pair[0] <= pair[1]));

        let squeezed = provider.bar_boundaries(0, |ms| ms * 0.001).unwrap();
        assert!(squeezed.end - squeezed.queueing_start >= MIN_BAR_WIDTH_PX);
    }

    #[rstest]
    fn test_highlighted_info() {
        let mut provider = provider();
        provider.timeline_data(false);
        let info = provider.highlighted_entry_info(0).unwrap();
        assert_eq!(info.title, "https://example.com/ (High priority)");
        assert!(info.warnings.is_empty());
    }

    #[rstest]
    fn test_without_requests() {
        let mut provider = NetworkFlameChartDataProvider::new();
        assert!(provider.is_empty());
        assert!(provider.timeline_data(true).is_empty());
        provider.set_model(Some(Arc::new(trace_from([complete("RunTask", 0.0, 10.0)]))));
        assert!(provider.is_empty());
        assert!(provider.timeline_data(false).is_empty());
        assert_eq!(provider.entry_title(0), None);
    }
}
