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
use crate::trace::{EventCategory, TraceEvent};

#[derive(Debug, Clone, Default)]
pub struct GpuAppender;

impl GpuAppender {
    pub fn append_track_at_level(
        &self,
        builder: &mut TrackBuilder<'_>,
        track: TrackIndex,
        start_level: usize,
        expanded: bool,
    ) -> usize {
        let trace = builder.trace();
        let filter = builder.filter();
        let events: Vec<_> = trace.gpu_tasks.iter().copied().filter(|id| filter.is_visible(*id)).collect();
        if events.is_empty() {
            return start_level;
        }
        builder.register_track_for_group(track_group("GPU", start_level, expanded, track), track);
        builder.append_events_at_level(&events, start_level, track, |_, _, _| {})
    }

    pub fn color_for_event(&self, _event: &TraceEvent) -> String {
        EventCategory::Gpu.color().to_string()
    }

    pub fn title_for_event(&self, _event: &TraceEvent) -> String {
        "GPU".to_string()
    }
}
