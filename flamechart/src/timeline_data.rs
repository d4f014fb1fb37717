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

//! The render buffer shared by every track: four parallel entry arrays plus
//! groups, decorations and initiator edges.

use crate::appenders::TrackIndex;
use crate::trace::EventId;
use std::collections::HashMap;

/// What a flame chart entry stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryData {
    Event(EventId),
    /// Index into the trace's frame list.
    Frame(usize),
    Screenshot(EventId),
}

impl EntryData {
    pub fn event(self) -> Option<EventId> {
        match self {
            EntryData::Event(id) => Some(id),
            EntryData::Frame(_) | EntryData::Screenshot(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GroupStyle {
    pub nesting_level: u32,
    pub collapsible: bool,
    pub use_first_line_for_overview: bool,
    /// Header drawn on the same row as the first level.
    pub share_header_line: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub name: String,
    pub start_level: usize,
    pub style: GroupStyle,
    pub selectable: bool,
    pub expanded: bool,
    pub show_stack_context_menu: bool,
    pub track: Option<TrackIndex>,
}

/// Interaction timestamps in ms since trace start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Whiskers {
    pub raw_start: f64,
    pub processing_start: f64,
    pub processing_end: f64,
    pub raw_end: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decoration {
    /// Striped from `start_ms` to the end of the box.
    CandyStripe { start_ms: f64 },
    WarningTriangle { custom_end_ms: Option<f64> },
    HiddenDescendantsArrow,
    Whiskers(Whiskers),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitiatorEdge {
    pub initiator_index: usize,
    pub event_index: usize,
    pub is_initiator_hidden: bool,
    pub is_entry_hidden: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FlameChartTimelineData {
    entry_data: Vec<EntryData>,
    entry_levels: Vec<usize>,
    entry_start_times: Vec<f64>,
    entry_total_times: Vec<f64>,
    groups: Vec<Group>,
    decorations: HashMap<usize, Vec<Decoration>>,
    initiators: Vec<InitiatorEdge>,
    selected_group: Option<usize>,
}

impl FlameChartTimelineData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one entry to all four arrays and returns its index.
    /// A `NaN` total time marks an instant.
    pub fn push_entry(&mut self, data: EntryData, level: usize, start_ms: f64, total_ms: f64) -> usize {
        let index = self.entry_data.len();
        self.entry_data.push(data);
        self.entry_levels.push(level);
        self.entry_start_times.push(start_ms);
        self.entry_total_times.push(total_ms);
        index
    }

    /// Rewrites the box of an already appended entry.
    pub fn set_entry_times(&mut self, index: usize, start_ms: f64, total_ms: f64) {
        if index < self.len() {
            self.entry_start_times[index] = start_ms;
            self.entry_total_times[index] = total_ms;
        }
    }

    pub fn add_decoration(&mut self, index: usize, decoration: Decoration) {
        let decorations = self.decorations.entry(index).or_default();
        if !decorations.contains(&decoration) {
            decorations.push(decoration);
        }
    }

    pub fn decorations(&self, index: usize) -> &[Decoration] {
        self.decorations.get(&index).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn push_group(&mut self, group: Group) -> usize {
        self.groups.push(group);
        self.groups.len() - 1
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn group_mut(&mut self, index: usize) -> Option<&mut Group> {
        self.groups.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.entry_data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entry_data.is_empty()
    }

    pub fn entry_data(&self) -> &[EntryData] {
        &self.entry_data
    }

    pub fn entry_levels(&self) -> &[usize] {
        &self.entry_levels
    }

    pub fn entry_start_times(&self) -> &[f64] {
        &self.entry_start_times
    }

    pub fn entry_total_times(&self) -> &[f64] {
        &self.entry_total_times
    }

    /// End of an entry in ms; instants end where they start.
    pub fn entry_end(&self, index: usize) -> Option<f64> {
        let start = *self.entry_start_times.get(index)?;
        let total = self.entry_total_times[index];
        Some(if total.is_nan() { start } else { start + total })
    }

    pub fn level_count(&self) -> usize {
        self.entry_levels.iter().max().map_or(0, |max| max + 1)
    }

    pub fn initiators(&self) -> &[InitiatorEdge] {
        &self.initiators
    }

    pub fn set_initiators(&mut self, edges: Vec<InitiatorEdge>) {
        self.initiators = edges;
    }

    pub fn selected_group(&self) -> Option<usize> {
        self.selected_group
    }

    pub fn set_selected_group(&mut self, group: Option<usize>) {
        self.selected_group = group.filter(|index| *index < self.groups.len());
    }
}
