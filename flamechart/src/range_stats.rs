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

//! Summary of a selected time range and debouncing of range updates.

use crate::entries_filter::EntryTree;
use crate::trace::{EventCategory, Micros, ThreadData, TraceData};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Self time per category inside `[start, end)`. Time covered by no entry
/// is counted as [`EventCategory::Idle`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeStats {
    pub start: Micros,
    pub end: Micros,
    pub by_category: BTreeMap<EventCategory, Micros>,
}

impl RangeStats {
    pub fn get(&self, category: EventCategory) -> Micros {
        self.by_category.get(&category).copied().unwrap_or(0)
    }

    pub fn total(&self) -> Micros {
        self.by_category.values().sum()
    }
}

fn clipped(start: Micros, end: Micros, range_start: Micros, range_end: Micros) -> Micros {
    end.min(range_end).saturating_sub(start.max(range_start))
}

pub fn stats_for_range(trace: &TraceData, thread: &ThreadData, start: Micros, end: Micros) -> RangeStats {
    let mut stats = RangeStats {
        start,
        end,
        by_category: BTreeMap::new(),
    };
    if end <= start {
        return stats;
    }
    let mut tree = EntryTree::default();
    tree.insert_sorted(thread.entries.iter().map(|id| trace.event(*id)));

    let in_range = |id| {
        let event = trace.event(id);
        clipped(event.ts, event.end(), start, end)
    };
    let mut busy = 0;
    for root in tree.roots() {
        busy += in_range(*root);
    }
    for id in &thread.entries {
        let children: Micros = tree.children(*id).iter().map(|child| in_range(*child)).sum();
        let self_time = in_range(*id).saturating_sub(children);
        if self_time > 0 {
            *stats
                .by_category
                .entry(EventCategory::for_event(trace.event(*id)))
                .or_default() += self_time;
        }
    }
    let idle = (end - start).saturating_sub(busy);
    if idle > 0 {
        *stats.by_category.entry(EventCategory::Idle).or_default() += idle;
    }
    stats
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeUpdate {
    /// Continuous updates such as dragging a selection.
    Pointer,
    /// One-off selections such as clicking an entry.
    Discrete,
}

/// Holds back pointer driven range changes until they settle.
#[derive(Debug)]
pub struct RangeDebouncer {
    delay: Duration,
    pending: Option<((Micros, Micros), Instant)>,
    applied: Option<(Micros, Micros)>,
}

impl RangeDebouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
            applied: None,
        }
    }

    /// Records a range change. Returns the range to apply right away, if any.
    pub fn submit(&mut self, range: (Micros, Micros), update: RangeUpdate, now: Instant) -> Option<(Micros, Micros)> {
        match update {
            RangeUpdate::Discrete => {
                self.pending = None;
                self.applied = Some(range);
                Some(range)
            }
            RangeUpdate::Pointer => {
                self.pending = Some((range, now + self.delay));
                None
            }
        }
    }

    /// Applies the pending range once its delay has passed.
    pub fn poll(&mut self, now: Instant) -> Option<(Micros, Micros)> {
        let (range, due) = self.pending?;
        if now < due {
            return None;
        }
        self.pending = None;
        self.applied = Some(range);
        Some(range)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.map(|(_, due)| due)
    }

    pub fn applied(&self) -> Option<(Micros, Micros)> {
        self.applied
    }
}
