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

use super::Micros;
use std::ops::Range;

/// A gap of this length between shifts starts a new cluster.
pub const CLUSTER_GAP: Micros = 1_000_000;
/// Clusters never span more than this.
pub const CLUSTER_MAX_DURATION: Micros = 5_000_000;

#[derive(Debug, Clone, PartialEq)]
pub(super) struct ShiftWindow {
    /// Positions in the sorted input.
    pub members: Range<usize>,
    pub start: Micros,
    pub end: Micros,
}

/// Groups sorted shift timestamps into session windows. A window ends one gap
/// after its last shift, capped at the maximum duration and at `trace_end`,
/// but always covers its last shift.
pub(super) fn cluster_shifts(timestamps: &[Micros], trace_end: Micros) -> Vec<ShiftWindow> {
    let mut windows: Vec<ShiftWindow> = Vec::new();
    let mut last_ts = 0;

    for (position, &ts) in timestamps.iter().enumerate() {
        let extends_current = windows.last().is_some_and(|window| {
            ts - last_ts < CLUSTER_GAP && ts - window.start <= CLUSTER_MAX_DURATION
        });
        if extends_current {
            if let Some(window) = windows.last_mut() {
                window.members.end = position + 1;
            }
        } else {
            windows.push(ShiftWindow {
                members: position..position + 1,
                start: ts,
                end: ts,
            });
        }
        last_ts = ts;
    }

    for window in &mut windows {
        let last_shift = timestamps[window.members.end - 1];
        let end = (last_shift + CLUSTER_GAP).min(window.start + CLUSTER_MAX_DURATION);
        window.end = end.min(trace_end.max(last_shift + 1));
    }
    windows
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_gap_of_one_second_splits() {
        let windows = cluster_shifts(&[0, 500_000, 1_500_000], 10_000_000);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].members, 0..2);
        assert_eq!(windows[0].end, 1_500_000);
        assert_eq!(windows[1].members, 2..3);
    }

    #[rstest]
    fn test_cluster_is_capped_at_five_seconds() {
        let timestamps: Vec<Micros> = (0..12).map(|i| i * 600_000).collect();
        let windows = cluster_shifts(&timestamps, 100_000_000);
        assert_eq!(windows[0].members, 0..9);
        assert_eq!(windows[0].end, 5_000_000);
        assert_eq!(windows[1].start, 5_400_000);
    }

    #[rstest]
    fn test_window_end_clamped_to_trace_end() {
        let windows = cluster_shifts(&[100], 400);
        assert_eq!(windows[0].end, 400);
    }

    #[rstest]
    fn test_no_shifts() {
        assert!(cluster_shifts(&[], 0).is_empty());
    }
}
