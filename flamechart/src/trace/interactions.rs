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

use super::{EventId, Micros};
use std::cmp::Reverse;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Span {
    pub id: EventId,
    pub start: Micros,
    pub end: Micros,
}

impl Span {
    fn duration(&self) -> Micros {
        self.end - self.start
    }
}

/// Keeps the outermost interaction of every nested group.
///
/// Ties are broken by start ascending, then duration descending, then id
/// ascending, so the result does not depend on input order.
pub(super) fn remove_nested(spans: &[Span]) -> Vec<EventId> {
    let mut sorted = spans.to_vec();
    sorted.sort_by_key(|span| (span.start, Reverse(span.duration()), span.id));

    let mut kept = Vec::new();
    let mut furthest_end: Option<Micros> = None;
    for span in sorted {
        if furthest_end.is_some_and(|end| span.end <= end) {
            continue;
        }
        furthest_end = Some(furthest_end.map_or(span.end, |end| end.max(span.end)));
        kept.push(span.id);
    }
    kept
}

/// Longest interaction; earliest start and then lowest id win ties.
pub(super) fn longest(spans: &[Span]) -> Option<EventId> {
    spans
        .iter()
        .min_by_key(|span| (Reverse(span.duration()), span.start, span.id))
        .map(|span| span.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn span(id: u32, start: Micros, end: Micros) -> Span {
        Span {
            id: EventId(id),
            start,
            end,
        }
    }

    #[rstest]
    fn test_nested_interactions_are_dropped() {
        let spans = [span(0, 0, 100), span(1, 10, 50), span(2, 120, 200)];
        assert_eq!(remove_nested(&spans), vec![EventId(0), EventId(2)]);
    }

    #[rstest]
    fn test_identical_spans_keep_lowest_id() {
        let spans = [span(5, 0, 100), span(3, 0, 100)];
        assert_eq!(remove_nested(&spans), vec![EventId(3)]);
        assert_eq!(longest(&spans), Some(EventId(3)));
    }

    #[rstest]
    fn test_same_start_keeps_longer() {
        let spans = [span(0, 0, 50), span(1, 0, 80)];
        assert_eq!(remove_nested(&spans), vec![EventId(1)]);
    }

    #[rstest]
    fn test_partial_overlap_keeps_both() {
        let spans = [span(0, 0, 50), span(1, 40, 90)];
        assert_eq!(remove_nested(&spans), vec![EventId(0), EventId(1)]);
    }

    #[rstest]
    fn test_longest_prefers_earlier_start() {
        let spans = [span(0, 100, 200), span(1, 0, 100)];
        assert_eq!(longest(&spans), Some(EventId(1)));
        assert_eq!(longest(&[]), None);
    }
}
