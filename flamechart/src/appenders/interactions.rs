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

use super::{track_group, AppenderContext, HighlightedEntryInfo, TrackIndex};
use crate::compat::TrackBuilder;
use crate::time::{format_ms, micros_to_ms};
use crate::timeline_data::{Decoration, Whiskers};
use crate::trace::{EventKind, TraceEvent};

/// User interactions. Each box covers the processing span; whiskers reach out
/// to the raw input and presentation times.
#[derive(Debug, Clone, Default)]
pub struct InteractionsAppender;

impl InteractionsAppender {
    pub fn append_track_at_level(
        &self,
        builder: &mut TrackBuilder<'_>,
        track: TrackIndex,
        start_level: usize,
        expanded: bool,
    ) -> usize {
        let trace = builder.trace();
        let filter = builder.filter();
        let events: Vec<_> = trace
            .interactions
            .no_nesting
            .iter()
            .copied()
            .filter(|id| filter.is_visible(*id))
            .collect();
        if events.is_empty() {
            return start_level;
        }
        let threshold_ms = builder.layout().long_interaction_threshold_ms;

        builder.register_track_for_group(track_group("Interactions", start_level, expanded, track), track);
        builder.append_events_at_level(&events, start_level, track, |builder, event, index| {
            let EventKind::Interaction(interaction) = &event.kind else {
                return;
            };
            let trace = builder.trace();
            let whiskers = Whiskers {
                raw_start: trace.to_ms(event.ts),
                processing_start: trace.to_ms(interaction.processing_start),
                processing_end: trace.to_ms(interaction.processing_end),
                raw_end: trace.to_ms(event.end()),
            };
            let data = builder.data_mut();
            data.set_entry_times(
                index,
                whiskers.processing_start,
                whiskers.processing_end - whiskers.processing_start,
            );
            data.add_decoration(index, Decoration::Whiskers(whiskers));
            if micros_to_ms(event.duration()) > threshold_ms {
                data.add_decoration(
                    index,
                    Decoration::CandyStripe {
                        start_ms: whiskers.raw_start + threshold_ms,
                    },
                );
                data.add_decoration(
                    index,
                    Decoration::WarningTriangle {
                        custom_end_ms: Some(whiskers.raw_end),
                    },
                );
            }
        })
    }

    pub fn color_for_event(&self, event: &TraceEvent, context: AppenderContext<'_>) -> String {
        match &event.kind {
            EventKind::Interaction(interaction) => context.palette.timings.color_for_id(&interaction.interaction_type),
            _ => context.palette.timings.color_for_id(&event.name),
        }
    }

    pub fn title_for_event(&self, event: &TraceEvent) -> String {
        match &event.kind {
            EventKind::Interaction(interaction) if !interaction.interaction_type.is_empty() => {
                interaction.interaction_type.clone()
            }
            _ => "Interaction".to_string(),
        }
    }

    pub fn highlighted_entry_info(
        &self,
        event: &TraceEvent,
        title: String,
        context: AppenderContext<'_>,
    ) -> HighlightedEntryInfo {
        let duration_ms = micros_to_ms(event.duration());
        let threshold_ms = context.layout.long_interaction_threshold_ms;
        let mut warnings = Vec::new();
        if duration_ms > threshold_ms {
            warnings.push(format!(
                "Long interaction is indicating poor page responsiveness ({} over {})",
                format_ms(duration_ms),
                format_ms(threshold_ms)
            ));
        }
        HighlightedEntryInfo {
            title,
            formatted_time: format_ms(duration_ms),
            warnings,
        }
    }
}
