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

use super::{FrameState, Micros, TimelineFrame};
use chrome_trace_format::RawTraceEvent;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum FrameSignal {
    Begin,
    Draw { partial: bool },
    Dropped,
}

impl FrameSignal {
    pub(super) fn from_raw(raw: &RawTraceEvent) -> Option<Self> {
        match raw.name.as_str() {
            "BeginFrame" => Some(FrameSignal::Begin),
            "DrawFrame" => {
                let partial = raw
                    .args
                    .get("hasPartialUpdate")
                    .or_else(|| raw.data().and_then(|data| data.get("hasPartialUpdate")))
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                Some(FrameSignal::Draw { partial })
            }
            "DroppedFrame" => Some(FrameSignal::Dropped),
            _ => None,
        }
    }
}

/// Turns frame signals sorted by time into contiguous frames. Each frame
/// lasts until the next `BeginFrame`; the last one until `trace_end`.
pub(super) fn build_frames(signals: &[(Micros, FrameSignal)], trace_end: Micros) -> Vec<TimelineFrame> {
    let mut frames: Vec<TimelineFrame> = Vec::new();
    let mut current: Option<(Micros, FrameState)> = None;

    for &(ts, signal) in signals {
        match signal {
            FrameSignal::Begin => {
                if let Some((start, state)) = current.take() {
                    push_frame(&mut frames, start, ts, state);
                }
                current = Some((ts, FrameState::Idle));
            }
            FrameSignal::Draw { partial } => {
                if let Some((_, state)) = current.as_mut() {
                    if *state != FrameState::Dropped {
                        *state = if partial {
                            FrameState::Partial
                        } else {
                            FrameState::Presented
                        };
                    }
                }
            }
            FrameSignal::Dropped => {
                if let Some((_, state)) = current.as_mut() {
                    *state = FrameState::Dropped;
                }
            }
        }
    }
    if let Some((start, state)) = current {
        push_frame(&mut frames, start, trace_end.max(start), state);
    }
    frames
}

fn push_frame(frames: &mut Vec<TimelineFrame>, start: Micros, end: Micros, state: FrameState) {
    frames.push(TimelineFrame {
        index: frames.len(),
        start,
        end,
        state,
    });
}
