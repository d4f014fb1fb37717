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

//! Durable identity for flame chart entries.
//!
//! Entry indices change on every rebuild. Keys name an entry by where it came
//! from in the loaded file, so they survive rebuilds and reloads of the same
//! trace:
//!
//! | key                         | entry                                    |
//! |-----------------------------|------------------------------------------|
//! | `p-{pid}-{tid}-{sample}-{node}` | profile call                         |
//! | `l-{frame}`                 | frame                                    |
//! | `s-{raw}`                   | event synthesised from raw event `raw`   |
//! | `r-{raw}`                   | raw event `raw`                          |

use crate::error::{Error, Result};
use crate::timeline_data::EntryData;
use crate::trace::{EventId, EventKind, EventOrigin, ThreadKey, TraceData};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SerializableKey {
    ProfileCall {
        pid: u32,
        tid: u32,
        sample_index: usize,
        node_id: u32,
    },
    LegacyFrame {
        frame_index: usize,
    },
    Synthetic {
        raw_index: usize,
    },
    Raw {
        raw_index: usize,
    },
}

impl fmt::Display for SerializableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerializableKey::ProfileCall {
                pid,
                tid,
                sample_index,
                node_id,
            } => write!(f, "p-{pid}-{tid}-{sample_index}-{node_id}"),
            SerializableKey::LegacyFrame { frame_index } => write!(f, "l-{frame_index}"),
            SerializableKey::Synthetic { raw_index } => write!(f, "s-{raw_index}"),
            SerializableKey::Raw { raw_index } => write!(f, "r-{raw_index}"),
        }
    }
}

impl FromStr for SerializableKey {
    type Err = Error;

    fn from_str(key: &str) -> Result<Self> {
        let malformed = || Error::MalformedKey(key.to_string());
        let mut parts = key.split('-');
        let kind = parts.next().ok_or_else(malformed)?;
        let numbers: Vec<&str> = parts.collect();
        let number = |index: usize| -> Result<u64> {
            numbers
                .get(index)
                .and_then(|part| part.parse::<u64>().ok())
                .ok_or_else(malformed)
        };

        let parsed = match (kind, numbers.len()) {
            ("p", 4) => SerializableKey::ProfileCall {
                pid: u32::try_from(number(0)?).map_err(|_| malformed())?,
                tid: u32::try_from(number(1)?).map_err(|_| malformed())?,
                sample_index: number(2)? as usize,
                node_id: u32::try_from(number(3)?).map_err(|_| malformed())?,
            },
            ("l", 1) => SerializableKey::LegacyFrame {
                frame_index: number(0)? as usize,
            },
            ("s", 1) => SerializableKey::Synthetic {
                raw_index: number(0)? as usize,
            },
            ("r", 1) => SerializableKey::Raw {
                raw_index: number(0)? as usize,
            },
            _ => return Err(malformed()),
        };
        Ok(parsed)
    }
}

/// Resolves keys back to entries, memoising profile call lookups.
#[derive(Debug, Default)]
pub struct EventsSerializer {
    profile_calls: HashMap<SerializableKey, EventId>,
}

impl EventsSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_for_event(trace: &TraceData, id: EventId) -> Option<SerializableKey> {
        let event = trace.get(id)?;
        match event.origin {
            EventOrigin::ProfileCall { sample_index, node_id } => Some(SerializableKey::ProfileCall {
                pid: event.pid,
                tid: event.tid,
                sample_index,
                node_id,
            }),
            EventOrigin::Synthetic { raw_index } => Some(SerializableKey::Synthetic { raw_index }),
            EventOrigin::Raw { raw_index } => Some(SerializableKey::Raw { raw_index }),
            EventOrigin::Derived => None,
        }
    }

    pub fn key_for_entry(trace: &TraceData, entry: EntryData) -> Option<SerializableKey> {
        match entry {
            EntryData::Event(id) | EntryData::Screenshot(id) => Self::key_for_event(trace, id),
            EntryData::Frame(frame_index) => Some(SerializableKey::LegacyFrame { frame_index }),
        }
    }

    pub fn entry_for_key(&mut self, key: &SerializableKey, trace: &TraceData) -> Result<EntryData> {
        let id = match *key {
            SerializableKey::LegacyFrame { frame_index } => {
                return if frame_index < trace.frames.len() {
                    Ok(EntryData::Frame(frame_index))
                } else {
                    Err(Error::NoEventForKey(key.to_string()))
                };
            }
            SerializableKey::ProfileCall { .. } => self.profile_call_for_key(key, trace)?,
            SerializableKey::Synthetic { raw_index } => trace
                .synthetic_for_raw_index(raw_index)
                .ok_or_else(|| Error::NoEventForKey(key.to_string()))?,
            SerializableKey::Raw { raw_index } => trace
                .event_for_raw_index(raw_index)
                .ok_or_else(|| Error::NoEventForKey(key.to_string()))?,
        };
        Ok(match trace.event(id).kind {
            EventKind::Screenshot => EntryData::Screenshot(id),
            _ => EntryData::Event(id),
        })
    }

    /// Like [`entry_for_key`](Self::entry_for_key) but for keys that name events.
    pub fn event_for_key(&mut self, key: &SerializableKey, trace: &TraceData) -> Result<EventId> {
        match self.entry_for_key(key, trace)? {
            EntryData::Event(id) | EntryData::Screenshot(id) => Ok(id),
            EntryData::Frame(_) => Err(Error::NoEventForKey(key.to_string())),
        }
    }

    fn profile_call_for_key(&mut self, key: &SerializableKey, trace: &TraceData) -> Result<EventId> {
        if let Some(id) = self.profile_calls.get(key) {
            return Ok(*id);
        }
        let SerializableKey::ProfileCall {
            pid,
            tid,
            sample_index,
            node_id,
        } = *key
        else {
            return Err(Error::MalformedKey(key.to_string()));
        };
        let thread = trace
            .thread(ThreadKey { pid, tid })
            .ok_or_else(|| Error::NoProfileCall(key.to_string()))?;
        let id = thread
            .profile_calls
            .iter()
            .copied()
            .find(|id| {
                matches!(
                    trace.event(*id).origin,
                    EventOrigin::ProfileCall { sample_index: s, node_id: n } if s == sample_index && n == node_id
                )
            })
            .ok_or_else(|| Error::NoProfileCall(key.to_string()))?;
        self.profile_calls.insert(*key, id);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use chrome_trace_format::{CpuProfile, Phase, RawTrace, RawTraceEvent};
    use rstest::rstest;

    #[rstest]
    #[case("p-1-2-30-4", SerializableKey::ProfileCall { pid: 1, tid: 2, sample_index: 30, node_id: 4 })]
    #[case("l-7", SerializableKey::LegacyFrame { frame_index: 7 })]
    #[case("s-12", SerializableKey::Synthetic { raw_index: 12 })]
    #[case("r-0", SerializableKey::Raw { raw_index: 0 })]
    fn test_parse_and_display(#[case] text: &str, #[case] key: SerializableKey) {
        assert_eq!(text.parse::<SerializableKey>().unwrap(), key);
        assert_eq!(key.to_string(), text);
    }

    #[rstest]
    #[case("")]
    #[case("x-1")]
    #[case("r-")]
    #[case("r-1-2")]
    #[case("p-1-2-3")]
    #[case("s-abc")]
    fn test_malformed_keys(#[case] text: &str) {
        let err = text.parse::<SerializableKey>().unwrap_err();
        assert!(matches!(err, Error::MalformedKey(ref key) if key == text));
    }

    #[rstest]
    fn test_every_event_round_trips() {
        let begin = RawTraceEvent::builder().name("Layout").ph(Phase::DurationBegin).ts(5.0).pid(PID).tid(MAIN_TID).build();
        let end = RawTraceEvent::builder().name("Layout").ph(Phase::DurationEnd).ts(9.0).pid(PID).tid(MAIN_TID).build();
        let mut events = vec![complete("RunTask", 0.0, 20.0), begin, end, screenshot(3.0)];
        events.extend(network_request("1", "https://a.test/", 1.0, 10.0));
        let trace = trace_from(events);
        let mut serializer = EventsSerializer::new();

        let mut resolved = 0;
        for event in trace.events() {
            let Some(key) = EventsSerializer::key_for_event(&trace, event.id) else {
                continue;
            };
            let reparsed: SerializableKey = key.to_string().parse().unwrap();
            assert_eq!(serializer.event_for_key(&reparsed, &trace).unwrap(), event.id);
            resolved += 1;
        }
        assert_eq!(resolved, trace.events().len());
    }

    #[rstest]
    fn test_profile_call_lookup_is_memoised() {
        let profile: CpuProfile = serde_json::from_value(serde_json::json!({
            "nodes": [
                {"id": 1, "callFrame": {"functionName": "(root)"}, "children": [2]},
                {"id": 2, "callFrame": {"functionName": "f"}, "children": [3]},
                {"id": 3, "callFrame": {"functionName": "g"}}
            ],
            "samples": [2, 3, 3], "timeDeltas": [0, 10, 10], "startTime": 0, "endTime": 40
        }))
        .unwrap();
        let trace = TraceData::build(&RawTrace::from_cpu_profile(profile));
        let mut serializer = EventsSerializer::new();

        let key = SerializableKey::ProfileCall { pid: 1, tid: 1, sample_index: 1, node_id: 3 };
        let id = serializer.event_for_key(&key, &trace).unwrap();
        assert_eq!(trace.event(id).profile_call().unwrap().function_name, "g");
        assert_eq!(serializer.profile_calls.len(), 1);
        assert_eq!(serializer.event_for_key(&key, &trace).unwrap(), id);

        let missing = SerializableKey::ProfileCall { pid: 1, tid: 1, sample_index: 0, node_id: 3 };
        assert!(matches!(serializer.event_for_key(&missing, &trace), Err(Error::NoProfileCall(_))));
    }

    #[rstest]
    fn test_frames_and_unknown_raw_indices() {
        let frame = instant("BeginFrame", "disabled-by-default-devtools.timeline.frame", 0.0);
        let trace = trace_from([frame, complete("RunTask", 0.0, 10.0)]);
        let mut serializer = EventsSerializer::new();

        let key = EventsSerializer::key_for_entry(&trace, EntryData::Frame(0)).unwrap();
        assert_eq!(key.to_string(), "l-0");
        assert_eq!(serializer.entry_for_key(&key, &trace).unwrap(), EntryData::Frame(0));
        let err = serializer
            .entry_for_key(&SerializableKey::LegacyFrame { frame_index: 3 }, &trace)
            .unwrap_err();
        assert_eq!(err.to_string(), "no event matches key l-3");
        assert!(serializer.entry_for_key(&SerializableKey::Raw { raw_index: 99 }, &trace).is_err());
    }
}
