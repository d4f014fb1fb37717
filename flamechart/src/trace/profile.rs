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

//! Expansion of sampled CPU profiles into nested calls.

use super::network::raw_ts;
use super::{Micros, ThreadKey};
use chrome_trace_format::{CpuProfile, ProfileNode, RawTraceEvent};
use serde_json::Value;
use std::collections::HashMap;

/// One reconstructed call: `node_id` was on the stack from the sample at
/// `sample_index` until `end`.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct CallSpan {
    pub node_id: u32,
    pub sample_index: usize,
    pub start: Micros,
    pub end: Micros,
}

fn is_ignored_frame(node: &ProfileNode) -> bool {
    matches!(
        node.call_frame.function_name.as_str(),
        "(root)" | "(program)" | "(idle)"
    )
}

struct StackResolver<'a> {
    nodes: HashMap<u32, &'a ProfileNode>,
    parents: HashMap<u32, u32>,
    stacks: HashMap<u32, Vec<u32>>,
}

impl<'a> StackResolver<'a> {
    fn new(profile: &'a CpuProfile) -> Self {
        let mut nodes = HashMap::with_capacity(profile.nodes.len());
        let mut parents = HashMap::new();
        for node in &profile.nodes {
            nodes.insert(node.id, node);
            if let Some(parent) = node.parent {
                parents.insert(node.id, parent);
            }
            for child in &node.children {
                parents.insert(*child, node.id);
            }
        }
        Self {
            nodes,
            parents,
            stacks: HashMap::new(),
        }
    }

    /// Root-first node ids for a sampled leaf, without synthetic frames.
    fn stack(&mut self, leaf: u32) -> &[u32] {
        if !self.stacks.contains_key(&leaf) {
            let mut stack = Vec::new();
            let mut current = Some(leaf);
            while let Some(id) = current {
                // Guard against cyclic parent links in malformed input.
                if stack.len() > self.nodes.len() {
                    break;
                }
                if let Some(node) = self.nodes.get(&id) {
                    if !is_ignored_frame(node) {
                        stack.push(id);
                    }
                }
                current = self.parents.get(&id).copied();
            }
            stack.reverse();
            self.stacks.insert(leaf, stack);
        }
        self.stacks.get(&leaf).map(Vec::as_slice).unwrap_or(&[])
    }
}

pub(super) fn expand_profile(profile: &CpuProfile) -> Vec<CallSpan> {
    let mut resolver = StackResolver::new(profile);
    let mut spans = Vec::new();
    let mut open: Vec<CallSpan> = Vec::new();
    let mut time = profile.start_time;
    let mut last_ts = raw_ts(time);

    for (sample_index, &leaf) in profile.samples.iter().enumerate() {
        time += profile.time_deltas.get(sample_index).copied().unwrap_or(0.0);
        let ts = raw_ts(time).max(last_ts);
        last_ts = ts;

        let stack = resolver.stack(leaf);
        let common = open
            .iter()
            .zip(stack)
            .take_while(|(call, id)| call.node_id == **id)
            .count();
        while open.len() > common {
            if let Some(mut call) = open.pop() {
                call.end = ts;
                spans.push(call);
            }
        }
        for &node_id in &stack[common..] {
            open.push(CallSpan {
                node_id,
                sample_index,
                start: ts,
                end: ts,
            });
        }
    }

    let end = raw_ts(profile.end_time).max(last_ts);
    while let Some(mut call) = open.pop() {
        call.end = end;
        spans.push(call);
    }
    spans
}

/// Reassembles profiles streamed as `Profile` and `ProfileChunk` events.
#[derive(Debug, Default)]
pub(super) struct ProfileCollector {
    profiles: Vec<(ThreadKey, String, CpuProfile)>,
}

impl ProfileCollector {
    pub(super) fn is_profile_event(raw: &RawTraceEvent) -> bool {
        matches!(raw.name.as_str(), "Profile" | "ProfileChunk")
    }

    fn profile_mut(&mut self, pid: u32, id: &str) -> Option<&mut CpuProfile> {
        self.profiles
            .iter_mut()
            .find(|(key, profile_id, _)| key.pid == pid && profile_id == id)
            .map(|(_, _, profile)| profile)
    }

    pub(super) fn observe(&mut self, raw: &RawTraceEvent) {
        let Some(id) = raw.async_id() else {
            return;
        };
        let data = raw.data();
        let time_of = |key: &str| data.and_then(|data| data.get(key)).and_then(Value::as_f64);

        if raw.name == "Profile" {
            if self.profile_mut(raw.pid, &id).is_none() {
                let start_time = time_of("startTime").unwrap_or(raw.ts);
                self.profiles.push((
                    ThreadKey {
                        pid: raw.pid,
                        tid: raw.tid,
                    },
                    id,
                    CpuProfile {
                        start_time,
                        end_time: start_time,
                        ..CpuProfile::default()
                    },
                ));
            }
            return;
        }

        let Some(profile) = self.profile_mut(raw.pid, &id) else {
            tracing::debug!(profile = %id, "ProfileChunk without a Profile event");
            return;
        };
        if let Some(cpu_profile) = data.and_then(|data| data.get("cpuProfile")) {
            if let Some(nodes) = cpu_profile.get("nodes") {
                match serde_json::from_value::<Vec<ProfileNode>>(nodes.clone()) {
                    Ok(nodes) => profile.nodes.extend(nodes),
                    Err(err) => tracing::warn!(%err, "skipping malformed profile nodes"),
                }
            }
            if let Some(samples) = cpu_profile.get("samples").and_then(Value::as_array) {
                profile
                    .samples
                    .extend(samples.iter().filter_map(Value::as_u64).map(|id| id as u32));
            }
        }
        if let Some(deltas) = data
            .and_then(|data| data.get("timeDeltas"))
            .and_then(Value::as_array)
        {
            profile
                .time_deltas
                .extend(deltas.iter().filter_map(Value::as_f64));
        }
        if let Some(end_time) = time_of("endTime") {
            profile.end_time = end_time;
        }
    }

    pub(super) fn finish(self) -> Vec<(ThreadKey, CpuProfile)> {
        self.profiles
            .into_iter()
            .map(|(key, _, profile)| (key, profile))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use rstest::rstest;

    fn profile(samples: Vec<u32>, deltas: Vec<f64>, end_time: f64) -> CpuProfile {
        let nodes = json!([
            {"id": 1, "callFrame": {"functionName": "(root)"}, "children": [2, 5]},
            {"id": 2, "callFrame": {"functionName": "main", "url": "app.js"}, "children": [3, 4]},
            {"id": 3, "callFrame": {"functionName": "a", "url": "app.js"}},
            {"id": 4, "callFrame": {"functionName": "b", "url": "app.js"}},
            {"id": 5, "callFrame": {"functionName": "(idle)"}}
        ]);
        CpuProfile {
            nodes: serde_json::from_value(nodes).unwrap(),
            samples,
            time_deltas: deltas,
            start_time: 1000.0,
            end_time,
        }
    }

    #[rstest]
    fn test_consecutive_samples_extend_calls() {
        // main>a, main>a, main>b, idle
        let spans = expand_profile(&profile(vec![3, 3, 4, 5], vec![0.0, 10.0, 10.0, 10.0], 1030.0));
        let find = |node_id: u32| spans.iter().find(|span| span.node_id == node_id).unwrap();

        assert_eq!(spans.len(), 3);
        let main = find(2);
        assert_eq!((main.start, main.end, main.sample_index), (1000, 1030, 0));
        let a = find(3);
        assert_eq!((a.start, a.end), (1000, 1020));
        let b = find(4);
        assert_eq!((b.start, b.end, b.sample_index), (1020, 1030, 2));
    }

    #[rstest]
    fn test_open_calls_end_at_profile_end() {
        let spans = expand_profile(&profile(vec![3, 3], vec![0.0, 10.0], 1050.0));
        assert!(spans.iter().all(|span| span.end == 1050));
    }

    #[rstest]
    fn test_chunks_are_reassembled() {
        let mut collector = ProfileCollector::default();
        let profile_event: RawTraceEvent = serde_json::from_value(json!({
            "name": "Profile", "ph": "P", "id": "0x1", "pid": 1, "tid": 7, "ts": 500,
            "args": {"data": {"startTime": 500}}
        }))
        .unwrap();
        let chunk: RawTraceEvent = serde_json::from_value(json!({
            "name": "ProfileChunk", "ph": "P", "id": "0x1", "pid": 1, "tid": 9, "ts": 600,
            "args": {"data": {
                "cpuProfile": {
                    "nodes": [{"id": 1, "callFrame": {"functionName": "(root)"}},
                              {"id": 2, "callFrame": {"functionName": "f"}, "parent": 1}],
                    "samples": [2, 2]
                },
                "timeDeltas": [5, 5]
            }}
        }))
        .unwrap();
        assert!(ProfileCollector::is_profile_event(&profile_event));
        collector.observe(&profile_event);
        collector.observe(&chunk);

        let profiles = collector.finish();
        assert_eq!(profiles.len(), 1);
        let (thread, profile) = &profiles[0];
        assert_eq!(thread.tid, 7);
        assert_eq!(profile.nodes.len(), 2);
        assert_eq!(profile.samples, vec![2, 2]);
        assert_eq!(profile.time_deltas, vec![5.0, 5.0]);
    }
}
