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

//! Call trees over the events of one track.
//!
//! Events are nested by containment, then calls with the same signature
//! under the same path are merged into one node.

use crate::entries_filter::EntryTree;
use crate::trace::{EventId, Micros, TraceData};
use std::cmp::Reverse;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct CallTreeNode {
    /// Merge key; see [`crate::trace::TraceEvent::signature`].
    pub signature: String,
    pub name: String,
    pub self_time: Micros,
    pub total_time: Micros,
    pub events: Vec<EventId>,
    pub children: Vec<CallTreeNode>,
}

impl CallTreeNode {
    fn new(signature: String, name: String) -> Self {
        Self {
            signature,
            name,
            self_time: 0,
            total_time: 0,
            events: Vec::new(),
            children: Vec::new(),
        }
    }

    fn child(&mut self, signature: String, name: impl FnOnce() -> String) -> &mut CallTreeNode {
        child_in(&mut self.children, signature, name)
    }

    pub fn find(&self, signature: &str) -> Option<&CallTreeNode> {
        self.children.iter().find(|child| child.signature == signature)
    }
}

fn child_in(nodes: &mut Vec<CallTreeNode>, signature: String, name: impl FnOnce() -> String) -> &mut CallTreeNode {
    let position = match nodes.iter().position(|node| node.signature == signature) {
        Some(position) => position,
        None => {
            nodes.push(CallTreeNode::new(signature, name()));
            nodes.len() - 1
        }
    };
    &mut nodes[position]
}

/// Containment tree plus per event self time.
struct Nesting {
    tree: EntryTree,
    self_time: HashMap<EventId, Micros>,
}

impl Nesting {
    fn new(trace: &TraceData, events: &[EventId]) -> Self {
        let mut sorted: Vec<EventId> = events.to_vec();
        sorted.sort_by_key(|id| {
            let event = trace.event(*id);
            (event.ts, Reverse(event.duration()), *id)
        });
        let mut tree = EntryTree::default();
        tree.insert_sorted(sorted.iter().map(|id| trace.event(*id)));
        let self_time = sorted
            .iter()
            .map(|id| {
                let children: Micros = tree
                    .children(*id)
                    .iter()
                    .map(|child| trace.event(*child).duration())
                    .sum();
                (*id, trace.event(*id).duration().saturating_sub(children))
            })
            .collect();
        Self { tree, self_time }
    }
}

/// Callers at the root, callees below. Disjoint events give several roots.
pub fn top_down(trace: &TraceData, events: &[EventId]) -> Vec<CallTreeNode> {
    let nesting = Nesting::new(trace, events);
    let mut roots = Vec::new();
    for root in nesting.tree.roots() {
        add_top_down(trace, &nesting, &mut roots, *root);
    }
    roots
}

fn add_top_down(trace: &TraceData, nesting: &Nesting, nodes: &mut Vec<CallTreeNode>, id: EventId) {
    let event = trace.event(id);
    let node = child_in(nodes, event.signature(), || event.display_name());
    node.self_time += nesting.self_time.get(&id).copied().unwrap_or(0);
    node.total_time += event.duration();
    node.events.push(id);
    for child in nesting.tree.children(id) {
        add_top_down(trace, nesting, &mut node.children, *child);
    }
}

/// Functions at the root, their callers below.
///
/// A root's self time is the time spent in that function itself; each caller
/// path below it carries the share of that self time reached through it.
/// Recursive re-entries add self time but not total time.
pub fn bottom_up(trace: &TraceData, events: &[EventId]) -> Vec<CallTreeNode> {
    let nesting = Nesting::new(trace, events);
    let mut roots: Vec<CallTreeNode> = Vec::new();
    let mut order: Vec<EventId> = nesting.self_time.keys().copied().collect();
    order.sort_by_key(|id| (trace.event(*id).ts, *id));

    for id in order {
        let event = trace.event(id);
        let self_time = nesting.self_time.get(&id).copied().unwrap_or(0);
        let signature = event.signature();

        let mut callers = Vec::new();
        let mut parent = nesting.tree.parent(id);
        while let Some(caller) = parent {
            callers.push(caller);
            parent = nesting.tree.parent(caller);
        }
        let reentered = callers
            .iter()
            .any(|caller| trace.event(*caller).signature() == signature);

        let mut node = child_in(&mut roots, signature, || event.display_name());
        node.self_time += self_time;
        if !reentered {
            node.total_time += event.duration();
        }
        node.events.push(id);
        for caller in callers {
            let caller_event = trace.event(caller);
            node = node.child(caller_event.signature(), || caller_event.display_name());
            node.self_time += self_time;
            if !reentered {
                node.total_time += event.duration();
            }
            node.events.push(caller);
        }
    }
    roots.sort_by_key(|node| Reverse(node.self_time));
    roots
}
