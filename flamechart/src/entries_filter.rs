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

//! User driven hiding of flame chart entries.
//!
//! Entries of every thread are arranged into trees by temporal containment.
//! Actions hide parts of those trees; an entry with hidden descendants is
//! "expandable" and can be reset to show them again.

use crate::trace::{EventId, TraceData, TraceEvent};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterAction {
    /// Hide the entry; its children take its place under its parent.
    MergeFunction,
    /// Hide every descendant.
    CollapseFunction,
    /// Hide descendants that directly repeat their parent's function.
    CollapseRepeatingDescendants,
    /// Show every descendant again.
    ResetChildren,
    UndoAllActions,
}

/// Which actions would change anything for an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PossibleFilterActions {
    pub merge_function: bool,
    pub collapse_function: bool,
    pub collapse_repeating_descendants: bool,
    pub reset_children: bool,
    pub undo_all_actions: bool,
}

impl PossibleFilterActions {
    pub fn allows(&self, action: FilterAction) -> bool {
        match action {
            FilterAction::MergeFunction => self.merge_function,
            FilterAction::CollapseFunction => self.collapse_function,
            FilterAction::CollapseRepeatingDescendants => self.collapse_repeating_descendants,
            FilterAction::ResetChildren => self.reset_children,
            FilterAction::UndoAllActions => self.undo_all_actions,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedAction {
    pub action: FilterAction,
    pub entry: EventId,
}

/// Parent and child links between the entries of all threads.
#[derive(Debug, Default)]
pub struct EntryTree {
    parent: HashMap<EventId, EventId>,
    children: HashMap<EventId, Vec<EventId>>,
    roots: Vec<EventId>,
}

impl EntryTree {
    /// `entries` must be sorted by start with ancestors first.
    pub fn insert_sorted<'a>(&mut self, entries: impl IntoIterator<Item = &'a TraceEvent>) {
        let mut stack: Vec<&TraceEvent> = Vec::new();
        for event in entries {
            while let Some(top) = stack.last() {
                if top.end() > event.ts && top.end() >= event.end() {
                    break;
                }
                stack.pop();
            }
            match stack.last() {
                Some(parent) => {
                    self.parent.insert(event.id, parent.id);
                    self.children.entry(parent.id).or_default().push(event.id);
                }
                None => self.roots.push(event.id),
            }
            stack.push(event);
        }
    }

    pub fn from_trace(trace: &TraceData) -> Self {
        let mut tree = Self::default();
        for thread in &trace.threads {
            tree.insert_sorted(thread.entries.iter().map(|id| trace.event(*id)));
        }
        tree
    }

    pub fn parent(&self, id: EventId) -> Option<EventId> {
        self.parent.get(&id).copied()
    }

    pub fn children(&self, id: EventId) -> &[EventId] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn roots(&self) -> &[EventId] {
        &self.roots
    }

    pub fn contains(&self, id: EventId) -> bool {
        self.parent.contains_key(&id) || self.children.contains_key(&id) || self.roots.contains(&id)
    }

    pub fn descendants(&self, id: EventId) -> Vec<EventId> {
        let mut result = Vec::new();
        let mut pending: Vec<EventId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = pending.pop() {
            result.push(next);
            pending.extend(self.children(next).iter().rev().copied());
        }
        result
    }
}

pub struct EntriesFilter {
    trace: Arc<TraceData>,
    tree: EntryTree,
    members: HashSet<EventId>,
    invisible: HashSet<EventId>,
    expandable: HashSet<EventId>,
    applied: Vec<AppliedAction>,
}

impl EntriesFilter {
    pub fn new(trace: Arc<TraceData>) -> Self {
        let tree = EntryTree::from_trace(&trace);
        let members = trace
            .threads
            .iter()
            .flat_map(|thread| thread.entries.iter().copied())
            .collect();
        Self {
            trace,
            tree,
            members,
            invisible: HashSet::new(),
            expandable: HashSet::new(),
            applied: Vec::new(),
        }
    }

    pub fn tree(&self) -> &EntryTree {
        &self.tree
    }

    pub fn is_visible(&self, id: EventId) -> bool {
        !self.invisible.contains(&id)
    }

    pub fn is_expandable(&self, id: EventId) -> bool {
        self.expandable.contains(&id)
    }

    pub fn invisible_entries(&self) -> impl Iterator<Item = EventId> + '_ {
        self.invisible.iter().copied()
    }

    /// Actions applied since the last undo, in order.
    pub fn applied_actions(&self) -> &[AppliedAction] {
        &self.applied
    }

    /// Closest visible ancestor of an entry, or the entry itself when visible.
    pub fn first_visible_parent(&self, id: EventId) -> Option<EventId> {
        let mut current = Some(id);
        while let Some(candidate) = current {
            if self.is_visible(candidate) {
                return Some(candidate);
            }
            current = self.tree.parent(candidate);
        }
        None
    }

    fn repeating_descendants(&self, id: EventId) -> Vec<EventId> {
        self.tree
            .descendants(id)
            .into_iter()
            .filter(|descendant| {
                self.tree.parent(*descendant).is_some_and(|parent| {
                    self.trace.event(parent).signature() == self.trace.event(*descendant).signature()
                })
            })
            .collect()
    }

    pub fn find_possible_actions(&self, id: EventId) -> PossibleFilterActions {
        let undo_all_actions = !self.invisible.is_empty();
        if !self.members.contains(&id) {
            return PossibleFilterActions {
                undo_all_actions,
                ..PossibleFilterActions::default()
            };
        }
        let descendants = self.tree.descendants(id);
        PossibleFilterActions {
            merge_function: self.is_visible(id),
            collapse_function: descendants.iter().any(|d| self.is_visible(*d)),
            collapse_repeating_descendants: self
                .repeating_descendants(id)
                .iter()
                .any(|d| self.is_visible(*d)),
            reset_children: self.is_expandable(id),
            undo_all_actions,
        }
    }

    /// Applies an action and reports whether visibility changed.
    pub fn apply_action(&mut self, action: FilterAction, id: EventId) -> bool {
        if action == FilterAction::UndoAllActions {
            let changed = !self.invisible.is_empty();
            self.invisible.clear();
            self.expandable.clear();
            self.applied.clear();
            return changed;
        }
        if !self.members.contains(&id) {
            return false;
        }

        let changed = match action {
            FilterAction::MergeFunction => self.invisible.insert(id),
            FilterAction::CollapseFunction => self.hide(self.tree.descendants(id)),
            FilterAction::CollapseRepeatingDescendants => self.hide(self.repeating_descendants(id)),
            FilterAction::ResetChildren => {
                let mut changed = false;
                for descendant in self.tree.descendants(id) {
                    changed |= self.invisible.remove(&descendant);
                }
                changed
            }
            FilterAction::UndoAllActions => false,
        };
        if changed {
            self.applied.push(AppliedAction { action, entry: id });
            self.update_expandable();
        }
        changed
    }

    /// Makes a hidden entry visible again along with its hidden ancestors.
    pub fn reveal_entry(&mut self, id: EventId) -> bool {
        let mut changed = false;
        let mut current = Some(id);
        while let Some(entry) = current {
            changed |= self.invisible.remove(&entry);
            current = self.tree.parent(entry);
        }
        if changed {
            self.update_expandable();
        }
        changed
    }

    /// Replaces the hidden set wholesale, e.g. with one restored from disk.
    /// Entries outside the filtered threads are ignored.
    pub fn restore_hidden(&mut self, entries: impl IntoIterator<Item = EventId>) {
        self.invisible = entries.into_iter().filter(|id| self.members.contains(id)).collect();
        self.applied.clear();
        self.update_expandable();
    }

    fn hide(&mut self, entries: Vec<EventId>) -> bool {
        let mut changed = false;
        for entry in entries {
            changed |= self.invisible.insert(entry);
        }
        changed
    }

    fn update_expandable(&mut self) {
        let expandable: HashSet<EventId> = self
            .invisible
            .iter()
            .filter_map(|hidden| self.tree.parent(*hidden))
            .filter_map(|parent| self.first_visible_parent(parent))
            .collect();
        self.expandable = expandable;
    }
}
