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

//! User modifications to a loaded trace: hidden entries and annotations.
//!
//! Everything refers to events by [`EventId`] while loaded and by
//! [`SerializableKey`] on disk, so the state can be restored after the trace
//! is loaded again.

use crate::entries_filter::{EntriesFilter, FilterAction};
use crate::error::{Error, Result};
use crate::serializer::{EventsSerializer, SerializableKey};
use crate::timeline_data::EntryData;
use crate::trace::{EventId, Micros, TraceData};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum Annotation {
    EntryLabel { entry: EventId, label: String },
    TimeRange { start: Micros, end: Micros, label: String },
    /// `to` is unset while the user is still picking the target.
    EntriesLink { from: EventId, to: Option<EventId> },
}

/// What changed, delivered to observers after the change is applied.
#[derive(Debug, Clone, PartialEq)]
pub enum ModificationEvent {
    FilterChanged(FilterAction),
    AnnotationAdded(usize),
    AnnotationRemoved(Annotation),
    AnnotationUpdated(usize),
    Restored,
}

type Observer = Box<dyn FnMut(&ModificationEvent)>;

pub struct ModificationsManager {
    trace: Arc<TraceData>,
    filter: EntriesFilter,
    annotations: Vec<Annotation>,
    observers: Vec<Observer>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedModifications {
    #[serde(default)]
    pub entries_modifications: PersistedEntries,
    #[serde(default)]
    pub annotations: Vec<PersistedAnnotation>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedEntries {
    pub hidden_entries: Vec<String>,
    pub expandable_entries: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PersistedAnnotation {
    EntryLabel {
        entry: String,
        label: String,
    },
    TimeRange {
        start: Micros,
        end: Micros,
        label: String,
    },
    EntriesLink {
        #[serde(rename = "entryFrom")]
        from: String,
        #[serde(rename = "entryTo", default, skip_serializing_if = "Option::is_none")]
        to: Option<String>,
    },
}

fn key_of(trace: &TraceData, id: EventId) -> Option<String> {
    EventsSerializer::key_for_event(trace, id).map(|key| key.to_string())
}

fn event_of(serializer: &mut EventsSerializer, trace: &TraceData, key: &str) -> Result<EventId> {
    let key: SerializableKey = key.parse()?;
    match serializer.entry_for_key(&key, trace)? {
        EntryData::Event(id) | EntryData::Screenshot(id) => Ok(id),
        EntryData::Frame(_) => Err(Error::NoEventForKey(key.to_string())),
    }
}

impl ModificationsManager {
    pub fn new(trace: Arc<TraceData>) -> Self {
        Self {
            filter: EntriesFilter::new(trace.clone()),
            trace,
            annotations: Vec::new(),
            observers: Vec::new(),
        }
    }

    pub fn entries_filter(&self) -> &EntriesFilter {
        &self.filter
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn add_observer(&mut self, observer: impl FnMut(&ModificationEvent) + 'static) {
        self.observers.push(Box::new(observer));
    }

    fn notify(&mut self, event: ModificationEvent) {
        for observer in &mut self.observers {
            observer(&event);
        }
    }

    /// Applies a tree action. Observers hear about it only when visibility
    /// actually changed.
    pub fn apply_filter_action(&mut self, action: FilterAction, id: EventId) -> bool {
        let changed = self.filter.apply_action(action, id);
        if changed {
            self.notify(ModificationEvent::FilterChanged(action));
        }
        changed
    }

    pub fn add_annotation(&mut self, annotation: Annotation) -> usize {
        self.annotations.push(annotation);
        let index = self.annotations.len() - 1;
        self.notify(ModificationEvent::AnnotationAdded(index));
        index
    }

    pub fn update_annotation(&mut self, index: usize, annotation: Annotation) -> bool {
        let Some(slot) = self.annotations.get_mut(index) else {
            return false;
        };
        *slot = annotation;
        self.notify(ModificationEvent::AnnotationUpdated(index));
        true
    }

    pub fn remove_annotation(&mut self, index: usize) -> Option<Annotation> {
        if index >= self.annotations.len() {
            return None;
        }
        let removed = self.annotations.remove(index);
        self.notify(ModificationEvent::AnnotationRemoved(removed.clone()));
        Some(removed)
    }

    /// Annotations that point at `id`, by index.
    pub fn annotations_for_entry(&self, id: EventId) -> Vec<usize> {
        self.annotations
            .iter()
            .enumerate()
            .filter(|(_, annotation)| match annotation {
                Annotation::EntryLabel { entry, .. } => *entry == id,
                Annotation::EntriesLink { from, to } => *from == id || *to == Some(id),
                Annotation::TimeRange { .. } => false,
            })
            .map(|(index, _)| index)
            .collect()
    }

    /// Durable form of the current state. Events without a durable key are
    /// left out.
    pub fn to_persisted(&self) -> PersistedModifications {
        let trace = &self.trace;
        let mut hidden: Vec<EventId> = self.filter.invisible_entries().collect();
        hidden.sort();
        let mut expandable: Vec<EventId> = hidden
            .iter()
            .filter_map(|id| self.filter.tree().parent(*id))
            .filter_map(|parent| self.filter.first_visible_parent(parent))
            .collect();
        expandable.sort();
        expandable.dedup();

        let annotations = self
            .annotations
            .iter()
            .filter_map(|annotation| {
                Some(match annotation {
                    Annotation::EntryLabel { entry, label } => PersistedAnnotation::EntryLabel {
                        entry: key_of(trace, *entry)?,
                        label: label.clone(),
                    },
                    Annotation::TimeRange { start, end, label } => PersistedAnnotation::TimeRange {
                        start: *start,
                        end: *end,
                        label: label.clone(),
                    },
                    Annotation::EntriesLink { from, to } => PersistedAnnotation::EntriesLink {
                        from: key_of(trace, *from)?,
                        to: match to {
                            Some(to) => Some(key_of(trace, *to)?),
                            None => None,
                        },
                    },
                })
            })
            .collect();

        PersistedModifications {
            entries_modifications: PersistedEntries {
                hidden_entries: hidden.into_iter().filter_map(|id| key_of(trace, id)).collect(),
                expandable_entries: expandable.into_iter().filter_map(|id| key_of(trace, id)).collect(),
            },
            annotations,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_persisted())?)
    }

    /// Rebuilds state from its durable form. Any key that does not resolve
    /// against `trace` fails the whole restore.
    pub fn from_persisted(trace: Arc<TraceData>, persisted: &PersistedModifications) -> Result<Self> {
        let mut serializer = EventsSerializer::new();
        let mut manager = Self::new(trace.clone());

        let hidden = persisted
            .entries_modifications
            .hidden_entries
            .iter()
            .map(|key| event_of(&mut serializer, &trace, key))
            .collect::<Result<Vec<_>>>()?;
        manager.filter.restore_hidden(hidden);

        for annotation in &persisted.annotations {
            let annotation = match annotation {
                PersistedAnnotation::EntryLabel { entry, label } => Annotation::EntryLabel {
                    entry: event_of(&mut serializer, &trace, entry)?,
                    label: label.clone(),
                },
                PersistedAnnotation::TimeRange { start, end, label } => Annotation::TimeRange {
                    start: *start,
                    end: *end,
                    label: label.clone(),
                },
                PersistedAnnotation::EntriesLink { from, to } => Annotation::EntriesLink {
                    from: event_of(&mut serializer, &trace, from)?,
                    to: to
                        .as_deref()
                        .map(|to| event_of(&mut serializer, &trace, to))
                        .transpose()?,
                },
            };
            manager.annotations.push(annotation);
        }
        tracing::debug!(
            hidden = persisted.entries_modifications.hidden_entries.len(),
            annotations = manager.annotations.len(),
            "restored modifications"
        );
        manager.notify(ModificationEvent::Restored);
        Ok(manager)
    }

    pub fn from_json(trace: Arc<TraceData>, json: &str) -> Result<Self> {
        let persisted: PersistedModifications = serde_json::from_str(json)?;
        Self::from_persisted(trace, &persisted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use rstest::{fixture, rstest};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[fixture]
    fn trace() -> Arc<TraceData> {
        Arc::new(trace_from([
            complete("RunTask", 0.0, 100.0),
            complete("Parse", 10.0, 50.0),
            complete("Compile", 20.0, 10.0),
            complete("RunTask", 200.0, 10.0),
        ]))
    }

    fn id(trace: &TraceData, raw_index: usize) -> EventId {
        trace.event_for_raw_index(raw_index).unwrap()
    }

    #[rstest]
    fn test_observers_see_changes(trace: Arc<TraceData>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut manager = ModificationsManager::new(trace.clone());
        let sink = seen.clone();
        manager.add_observer(move |event| sink.borrow_mut().push(event.clone()));

        assert!(manager.apply_filter_action(FilterAction::CollapseFunction, id(&trace, 1)));
        assert!(!manager.apply_filter_action(FilterAction::CollapseFunction, id(&trace, 1)));
        let label = manager.add_annotation(Annotation::EntryLabel {
            entry: id(&trace, 2),
            label: "slow".to_string(),
        });
        assert_eq!(manager.remove_annotation(label).map(|_| ()), Some(()));
        assert_eq!(manager.remove_annotation(label), None);

        assert_eq!(
            *seen.borrow(),
            vec![
                ModificationEvent::FilterChanged(FilterAction::CollapseFunction),
                ModificationEvent::AnnotationAdded(0),
                ModificationEvent::AnnotationRemoved(Annotation::EntryLabel {
                    entry: id(&trace, 2),
                    label: "slow".to_string(),
                }),
            ]
        );
    }

    #[rstest]
    fn test_persisted_round_trip(trace: Arc<TraceData>) {
        let mut manager = ModificationsManager::new(trace.clone());
        manager.apply_filter_action(FilterAction::MergeFunction, id(&trace, 2));
        manager.add_annotation(Annotation::EntryLabel {
            entry: id(&trace, 3),
            label: "compile".to_string(),
        });
        manager.add_annotation(Annotation::TimeRange {
            start: 0,
            end: 100,
            label: "startup".to_string(),
        });
        manager.add_annotation(Annotation::EntriesLink {
            from: id(&trace, 1),
            to: Some(id(&trace, 4)),
        });

        let persisted = manager.to_persisted();
        assert_eq!(persisted.entries_modifications.hidden_entries, vec!["r-2".to_string()]);
        assert_eq!(persisted.entries_modifications.expandable_entries, vec!["r-1".to_string()]);

        let json = manager.to_json().unwrap();
        let restored = ModificationsManager::from_json(trace.clone(), &json).unwrap();
        assert_eq!(restored.annotations(), manager.annotations());
        assert!(!restored.entries_filter().is_visible(id(&trace, 2)));
        assert!(restored.entries_filter().is_expandable(id(&trace, 1)));
        assert_eq!(restored.to_persisted(), persisted);
    }

    #[rstest]
    fn test_annotation_wire_format() {
        let link = PersistedAnnotation::EntriesLink {
            from: "r-1".to_string(),
            to: None,
        };
        assert_eq!(
            serde_json::to_value(&link).unwrap(),
            serde_json::json!({ "type": "ENTRIES_LINK", "entryFrom": "r-1" })
        );
    }

    #[rstest]
    #[case::unknown_key(r#"{"entriesModifications":{"hiddenEntries":["r-99"],"expandableEntries":[]}}"#)]
    #[case::malformed_key(r#"{"annotations":[{"type":"ENTRY_LABEL","entry":"x-1","label":"a"}]}"#)]
    fn test_restore_rejects_bad_keys(trace: Arc<TraceData>, #[case] json: &str) {
        assert!(ModificationsManager::from_json(trace, json).is_err());
    }

    #[rstest]
    fn test_annotations_for_entry(trace: Arc<TraceData>) {
        let mut manager = ModificationsManager::new(trace.clone());
        manager.add_annotation(Annotation::EntriesLink {
            from: id(&trace, 1),
            to: None,
        });
        manager.add_annotation(Annotation::EntryLabel {
            entry: id(&trace, 4),
            label: "later".to_string(),
        });
        assert_eq!(manager.annotations_for_entry(id(&trace, 4)), vec![1]);
        assert!(manager.update_annotation(
            0,
            Annotation::EntriesLink {
                from: id(&trace, 1),
                to: Some(id(&trace, 4)),
            }
        ));
        assert_eq!(manager.annotations_for_entry(id(&trace, 4)), vec![0, 1]);
    }
}
