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

use super::{EventId, TraceEvent};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Relation {
    Timer,
    AnimationFrame,
    IdleCallback,
    WebSocket,
}

enum Role {
    Initiator,
    Initiated,
}

fn classify(name: &str) -> Option<(Relation, Role, &'static str)> {
    Some(match name {
        "TimerInstall" => (Relation::Timer, Role::Initiator, "timerId"),
        "TimerFire" => (Relation::Timer, Role::Initiated, "timerId"),
        "RequestAnimationFrame" => (Relation::AnimationFrame, Role::Initiator, "id"),
        "FireAnimationFrame" => (Relation::AnimationFrame, Role::Initiated, "id"),
        "RequestIdleCallback" => (Relation::IdleCallback, Role::Initiator, "id"),
        "FireIdleCallback" => (Relation::IdleCallback, Role::Initiated, "id"),
        "WebSocketCreate" => (Relation::WebSocket, Role::Initiator, "identifier"),
        "WebSocketSendHandshakeRequest"
        | "WebSocketReceiveHandshakeResponse"
        | "WebSocketSend"
        | "WebSocketReceive"
        | "WebSocketDestroy" => (Relation::WebSocket, Role::Initiated, "identifier"),
        _ => return None,
    })
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

#[derive(Debug, Default)]
pub(super) struct InitiatorLinks {
    pub initiator_of: HashMap<EventId, EventId>,
    pub initiated_by: HashMap<EventId, Vec<EventId>>,
}

/// Links each initiated event to the most recent initiator with the same id in
/// the same process. `events` must be in time order.
pub(super) fn link_initiators<'a>(events: impl IntoIterator<Item = &'a TraceEvent>) -> InitiatorLinks {
    let mut latest: HashMap<(u32, Relation, String), EventId> = HashMap::new();
    let mut links = InitiatorLinks::default();

    for event in events {
        let Some((relation, role, field)) = classify(&event.name) else {
            continue;
        };
        let Some(id) = event.data().and_then(|data| data.get(field)).and_then(id_string) else {
            continue;
        };
        let key = (event.pid, relation, id);
        match role {
            Role::Initiator => {
                latest.insert(key, event.id);
            }
            Role::Initiated => {
                if let Some(&initiator) = latest.get(&key) {
                    links.initiator_of.insert(event.id, initiator);
                    links.initiated_by.entry(initiator).or_default().push(event.id);
                }
            }
        }
    }
    links
}
