use std::{collections::HashMap, fmt};

use shared::domain::RoomId;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A live broker subscription. Only valid on the connection generation it
/// was created on; a new connection always gets fresh handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    pub generation: u64,
}

/// Per-room state. A room missing from the registry is unsubscribed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomSubscription {
    /// Requested while no connection was up; opened on the next connect.
    Pending,
    Subscribed(SubscriptionHandle),
}

#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<RoomId, RoomSubscription>,
    next_id: u64,
}

impl RoomRegistry {
    pub fn next_subscription_id(&mut self) -> SubscriptionId {
        let id = SubscriptionId(format!("sub-{}", self.next_id));
        self.next_id += 1;
        id
    }

    pub fn get(&self, room_id: &RoomId) -> Option<&RoomSubscription> {
        self.rooms.get(room_id)
    }

    /// The room's handle if it belongs to `generation`.
    pub fn live_handle(&self, room_id: &RoomId, generation: u64) -> Option<&SubscriptionHandle> {
        match self.rooms.get(room_id) {
            Some(RoomSubscription::Subscribed(handle)) if handle.generation == generation => {
                Some(handle)
            }
            _ => None,
        }
    }

    pub fn mark_pending(&mut self, room_id: RoomId) {
        self.rooms.insert(room_id, RoomSubscription::Pending);
    }

    pub fn mark_subscribed(&mut self, room_id: RoomId, handle: SubscriptionHandle) {
        self.rooms
            .insert(room_id, RoomSubscription::Subscribed(handle));
    }

    pub fn remove(&mut self, room_id: &RoomId) -> Option<RoomSubscription> {
        self.rooms.remove(room_id)
    }

    /// Connection lost: every handle is dead, but the rooms are still wanted.
    pub fn invalidate_all(&mut self) {
        for state in self.rooms.values_mut() {
            *state = RoomSubscription::Pending;
        }
    }

    pub fn drain(&mut self) -> Vec<(RoomId, RoomSubscription)> {
        self.rooms.drain().collect()
    }

    pub fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.keys().cloned().collect()
    }

    pub fn room_for_subscription(&self, id: &str, generation: u64) -> Option<&RoomId> {
        self.rooms.iter().find_map(|(room_id, state)| match state {
            RoomSubscription::Subscribed(handle)
                if handle.generation == generation && handle.id.as_str() == id =>
            {
                Some(room_id)
            }
            _ => None,
        })
    }

    pub fn subscribed_rooms(&self) -> Vec<RoomId> {
        let mut rooms: Vec<RoomId> = self
            .rooms
            .iter()
            .filter(|(_, state)| matches!(state, RoomSubscription::Subscribed(_)))
            .map(|(room_id, _)| room_id.clone())
            .collect();
        rooms.sort();
        rooms
    }

    pub fn pending_rooms(&self) -> Vec<RoomId> {
        let mut rooms: Vec<RoomId> = self
            .rooms
            .iter()
            .filter(|(_, state)| matches!(state, RoomSubscription::Pending))
            .map(|(room_id, _)| room_id.clone())
            .collect();
        rooms.sort();
        rooms
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
