use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use shared::{
    domain::RoomId,
    protocol::{ChatMessage, ChatNotification},
};

pub type MessageHandler = Arc<dyn Fn(&ChatMessage) + Send + Sync>;
pub type NotificationHandler = Arc<dyn Fn(&ChatNotification) + Send + Sync>;
pub type ConnectionStatusHandler = Arc<dyn Fn(bool) + Send + Sync>;

/// Callbacks keyed by pointer identity: registering the same `Arc` twice
/// keeps a single entry.
pub struct HandlerSet<F: ?Sized> {
    handlers: Vec<Arc<F>>,
}

impl<F: ?Sized> Default for HandlerSet<F> {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }
}

impl<F: ?Sized> HandlerSet<F> {
    pub fn insert(&mut self, handler: Arc<F>) -> bool {
        if self.contains(&handler) {
            return false;
        }
        self.handlers.push(handler);
        true
    }

    pub fn remove(&mut self, handler: &Arc<F>) -> bool {
        let before = self.handlers.len();
        self.handlers
            .retain(|registered| !Arc::ptr_eq(registered, handler));
        self.handlers.len() != before
    }

    pub fn contains(&self, handler: &Arc<F>) -> bool {
        self.handlers
            .iter()
            .any(|registered| Arc::ptr_eq(registered, handler))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn snapshot(&self) -> Vec<Arc<F>> {
        self.handlers.clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handler storage lives beside the connection, never inside it, so
/// registrations outlast reconnects. Dispatch runs on a snapshot taken
/// outside the lock, letting callbacks register or remove handlers.
#[derive(Default)]
pub(crate) struct HandlerRegistry {
    rooms: Mutex<HashMap<RoomId, HandlerSet<dyn Fn(&ChatMessage) + Send + Sync>>>,
    notifications: Mutex<HandlerSet<dyn Fn(&ChatNotification) + Send + Sync>>,
    status: Mutex<HandlerSet<dyn Fn(bool) + Send + Sync>>,
}

impl HandlerRegistry {
    pub(crate) fn add_message_handler(&self, room_id: RoomId, handler: MessageHandler) -> bool {
        lock(&self.rooms).entry(room_id).or_default().insert(handler)
    }

    pub(crate) fn remove_message_handler(&self, room_id: &RoomId, handler: &MessageHandler) -> bool {
        let mut rooms = lock(&self.rooms);
        let Some(set) = rooms.get_mut(room_id) else {
            return false;
        };
        let removed = set.remove(handler);
        if set.is_empty() {
            rooms.remove(room_id);
        }
        removed
    }

    pub(crate) fn add_notification_handler(&self, handler: NotificationHandler) -> bool {
        lock(&self.notifications).insert(handler)
    }

    pub(crate) fn remove_notification_handler(&self, handler: &NotificationHandler) -> bool {
        lock(&self.notifications).remove(handler)
    }

    pub(crate) fn add_status_handler(&self, handler: ConnectionStatusHandler) -> bool {
        lock(&self.status).insert(handler)
    }

    pub(crate) fn remove_status_handler(&self, handler: &ConnectionStatusHandler) -> bool {
        lock(&self.status).remove(handler)
    }

    #[cfg(test)]
    pub(crate) fn message_handler_count(&self, room_id: &RoomId) -> usize {
        lock(&self.rooms).get(room_id).map_or(0, HandlerSet::len)
    }

    pub(crate) fn dispatch_message(&self, room_id: &RoomId, message: &ChatMessage) -> usize {
        let handlers = lock(&self.rooms)
            .get(room_id)
            .map(HandlerSet::snapshot)
            .unwrap_or_default();
        for handler in &handlers {
            handler(message);
        }
        handlers.len()
    }

    pub(crate) fn dispatch_notification(&self, notification: &ChatNotification) -> usize {
        let handlers = lock(&self.notifications).snapshot();
        for handler in &handlers {
            handler(notification);
        }
        handlers.len()
    }

    pub(crate) fn notify_status(&self, connected: bool) {
        let handlers = lock(&self.status).snapshot();
        for handler in &handlers {
            handler(connected);
        }
    }
}
