//! Scalar room properties that publish an event only when they actually change

use crate::events::{EventBus, RoomEvent};

/// Wraps one scalar property of the room.
///
/// `get` is the value the replica currently holds; `shadow` is the value last
/// handed out for an outbound settings packet, so a combined settings update
/// resends untouched fields with their latest known value. Both are written on
/// every change, which keeps them equal today.
#[derive(Debug)]
pub struct ChangeNotifier<T> {
    value: T,
    shadow: T,
    events: EventBus,
    to_event: fn(T) -> RoomEvent,
}

impl<T: Clone + PartialEq> ChangeNotifier<T> {
    pub fn new(value: T, events: EventBus, to_event: fn(T) -> RoomEvent) -> Self {
        Self {
            shadow: value.clone(),
            value,
            events,
            to_event,
        }
    }

    /// Stores `value`, publishing a change event first. Returns false (and does
    /// nothing) when the stored value is already equal.
    pub fn set(&mut self, value: T) -> bool {
        if self.value == value {
            return false;
        }

        self.shadow = value.clone();
        self.events.publish((self.to_event)(value.clone()));
        self.value = value;
        true
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn shadow(&self) -> &T {
        &self.shadow
    }
}
