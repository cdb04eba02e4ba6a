//! Participants currently present in the room
//!
//! The roster mirrors what the authority tells us about other participants:
//! - who joined and left
//! - where they are and which way they are moving
//! - how many gold and blue coins each one holds
//!
//! It is only ever written by the session while handling inbound packets.

use log::{debug, info};
use shared::{CoinKind, ParticipantInfo};
use std::collections::HashMap;

/// One participant as seen by this client
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    id: i32,
    name: String,
    x: f32,
    y: f32,
    x_dir: i8,
    y_dir: i8,
    god: bool,
    dead: bool,
    gold_coins: u32,
    blue_coins: u32,
}

impl Participant {
    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn position(&self) -> (f32, f32) {
        (self.x, self.y)
    }

    /// Horizontal and vertical movement direction, each -1, 0 or 1.
    pub fn direction(&self) -> (i8, i8) {
        (self.x_dir, self.y_dir)
    }

    pub fn is_god(&self) -> bool {
        self.god
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub fn coins(&self, kind: CoinKind) -> u32 {
        match kind {
            CoinKind::Gold => self.gold_coins,
            CoinKind::Blue => self.blue_coins,
        }
    }
}

impl From<ParticipantInfo> for Participant {
    fn from(info: ParticipantInfo) -> Self {
        Self {
            id: info.id,
            name: info.name,
            x: info.x,
            y: info.y,
            x_dir: info.x_dir,
            y_dir: info.y_dir,
            god: info.god,
            dead: info.dead,
            gold_coins: info.gold_coins,
            blue_coins: info.blue_coins,
        }
    }
}

/// All participants in the room, indexed by id
#[derive(Debug, Default)]
pub struct Roster {
    participants: HashMap<i32, Participant>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a participant, replacing any previous entry with the same id.
    pub fn add(&mut self, info: ParticipantInfo) -> &Participant {
        let participant = Participant::from(info);
        info!("Participant {} ({}) joined", participant.id, participant.name);
        let id = participant.id;
        self.participants.insert(id, participant);
        &self.participants[&id]
    }

    /// Removes a participant, returning them if they were present.
    pub fn remove(&mut self, id: i32) -> Option<Participant> {
        let removed = self.participants.remove(&id);
        if let Some(participant) = &removed {
            info!("Participant {} ({}) left", participant.id, participant.name);
        }
        removed
    }

    pub fn get(&self, id: i32) -> Option<&Participant> {
        self.participants.get(&id)
    }

    pub fn contains(&self, id: i32) -> bool {
        self.participants.contains_key(&id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Participant> {
        self.participants.values().find(|p| p.name == name)
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    /// Applies a coin delta and returns the new count, or `None` for an
    /// unknown participant. Counts never go below zero.
    pub fn apply_coin_delta(&mut self, id: i32, kind: CoinKind, delta: i32) -> Option<u32> {
        let participant = self.participants.get_mut(&id)?;
        let count = match kind {
            CoinKind::Gold => &mut participant.gold_coins,
            CoinKind::Blue => &mut participant.blue_coins,
        };
        *count = count.saturating_add_signed(delta);
        debug!("Participant {} now has {} {:?} coins", id, count, kind);
        Some(*count)
    }

    /// Updates a participant's position and movement direction.
    /// Returns false for an unknown participant.
    pub fn update_position(&mut self, id: i32, x: f32, y: f32, x_dir: i8, y_dir: i8) -> bool {
        match self.participants.get_mut(&id) {
            Some(participant) => {
                participant.x = x;
                participant.y = y;
                participant.x_dir = x_dir;
                participant.y_dir = y_dir;
                true
            }
            None => false,
        }
    }

    /// Flips god mode and returns the new state.
    pub fn toggle_god(&mut self, id: i32) -> Option<bool> {
        let participant = self.participants.get_mut(&id)?;
        participant.god = !participant.god;
        debug!("Participant {} god mode: {}", id, participant.god);
        Some(participant.god)
    }

    /// Marks a participant dead; a dead participant stops moving.
    pub fn die(&mut self, id: i32) -> bool {
        match self.participants.get_mut(&id) {
            Some(participant) => {
                participant.dead = true;
                participant.x_dir = 0;
                participant.y_dir = 0;
                true
            }
            None => false,
        }
    }

    pub fn respawn(&mut self, id: i32, x: f32, y: f32) -> bool {
        match self.participants.get_mut(&id) {
            Some(participant) => {
                participant.dead = false;
                participant.x = x;
                participant.y = y;
                true
            }
            None => false,
        }
    }

    /// Puts a participant back at `(x, y)` with no momentum and no coins.
    pub fn reset(&mut self, id: i32, x: f32, y: f32) -> bool {
        match self.participants.get_mut(&id) {
            Some(participant) => {
                participant.x = x;
                participant.y = y;
                participant.x_dir = 0;
                participant.y_dir = 0;
                participant.gold_coins = 0;
                participant.blue_coins = 0;
                true
            }
            None => false,
        }
    }
}
