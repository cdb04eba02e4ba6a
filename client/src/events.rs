//! Domain events published by the room replica
//!
//! Every observable change goes through one typed channel as a [`RoomEvent`].
//! Changes that originate remotely carry the participant that caused them
//! (`None` when the authority itself, or nobody we know, is responsible).

use log::trace;
use shared::{Category, CoinKind, TileData};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    NameChanged(String),
    CodeChanged(String),
    CategoryChanged(Category),
    VisibleChanged(bool),
    AutoSaveChanged(bool),
    AllowSpectateChanged(bool),
    AllowParticleActionsChanged(bool),
    PlaysChanged(u32),

    ForegroundChanged {
        by: Option<i32>,
        x: i32,
        y: i32,
        tile: u16,
    },
    BackgroundChanged {
        by: Option<i32>,
        x: i32,
        y: i32,
        tile: u16,
    },
    DataChanged {
        by: Option<i32>,
        x: i32,
        y: i32,
        data: TileData,
    },

    Loaded,
    Cleared,
    Saved {
        autosaved: bool,
    },

    KeyActivated {
        by: Option<i32>,
        key: String,
    },
    KeyDeactivated {
        key: String,
    },
    CrownChanged {
        holder: Option<i32>,
    },

    ParticipantJoined {
        participant: i32,
        name: String,
    },
    ParticipantLeft {
        participant: i32,
        name: String,
    },
    ParticipantMoved {
        participant: i32,
        x: f32,
        y: f32,
    },
    CoinsChanged {
        participant: i32,
        kind: CoinKind,
        gained: bool,
        count: u32,
    },
    GodToggled {
        participant: i32,
        god: bool,
    },
    Died {
        participant: i32,
    },
    Respawned {
        participant: i32,
        x: f32,
        y: f32,
    },
    ParticipantReset {
        participant: i32,
        x: f32,
        y: f32,
    },
    Teleported {
        participant: i32,
        target: i32,
    },

    Kicked {
        reason: String,
    },
}

/// Sending half of the event channel; cheap to clone into every publisher.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: mpsc::UnboundedSender<RoomEvent>,
}

impl EventBus {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RoomEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Publishes an event. Nobody listening is not an error.
    pub fn publish(&self, event: RoomEvent) {
        trace!("Publishing {:?}", event);
        if self.tx.send(event).is_err() {
            trace!("Event receiver dropped");
        }
    }
}
