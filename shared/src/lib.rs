//! Protocol types, tile catalog, tile data payloads and grid codec shared by
//! everything that talks to a room authority.

pub mod error;
pub mod grid;
pub mod payload;
pub mod tiles;

pub use error::{WorldError, WorldResult};
pub use payload::{
    CellValue, Direction, NumberPayload, PortalPayload, TextPayload, TileData, VanishPayload,
};
pub use tiles::{MetadataKind, TileCatalog, TileDefinition, TileRef};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const PROTOCOL_VERSION: u32 = 0;
pub const MODIFICATION_DELAY_MS: u64 = 5;
pub const BOUNDARY_TILE: &str = "shiny light grey";
pub const ROOM_NAME_MAX_LEN: usize = 30;
pub const ROOM_CODE_MAX_LEN: usize = 20;

/// Participant id the authority uses for messages that come from the room itself.
pub const SYSTEM_PARTICIPANT: i32 = -1;

/// Trigger ("key") tile names.
pub mod keys {
    pub const BLUE: &str = "blue key";
    pub const PINK: &str = "pink key";
    pub const RED: &str = "red key";
    pub const ORANGE: &str = "orange key";
    pub const LIME: &str = "lime key";
    pub const GREEN: &str = "green key";
    pub const CYAN: &str = "cyan key";

    pub const ALL: [&str; 7] = [BLUE, PINK, RED, ORANGE, LIME, GREEN, CYAN];
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    // Outbound
    Connect {
        client_version: u32,
        name: String,
        room: String,
    },
    Foreground {
        edits: Vec<CellEdit>,
    },
    Background {
        edits: Vec<CellEdit>,
    },
    ForegroundData {
        edits: Vec<CellEdit>,
    },
    Settings(RoomSettings),
    Save,
    Clear,
    Load,
    ResetParticipants,
    NoDrag {
        disabled: bool,
    },
    SetKeyActive {
        tile: u16,
        active: bool,
    },
    Disconnect,

    // Inbound
    Joined(Box<JoinSnapshot>),
    Kicked {
        reason: String,
    },
    RoomLoaded(WorldSnapshot),
    RoomCleared,
    RoomSaved {
        autosaved: bool,
    },
    ForegroundInfo {
        x: i32,
        y: i32,
        tile: u16,
        participant: i32,
    },
    BackgroundInfo {
        x: i32,
        y: i32,
        tile: u16,
        participant: i32,
    },
    DataInfo {
        x: i32,
        y: i32,
        value: CellValue,
        participant: i32,
    },
    OwnerInfo {
        code: String,
        category: Category,
        visible: bool,
        auto_save: bool,
    },
    UpdateInfo {
        name: String,
        allow_spectate: bool,
        allow_particle_actions: bool,
    },
    PlayCount {
        plays: u32,
    },
    CoinDelta {
        participant: i32,
        kind: CoinKind,
        delta: i32,
    },
    ActivateKey {
        participant: i32,
        tile: u16,
    },
    KeyStatus {
        tile: u16,
    },
    Crown {
        participant: i32,
    },
    PlayerJoined(ParticipantInfo),
    PlayerLeft {
        participant: i32,
    },
    PlayerMoved {
        participant: i32,
        x: f32,
        y: f32,
        x_dir: i8,
        y_dir: i8,
    },
    GodToggled {
        participant: i32,
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
    TeleportedTo {
        participant: i32,
        target: i32,
    },
}

/// One pending cell modification inside a batched edit packet.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CellEdit {
    pub x: i32,
    pub y: i32,
    pub value: CellValue,
}

/// The compressed world state the authority sends on join and on reload.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct WorldSnapshot {
    pub foreground: Vec<u8>,
    pub background: Vec<u8>,
    pub data: Vec<u8>,
    pub gold_coins: u32,
    pub blue_coins: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JoinSnapshot {
    pub width: u32,
    pub height: u32,
    pub world: WorldSnapshot,
    pub participants: Vec<ParticipantInfo>,
    pub crown: i32,
    pub settings: RoomSettings,
    pub plays: u32,
    pub active_keys: Vec<u16>,
}

/// Every scalar room setting, in the order the authority expects them.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RoomSettings {
    pub name: String,
    pub code: String,
    pub category: Category,
    pub visible: bool,
    pub auto_save: bool,
    pub allow_spectate: bool,
    pub allow_particle_actions: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ParticipantInfo {
    pub id: i32,
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub x_dir: i8,
    pub y_dir: i8,
    pub god: bool,
    pub gold_coins: u32,
    pub blue_coins: u32,
    pub dead: bool,
}

impl ParticipantInfo {
    pub fn new(id: i32, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            x: 0.0,
            y: 0.0,
            x_dir: 0,
            y_dir: 0,
            god: false,
            gold_coins: 0,
            blue_coins: 0,
            dead: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoinKind {
    Gold = 0,
    Blue = 1,
}

/// Lobby category of a room.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    #[serde(rename = "none")]
    Other,
    Platformer,
    Art,
    Boss,
    Minigame,
    Race,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Other,
        Category::Platformer,
        Category::Art,
        Category::Boss,
        Category::Minigame,
        Category::Race,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Other => "none",
            Category::Platformer => "platformer",
            Category::Art => "art",
            Category::Boss => "boss",
            Category::Minigame => "minigame",
            Category::Race => "race",
        }
    }
}

impl FromStr for Category {
    type Err = WorldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| WorldError::Validation(format!("invalid category '{}'", s)))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
