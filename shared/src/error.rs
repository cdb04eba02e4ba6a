//! Error types shared by the codec, the payloads and the room replica

use thiserror::Error;

/// Everything that can go wrong while decoding or mutating the world replica.
///
/// Errors produced by a local call are returned to that caller immediately.
/// Errors produced while applying an inbound packet are protocol faults and are
/// handed back to the transport, which logs them; nothing here is retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorldError {
    #[error("location ({x}, {y}) is outside the room bounds")]
    LocationOutOfBounds { x: i32, y: i32 },

    #[error("tile '{0}' is not placeable")]
    TileNotPlaceable(String),

    #[error("invalid tile data: {0}")]
    InvalidPayload(String),

    #[error("invalid room setting: {0}")]
    Validation(String),

    #[error("corrupt grid buffer: {0}")]
    CorruptGrid(String),

    #[error("unknown tile {0}")]
    UnknownTile(String),

    #[error("invalid tile catalog: {0}")]
    Catalog(String),

    #[error("room session is no longer running")]
    Disconnected,
}

pub type WorldResult<T> = Result<T, WorldError>;
