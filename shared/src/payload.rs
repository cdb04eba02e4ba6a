//! Structured per-cell tile data and its packing rules
//!
//! The metadata layer stores every cell as an untyped [`CellValue`]. Which payload
//! a cell holds is decided by the foreground tile occupying it, so the payloads
//! below only know how to pack themselves into (and rebuild themselves from) the
//! integer or string the wire carries.

use crate::error::{WorldError, WorldResult};
use crate::tiles::MetadataKind;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const NUMBER_MAX: u32 = 16383;
pub const VANISH_TIME_MIN: u32 = 1;
pub const VANISH_TIME_MAX: u32 = 255;
pub const PORTAL_ID_MAX: u32 = 32767;
pub const TEXT_MAX_UNITS: usize = 255;

const PORTAL_ID_BITS: u32 = 15;
const PORTAL_DIRECTION_BITS: u32 = 2;

/// A cell of the metadata layer as it sits in memory and on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Int(u32),
    Text(String),
}

impl CellValue {
    fn as_int(&self) -> WorldResult<u32> {
        match self {
            CellValue::Int(value) => Ok(*value),
            other => Err(WorldError::InvalidPayload(format!(
                "expected an integer cell, found {:?}",
                other
            ))),
        }
    }
}

/// Portal exit direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Left = 0,
    Up = 1,
    Right = 2,
    Down = 3,
}

impl TryFrom<u32> for Direction {
    type Error = WorldError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Direction::Left),
            1 => Ok(Direction::Up),
            2 => Ok(Direction::Right),
            3 => Ok(Direction::Down),
            other => Err(WorldError::InvalidPayload(format!(
                "invalid direction {}",
                other
            ))),
        }
    }
}

/// Counter used by coin doors and gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NumberPayload {
    value: u32,
}

impl NumberPayload {
    pub fn new(value: u32) -> WorldResult<Self> {
        if value > NUMBER_MAX {
            return Err(WorldError::InvalidPayload(format!(
                "value needs to be between 0 and {} (inclusive), got {}",
                NUMBER_MAX, value
            )));
        }
        Ok(Self { value })
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn from_serialized(data: u32) -> WorldResult<Self> {
        Self::new(data)
    }

    pub fn serialize(&self) -> u32 {
        self.value
    }
}

impl Default for NumberPayload {
    fn default() -> Self {
        Self { value: 0 }
    }
}

/// Timers of a vanishing block, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VanishPayload {
    time_until_vanished: u32,
    time_until_reappeared: u32,
}

impl VanishPayload {
    pub fn new(time_until_vanished: u32, time_until_reappeared: u32) -> WorldResult<Self> {
        check_vanish_time("time_until_vanished", time_until_vanished)?;
        check_vanish_time("time_until_reappeared", time_until_reappeared)?;
        Ok(Self {
            time_until_vanished,
            time_until_reappeared,
        })
    }

    pub fn time_until_vanished(&self) -> u32 {
        self.time_until_vanished
    }

    pub fn time_until_reappeared(&self) -> u32 {
        self.time_until_reappeared
    }

    pub fn from_serialized(data: u32) -> WorldResult<Self> {
        Self::new(data >> 8, data & 0xff)
    }

    pub fn serialize(&self) -> u32 {
        (self.time_until_vanished << 8) | self.time_until_reappeared
    }
}

impl Default for VanishPayload {
    fn default() -> Self {
        Self {
            time_until_vanished: 1,
            time_until_reappeared: 1,
        }
    }
}

fn check_vanish_time(field: &str, seconds: u32) -> WorldResult<()> {
    if !(VANISH_TIME_MIN..=VANISH_TIME_MAX).contains(&seconds) {
        return Err(WorldError::InvalidPayload(format!(
            "{} needs to be between {} and {} (inclusive), got {}",
            field, VANISH_TIME_MIN, VANISH_TIME_MAX, seconds
        )));
    }
    Ok(())
}

/// A portal's own id, the id it leads to and the direction players leave it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortalPayload {
    my_id: u32,
    destination_id: u32,
    direction: Direction,
}

impl PortalPayload {
    pub fn new(my_id: u32, destination_id: u32, direction: Direction) -> WorldResult<Self> {
        check_portal_id("my_id", my_id)?;
        check_portal_id("destination_id", destination_id)?;
        Ok(Self {
            my_id,
            destination_id,
            direction,
        })
    }

    pub fn my_id(&self) -> u32 {
        self.my_id
    }

    pub fn destination_id(&self) -> u32 {
        self.destination_id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn from_serialized(data: u32) -> WorldResult<Self> {
        let mask = (1 << PORTAL_ID_BITS) - 1;
        let direction = Direction::try_from(data & 0b11)?;
        let my_id = (data >> PORTAL_DIRECTION_BITS) & mask;
        let destination_id = (data >> (PORTAL_DIRECTION_BITS + PORTAL_ID_BITS)) & mask;
        Self::new(my_id, destination_id, direction)
    }

    pub fn serialize(&self) -> u32 {
        self.direction as u32
            | (self.my_id << PORTAL_DIRECTION_BITS)
            | (self.destination_id << (PORTAL_DIRECTION_BITS + PORTAL_ID_BITS))
    }
}

impl Default for PortalPayload {
    fn default() -> Self {
        Self {
            my_id: 0,
            destination_id: 0,
            direction: Direction::Left,
        }
    }
}

fn check_portal_id(field: &str, id: u32) -> WorldResult<()> {
    if id > PORTAL_ID_MAX {
        return Err(WorldError::InvalidPayload(format!(
            "{} needs to be between 0 and {} (inclusive), got {}",
            field, PORTAL_ID_MAX, id
        )));
    }
    Ok(())
}

/// Sign text. Length is counted in UTF-16 code units, which is what the wire stores.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextPayload {
    text: String,
}

impl TextPayload {
    pub fn new(text: impl Into<String>) -> WorldResult<Self> {
        let text = text.into();
        let units = text.encode_utf16().count();
        if units == 0 || units > TEXT_MAX_UNITS {
            return Err(WorldError::InvalidPayload(format!(
                "text length must be between 1 and {} characters (inclusive), got {}",
                TEXT_MAX_UNITS, units
            )));
        }
        Ok(Self { text })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn from_serialized(data: impl Into<String>) -> WorldResult<Self> {
        Self::new(data)
    }

    pub fn serialize(&self) -> String {
        self.text.clone()
    }
}

impl Default for TextPayload {
    fn default() -> Self {
        Self {
            text: " ".to_string(),
        }
    }
}

/// Any of the structured payloads a tile can carry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TileData {
    Number(NumberPayload),
    Vanish(VanishPayload),
    Portal(PortalPayload),
    Text(TextPayload),
}

impl TileData {
    /// The payload a freshly placed tile of `kind` starts with, `None` for plain tiles.
    pub fn default_for(kind: MetadataKind) -> Option<TileData> {
        match kind {
            MetadataKind::None => None,
            MetadataKind::Number => Some(TileData::Number(NumberPayload::default())),
            MetadataKind::Vanish => Some(TileData::Vanish(VanishPayload::default())),
            MetadataKind::Portal => Some(TileData::Portal(PortalPayload::default())),
            MetadataKind::Text => Some(TileData::Text(TextPayload::default())),
        }
    }

    /// Interprets an untyped cell under the metadata kind of the tile sitting on it.
    pub fn from_cell(kind: MetadataKind, cell: &CellValue) -> WorldResult<Option<TileData>> {
        let data = match kind {
            MetadataKind::None => return Ok(None),
            MetadataKind::Number => {
                TileData::Number(NumberPayload::from_serialized(cell.as_int()?)?)
            }
            MetadataKind::Vanish => {
                TileData::Vanish(VanishPayload::from_serialized(cell.as_int()?)?)
            }
            MetadataKind::Portal => {
                TileData::Portal(PortalPayload::from_serialized(cell.as_int()?)?)
            }
            MetadataKind::Text => match cell {
                CellValue::Text(text) => {
                    TileData::Text(TextPayload::from_serialized(text.as_str())?)
                }
                other => {
                    return Err(WorldError::InvalidPayload(format!(
                        "expected a text cell, found {:?}",
                        other
                    )))
                }
            },
        };
        Ok(Some(data))
    }

    pub fn kind(&self) -> MetadataKind {
        match self {
            TileData::Number(_) => MetadataKind::Number,
            TileData::Vanish(_) => MetadataKind::Vanish,
            TileData::Portal(_) => MetadataKind::Portal,
            TileData::Text(_) => MetadataKind::Text,
        }
    }

    pub fn serialize(&self) -> CellValue {
        match self {
            TileData::Number(payload) => CellValue::Int(payload.serialize()),
            TileData::Vanish(payload) => CellValue::Int(payload.serialize()),
            TileData::Portal(payload) => CellValue::Int(payload.serialize()),
            TileData::Text(payload) => CellValue::Text(payload.serialize()),
        }
    }
}

impl From<NumberPayload> for TileData {
    fn from(payload: NumberPayload) -> Self {
        TileData::Number(payload)
    }
}

impl From<VanishPayload> for TileData {
    fn from(payload: VanishPayload) -> Self {
        TileData::Vanish(payload)
    }
}

impl From<PortalPayload> for TileData {
    fn from(payload: PortalPayload) -> Self {
        TileData::Portal(payload)
    }
}

impl From<TextPayload> for TileData {
    fn from(payload: TextPayload) -> Self {
        TileData::Text(payload)
    }
}

impl fmt::Display for TileData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileData::Number(p) => write!(f, "number({})", p.value()),
            TileData::Vanish(p) => write!(
                f,
                "vanish({}s, {}s)",
                p.time_until_vanished(),
                p.time_until_reappeared()
            ),
            TileData::Portal(p) => write!(
                f,
                "portal({} -> {}, {:?})",
                p.my_id(),
                p.destination_id(),
                p.direction()
            ),
            TileData::Text(p) => write!(f, "text({:?})", p.text()),
        }
    }
}
