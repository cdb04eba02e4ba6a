//! Grid buffer codec
//!
//! The authority ships three zlib-compressed buffers per room: the foreground
//! ids, the background ids (both flat little-endian `u16` arrays, row-major)
//! and the metadata layer, a tagged variable-width stream with one entry per
//! cell. Decoding is a single forward pass; there is no random access.

use crate::error::{WorldError, WorldResult};
use crate::payload::CellValue;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Per-cell type tag of the metadata layer stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LayerTag {
    Nothing = 0,
    Uint32 = 1,
    Text = 2,
    Uint8 = 3,
    Uint16 = 4,
    Vanish = 5,
}

impl TryFrom<u8> for LayerTag {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(LayerTag::Nothing),
            1 => Ok(LayerTag::Uint32),
            2 => Ok(LayerTag::Text),
            3 => Ok(LayerTag::Uint8),
            4 => Ok(LayerTag::Uint16),
            5 => Ok(LayerTag::Vanish),
            other => Err(other),
        }
    }
}

/// Widest metadata entry: tag, length and 255 UTF-16 units.
const MAX_LAYER_ENTRY_LEN: usize = 2 + 2 * 255;

pub fn cell_count(width: u32, height: u32) -> usize {
    width as usize * height as usize
}

/// Inflates at most `limit` bytes; a stream that would grow past it is rejected
/// before anything beyond the limit is allocated.
fn inflate(bytes: &[u8], limit: usize) -> WorldResult<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(bytes).take((limit as u64).saturating_add(1));
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| WorldError::CorruptGrid(format!("inflate failed: {}", e)))?;
    if out.len() > limit {
        return Err(WorldError::CorruptGrid(format!(
            "buffer inflates past the {} bytes the room can hold",
            limit
        )));
    }
    Ok(out)
}

fn deflate(bytes: &[u8]) -> WorldResult<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(bytes)
        .map_err(|e| WorldError::CorruptGrid(format!("deflate failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| WorldError::CorruptGrid(format!("deflate failed: {}", e)))
}

/// Decodes one compressed tile id layer.
pub fn decode_grid(bytes: &[u8], width: u32, height: u32) -> WorldResult<Vec<u16>> {
    let expected = 2 * cell_count(width, height);
    let raw = inflate(bytes, expected)?;
    if raw.len() != expected {
        return Err(WorldError::CorruptGrid(format!(
            "expected {} bytes for a {}x{} grid, got {}",
            expected,
            width,
            height,
            raw.len()
        )));
    }

    Ok(raw
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

pub fn encode_grid(ids: &[u16]) -> WorldResult<Vec<u8>> {
    let raw: Vec<u8> = ids.iter().flat_map(|id| id.to_le_bytes()).collect();
    deflate(&raw)
}

/// Forward-only cursor over an inflated metadata layer.
struct LayerReader<'a> {
    buf: &'a [u8],
    offset: usize,
    cell: usize,
}

impl<'a> LayerReader<'a> {
    fn take(&mut self, len: usize) -> WorldResult<&'a [u8]> {
        let end = self.offset + len;
        if end > self.buf.len() {
            return Err(WorldError::CorruptGrid(format!(
                "metadata layer truncated in cell {} (needed {} bytes at offset {}, have {})",
                self.cell,
                len,
                self.offset,
                self.buf.len() - self.offset
            )));
        }
        let buf = self.buf;
        let bytes = &buf[self.offset..end];
        self.offset = end;
        Ok(bytes)
    }

    fn u8(&mut self) -> WorldResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> WorldResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> WorldResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn text(&mut self) -> WorldResult<String> {
        let units = self.u8()? as usize;
        let bytes = self.take(units * 2)?;
        let utf16: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16(&utf16).map_err(|_| {
            WorldError::CorruptGrid(format!("invalid UTF-16 text in cell {}", self.cell))
        })
    }

    fn next_cell(&mut self) -> WorldResult<CellValue> {
        let tag = self.u8()?;
        let tag = LayerTag::try_from(tag).map_err(|tag| {
            WorldError::CorruptGrid(format!("unknown tag {} in cell {}", tag, self.cell))
        })?;

        Ok(match tag {
            LayerTag::Nothing => CellValue::Empty,
            LayerTag::Text => CellValue::Text(self.text()?),
            LayerTag::Uint8 => CellValue::Int(self.u8()? as u32),
            LayerTag::Uint16 | LayerTag::Vanish => CellValue::Int(self.u16()? as u32),
            LayerTag::Uint32 => CellValue::Int(self.u32()?),
        })
    }
}

/// Decodes the compressed metadata layer, one tagged entry per cell in row-major order.
pub fn decode_metadata_layer(bytes: &[u8], width: u32, height: u32) -> WorldResult<Vec<CellValue>> {
    let cells = cell_count(width, height);
    let raw = inflate(bytes, cells.saturating_mul(MAX_LAYER_ENTRY_LEN))?;
    let mut reader = LayerReader {
        buf: &raw,
        offset: 0,
        cell: 0,
    };

    let mut layer = Vec::with_capacity(cells);
    while reader.cell < cells {
        layer.push(reader.next_cell()?);
        reader.cell += 1;
    }

    if reader.offset != raw.len() {
        return Err(WorldError::CorruptGrid(format!(
            "metadata layer has {} trailing bytes",
            raw.len() - reader.offset
        )));
    }
    Ok(layer)
}

/// Encodes a metadata layer using the narrowest tag for every integer cell.
pub fn encode_metadata_layer(layer: &[CellValue]) -> WorldResult<Vec<u8>> {
    let mut raw = Vec::with_capacity(layer.len());
    for cell in layer {
        match cell {
            CellValue::Empty => raw.push(LayerTag::Nothing as u8),
            CellValue::Int(value) if *value <= u8::MAX as u32 => {
                raw.push(LayerTag::Uint8 as u8);
                raw.push(*value as u8);
            }
            CellValue::Int(value) if *value <= u16::MAX as u32 => {
                raw.push(LayerTag::Uint16 as u8);
                raw.extend_from_slice(&(*value as u16).to_le_bytes());
            }
            CellValue::Int(value) => {
                raw.push(LayerTag::Uint32 as u8);
                raw.extend_from_slice(&value.to_le_bytes());
            }
            CellValue::Text(text) => {
                let units: Vec<u16> = text.encode_utf16().collect();
                let len = u8::try_from(units.len()).map_err(|_| {
                    WorldError::InvalidPayload(format!(
                        "text of {} code units does not fit the layer",
                        units.len()
                    ))
                })?;
                raw.push(LayerTag::Text as u8);
                raw.push(len);
                raw.extend(units.iter().flat_map(|unit| unit.to_le_bytes()));
            }
        }
    }
    deflate(&raw)
}

/// An empty foreground framed by a one-tile border of `boundary`.
pub fn bordered_grid(width: u32, height: u32, boundary: u16) -> Vec<u16> {
    let (w, h) = (width as usize, height as usize);
    let mut grid = vec![0u16; cell_count(width, height)];
    if w == 0 || h == 0 {
        return grid;
    }

    for x in 0..w {
        grid[x] = boundary;
        grid[(h - 1) * w + x] = boundary;
    }
    for y in 0..h {
        grid[y * w] = boundary;
        grid[y * w + (w - 1)] = boundary;
    }
    grid
}

pub fn empty_metadata_layer(width: u32, height: u32) -> Vec<CellValue> {
    vec![CellValue::Empty; cell_count(width, height)]
}
