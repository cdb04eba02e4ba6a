//! Debounced batching of local cell edits
//!
//! Painting tends to produce bursts of edits. Each edit kind gets its own
//! queue: the first edit arms a short deadline, later edits just append, and
//! once the deadline passes the whole queue goes out as a single packet. The
//! network loop sleeps until [`ModificationBatcher::deadline`] and then calls
//! [`ModificationBatcher::flush_expired`]; there is no background timer task.

use crate::network::Outbox;
use log::debug;
use shared::{CellEdit, CellValue, Packet, MODIFICATION_DELAY_MS};
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_FLUSH_DELAY: Duration = Duration::from_millis(MODIFICATION_DELAY_MS);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
    Foreground,
    Background,
    Data,
}

impl EditKind {
    fn packet(self, edits: Vec<CellEdit>) -> Packet {
        match self {
            EditKind::Foreground => Packet::Foreground { edits },
            EditKind::Background => Packet::Background { edits },
            EditKind::Data => Packet::ForegroundData { edits },
        }
    }
}

#[derive(Debug)]
pub struct ModificationBatcher {
    kind: EditKind,
    delay: Duration,
    pending: Vec<CellEdit>,
    deadline: Option<Instant>,
}

impl ModificationBatcher {
    pub fn new(kind: EditKind, delay: Duration) -> Self {
        Self {
            kind,
            delay,
            pending: Vec::new(),
            deadline: None,
        }
    }

    /// Appends an edit. Arms the deadline if it is not armed yet; an armed
    /// deadline is never pushed back.
    pub fn enqueue(&mut self, x: i32, y: i32, value: CellValue, now: Instant) {
        if self.deadline.is_none() {
            self.deadline = Some(now + self.delay);
        }
        self.pending.push(CellEdit { x, y, value });
    }

    pub fn kind(&self) -> EditKind {
        self.kind
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn pending(&self) -> &[CellEdit] {
        &self.pending
    }

    /// Sends everything pending as one packet and disarms.
    pub fn flush(&mut self, outbox: &Outbox) {
        self.deadline = None;
        let edits = std::mem::take(&mut self.pending);
        debug!("Flushing {} {:?} edits", edits.len(), self.kind);
        outbox.send(self.kind.packet(edits));
    }

    /// Flushes right now if a flush is armed. Returns whether anything was sent.
    pub fn force_flush(&mut self, outbox: &Outbox) -> bool {
        if !self.is_armed() {
            return false;
        }
        self.flush(outbox);
        true
    }

    /// Flushes if the deadline has passed. Returns whether anything was sent.
    pub fn flush_expired(&mut self, now: Instant, outbox: &Outbox) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.flush(outbox);
                true
            }
            _ => false,
        }
    }
}
