//! Commands submitted to a running client
//!
//! While [`Client::run`](crate::network::Client::run) owns the session, other
//! tasks reach the room through a [`RoomHandle`]. The network loop applies each
//! command between packets and sends the result back to whoever asked.

use crate::room::Room;
use log::debug;
use shared::{Category, TileData, TileRef, WorldError, WorldResult};
use tokio::sync::{mpsc, oneshot};

/// Owned form of [`TileRef`] so a tile can travel through the command queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileSpec {
    Id(u16),
    Name(String),
}

impl TileSpec {
    pub fn tile_ref(&self) -> TileRef<'_> {
        match self {
            TileSpec::Id(id) => TileRef::Id(*id),
            TileSpec::Name(name) => TileRef::Name(name),
        }
    }
}

impl From<u16> for TileSpec {
    fn from(id: u16) -> Self {
        TileSpec::Id(id)
    }
}

impl From<&str> for TileSpec {
    fn from(name: &str) -> Self {
        TileSpec::Name(name.to_string())
    }
}

impl From<String> for TileSpec {
    fn from(name: String) -> Self {
        TileSpec::Name(name)
    }
}

/// Everything a caller may ask of the room while the client is running.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomCommand {
    SetForeground { x: i32, y: i32, tile: TileSpec },
    SetBackground { x: i32, y: i32, tile: TileSpec },
    SetData { x: i32, y: i32, data: TileData },

    SetName(String),
    SetCode(String),
    SetCategory(Category),
    SetVisible(bool),
    SetAutoSave(bool),
    SetAllowSpectate(bool),
    SetAllowParticleActions(bool),

    Save,
    Clear,
    Load,
    ResetParticipants,
    SetDrag(bool),
    SetKeyActive { key: String, active: bool },
}

impl RoomCommand {
    pub fn apply(self, room: &mut Room) -> WorldResult<()> {
        match self {
            RoomCommand::SetForeground { x, y, tile } => {
                room.set_foreground(x, y, tile.tile_ref())?
            }
            RoomCommand::SetBackground { x, y, tile } => {
                room.set_background(x, y, tile.tile_ref())?
            }
            RoomCommand::SetData { x, y, data } => room.set_data(x, y, data)?,

            RoomCommand::SetName(name) => room.set_name(&name)?,
            RoomCommand::SetCode(code) => room.set_code(&code)?,
            RoomCommand::SetCategory(category) => room.set_category(category),
            RoomCommand::SetVisible(visible) => room.set_visible(visible),
            RoomCommand::SetAutoSave(auto_save) => room.set_auto_save(auto_save),
            RoomCommand::SetAllowSpectate(allow) => room.set_allow_spectate(allow),
            RoomCommand::SetAllowParticleActions(allow) => {
                room.set_allow_particle_actions(allow)
            }

            RoomCommand::Save => room.save(),
            RoomCommand::Clear => room.clear(),
            RoomCommand::Load => room.load(),
            RoomCommand::ResetParticipants => room.reset_participants(),
            RoomCommand::SetDrag(enabled) => room.set_drag(enabled),
            RoomCommand::SetKeyActive { key, active } => room.set_key_active(&key, active)?,
        }
        Ok(())
    }
}

/// A queued command and the slot its result goes back through.
#[derive(Debug)]
pub struct RoomRequest {
    command: RoomCommand,
    reply: oneshot::Sender<WorldResult<()>>,
}

impl RoomRequest {
    pub fn command(&self) -> &RoomCommand {
        &self.command
    }

    pub fn respond(self, room: &mut Room) {
        let RoomRequest { command, reply } = self;
        answer(reply, command.apply(room));
    }

    pub fn reject(self, error: WorldError) {
        answer(self.reply, Err(error));
    }
}

fn answer(reply: oneshot::Sender<WorldResult<()>>, result: WorldResult<()>) {
    if reply.send(result).is_err() {
        debug!("Command caller went away before the reply");
    }
}

/// Cloneable sender side of the command queue.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    tx: mpsc::UnboundedSender<RoomRequest>,
}

impl RoomHandle {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RoomRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queues a command and waits for the loop to apply it.
    ///
    /// Returns [`WorldError::Disconnected`] once the client is gone.
    pub async fn execute(&self, command: RoomCommand) -> WorldResult<()> {
        let (reply, answer) = oneshot::channel();
        self.tx
            .send(RoomRequest { command, reply })
            .map_err(|_| WorldError::Disconnected)?;
        answer.await.map_err(|_| WorldError::Disconnected)?
    }

    pub async fn set_foreground(
        &self,
        x: i32,
        y: i32,
        tile: impl Into<TileSpec>,
    ) -> WorldResult<()> {
        let tile = tile.into();
        self.execute(RoomCommand::SetForeground { x, y, tile }).await
    }

    pub async fn set_background(
        &self,
        x: i32,
        y: i32,
        tile: impl Into<TileSpec>,
    ) -> WorldResult<()> {
        let tile = tile.into();
        self.execute(RoomCommand::SetBackground { x, y, tile }).await
    }

    pub async fn set_data(&self, x: i32, y: i32, data: impl Into<TileData>) -> WorldResult<()> {
        let data = data.into();
        self.execute(RoomCommand::SetData { x, y, data }).await
    }
}
