//! UDP transport between a session and the room authority

use crate::command::{RoomHandle, RoomRequest};
use crate::events::EventBus;
use crate::room::RoomConfig;
use crate::session::Session;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{JoinSnapshot, Packet, TileCatalog, WorldError, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, timeout, Instant};

/// Largest datagram we accept. Join snapshots of big rooms come close to it.
const RECV_BUFFER_SIZE: usize = 65536;

/// Queue of packets waiting to be written to the socket.
///
/// The room and its batchers only ever push into this queue; the network loop
/// owns the socket and drains it.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Packet>,
}

impl Outbox {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Packet>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, packet: Packet) {
        if let Err(e) = self.tx.send(packet) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }
}

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    name: String,
    room_id: String,
    catalog: Arc<TileCatalog>,
    config: RoomConfig,

    outbox: Outbox,
    outbound_rx: mpsc::UnboundedReceiver<Packet>,
    commands: RoomHandle,
    commands_rx: mpsc::UnboundedReceiver<RoomRequest>,
    events: EventBus,

    session: Option<Session>,
    connected: bool,
}

impl Client {
    pub async fn new(
        server_addr: &str,
        name: &str,
        room_id: &str,
        catalog: Arc<TileCatalog>,
        config: RoomConfig,
        events: EventBus,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;
        let (outbox, outbound_rx) = Outbox::channel();
        let (commands, commands_rx) = RoomHandle::channel();

        Ok(Client {
            socket,
            server_addr,
            name: name.to_string(),
            room_id: room_id.to_string(),
            catalog,
            config,
            outbox,
            outbound_rx,
            commands,
            commands_rx,
            events,
            session: None,
            connected: false,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut Session> {
        self.session.as_mut()
    }

    /// A handle for editing the room while [`Client::run`] is driving it.
    /// Commands queued before `run` starts are applied once it does.
    pub fn handle(&self) -> RoomHandle {
        self.commands.clone()
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    /// Sends `Connect` and waits for the join snapshot. Anything else the
    /// authority sends before it is dropped.
    pub async fn join(&mut self, wait: Duration) -> Result<(), Box<dyn std::error::Error>> {
        info!("Joining room '{}' as '{}'...", self.room_id, self.name);

        let packet = Packet::Connect {
            client_version: PROTOCOL_VERSION,
            name: self.name.clone(),
            room: self.room_id.clone(),
        };
        self.send_packet(&packet).await?;

        let snapshot = timeout(wait, self.wait_for_snapshot())
            .await
            .map_err(|_| "Timed out waiting for the room snapshot")??;

        let session = Session::join(
            Arc::clone(&self.catalog),
            *snapshot,
            self.outbox.clone(),
            self.events.clone(),
            &self.config,
        )?;
        info!(
            "Joined '{}' ({}x{}) with {} other participants",
            session.room().name(),
            session.room().width(),
            session.room().height(),
            session.roster().len()
        );

        self.session = Some(session);
        self.connected = true;
        Ok(())
    }

    async fn wait_for_snapshot(&self) -> Result<Box<JoinSnapshot>, Box<dyn std::error::Error>> {
        let mut buffer = vec![0u8; RECV_BUFFER_SIZE];
        loop {
            let (len, _) = self.socket.recv_from(&mut buffer).await?;
            match deserialize::<Packet>(&buffer[..len]) {
                Ok(Packet::Joined(snapshot)) => return Ok(snapshot),
                Ok(Packet::Kicked { reason }) => {
                    return Err(format!("Join refused: {}", reason).into())
                }
                Ok(_) => debug!("Dropping packet received before join"),
                Err(e) => warn!("Undecodable packet: {}", e),
            }
        }
    }

    fn handle_request(&mut self, request: RoomRequest) {
        debug!("Applying {:?}", request.command());
        match self.session.as_mut() {
            Some(session) if self.connected => request.respond(session.room_mut()),
            _ => request.reject(WorldError::Disconnected),
        }
    }

    fn handle_packet(&mut self, packet: Packet) {
        if let Packet::Kicked { .. } = packet {
            self.connected = false;
        }

        let Some(session) = self.session.as_mut() else {
            warn!("Packet received before joining");
            return;
        };
        if let Err(e) = session.handle_packet(packet) {
            error!("Malformed packet from authority: {}", e);
        }
    }

    /// Drives the session until the authority kicks us or the socket fails.
    ///
    /// Packets from the authority, commands from [`RoomHandle`]s and batch
    /// deadlines are all served from this one loop.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if self.session.is_none() {
            return Err("Client::run called before join".into());
        }

        let mut buffer = vec![0u8; RECV_BUFFER_SIZE];

        while self.connected {
            let deadline = self.session.as_ref().and_then(|s| s.room().flush_deadline());

            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => match deserialize::<Packet>(&buffer[..len]) {
                            Ok(packet) => self.handle_packet(packet),
                            Err(e) => warn!("Undecodable packet: {}", e),
                        },
                        Err(e) => {
                            error!("Error receiving packet: {}", e);
                            return Err(e.into());
                        }
                    }
                },

                Some(packet) = self.outbound_rx.recv() => {
                    if let Err(e) = self.send_packet(&packet).await {
                        error!("Error sending packet: {}", e);
                    }
                },

                Some(request) = self.commands_rx.recv() => {
                    self.handle_request(request);
                },

                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if let Some(session) = self.session.as_mut() {
                        session.room_mut().flush_expired(Instant::now());
                    }
                },
            }
        }

        info!("Left room '{}'", self.room_id);
        Ok(())
    }

    /// Applies queued commands, sends everything still pending and says goodbye.
    pub async fn disconnect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        while let Ok(request) = self.commands_rx.try_recv() {
            self.handle_request(request);
        }
        if let Some(session) = self.session.as_mut() {
            session.room_mut().flush_all();
        }
        while let Ok(packet) = self.outbound_rx.try_recv() {
            self.send_packet(&packet).await?;
        }

        if self.connected {
            self.send_packet(&Packet::Disconnect).await?;
            self.connected = false;
        }
        Ok(())
    }
}
