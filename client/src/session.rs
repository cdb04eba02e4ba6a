//! A joined room: the replica, the roster and the dispatch of inbound packets

use crate::events::{EventBus, RoomEvent};
use crate::network::Outbox;
use crate::room::{Room, RoomConfig};
use crate::roster::Roster;
use log::{debug, warn};
use shared::{JoinSnapshot, Packet, TileCatalog, WorldResult, SYSTEM_PARTICIPANT};
use std::sync::Arc;

pub struct Session {
    roster: Roster,
    room: Room,
    events: EventBus,
}

impl Session {
    /// Builds the session from the snapshot the authority sent when we joined.
    pub fn join(
        catalog: Arc<TileCatalog>,
        snapshot: JoinSnapshot,
        outbox: Outbox,
        events: EventBus,
        config: &RoomConfig,
    ) -> WorldResult<Self> {
        let mut roster = Roster::new();
        for info in snapshot.participants.iter().cloned() {
            let participant = roster.add(info);
            events.publish(RoomEvent::ParticipantJoined {
                participant: participant.id(),
                name: participant.name().to_string(),
            });
        }

        let crown = Self::resolve(&roster, snapshot.crown);
        let room = Room::new(catalog, outbox, events.clone(), config, &snapshot, crown)?;

        Ok(Self {
            roster,
            room,
            events,
        })
    }

    pub fn room(&self) -> &Room {
        &self.room
    }

    pub fn room_mut(&mut self) -> &mut Room {
        &mut self.room
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Participant ids we don't know (including the room itself) attribute to nobody.
    fn resolve(roster: &Roster, participant: i32) -> Option<i32> {
        (participant != SYSTEM_PARTICIPANT && roster.contains(participant)).then_some(participant)
    }

    fn attribute(&self, participant: i32) -> Option<i32> {
        Self::resolve(&self.roster, participant)
    }

    /// Applies one authoritative packet. An error means the packet was malformed
    /// for this room; the replica is left as it was before the packet.
    pub fn handle_packet(&mut self, packet: Packet) -> WorldResult<()> {
        match packet {
            Packet::Kicked { reason } => {
                warn!("Kicked from room: {}", reason);
                self.events.publish(RoomEvent::Kicked { reason });
            }

            Packet::RoomLoaded(world) => self.room.apply_load(&world)?,
            Packet::RoomCleared => self.room.apply_clear()?,
            Packet::RoomSaved { autosaved } => self.room.apply_saved(autosaved),

            Packet::ForegroundInfo {
                x,
                y,
                tile,
                participant,
            } => {
                let by = self.attribute(participant);
                self.room.apply_foreground(x, y, tile, by)?;
            }
            Packet::BackgroundInfo {
                x,
                y,
                tile,
                participant,
            } => {
                let by = self.attribute(participant);
                self.room.apply_background(x, y, tile, by)?;
            }
            Packet::DataInfo {
                x,
                y,
                value,
                participant,
            } => {
                let by = self.attribute(participant);
                self.room.apply_data(x, y, &value, by)?;
            }

            Packet::OwnerInfo {
                code,
                category,
                visible,
                auto_save,
            } => self
                .room
                .apply_owner_info(&code, category, visible, auto_save),
            Packet::UpdateInfo {
                name,
                allow_spectate,
                allow_particle_actions,
            } => self
                .room
                .apply_update_info(&name, allow_spectate, allow_particle_actions),
            Packet::PlayCount { plays } => self.room.apply_play_count(plays),

            Packet::ActivateKey { participant, tile } => {
                let by = self.attribute(participant);
                self.room.activate_key(tile, by)?;
            }
            Packet::KeyStatus { tile } => self.room.deactivate_key(tile)?,
            Packet::Crown { participant } => {
                let holder = self.attribute(participant);
                self.room.set_crown(holder);
            }

            Packet::CoinDelta {
                participant,
                kind,
                delta,
            } => match self.roster.apply_coin_delta(participant, kind, delta) {
                Some(count) => self.events.publish(RoomEvent::CoinsChanged {
                    participant,
                    kind,
                    gained: delta > 0,
                    count,
                }),
                None => debug!("Coin delta for unknown participant {}", participant),
            },

            Packet::PlayerJoined(info) => {
                let participant = self.roster.add(info);
                self.events.publish(RoomEvent::ParticipantJoined {
                    participant: participant.id(),
                    name: participant.name().to_string(),
                });
            }
            Packet::PlayerLeft { participant } => {
                if let Some(left) = self.roster.remove(participant) {
                    self.events.publish(RoomEvent::ParticipantLeft {
                        participant,
                        name: left.name().to_string(),
                    });
                }
                self.room.participant_left(participant);
            }
            Packet::PlayerMoved {
                participant,
                x,
                y,
                x_dir,
                y_dir,
            } => {
                if self.roster.update_position(participant, x, y, x_dir, y_dir) {
                    self.events
                        .publish(RoomEvent::ParticipantMoved { participant, x, y });
                }
            }

            Packet::GodToggled { participant } => match self.roster.toggle_god(participant) {
                Some(god) => self
                    .events
                    .publish(RoomEvent::GodToggled { participant, god }),
                None => debug!("God toggle for unknown participant {}", participant),
            },
            Packet::Died { participant } => {
                if self.roster.die(participant) {
                    self.events.publish(RoomEvent::Died { participant });
                }
            }
            Packet::Respawned { participant, x, y } => {
                if self.roster.respawn(participant, x, y) {
                    self.events
                        .publish(RoomEvent::Respawned { participant, x, y });
                }
            }
            Packet::ParticipantReset { participant, x, y } => {
                if self.roster.reset(participant, x, y) {
                    self.events
                        .publish(RoomEvent::ParticipantReset { participant, x, y });
                }
            }
            Packet::TeleportedTo {
                participant,
                target,
            } => {
                if self.roster.contains(participant) && self.roster.contains(target) {
                    self.events.publish(RoomEvent::Teleported {
                        participant,
                        target,
                    });
                }
            }

            Packet::Joined(_) => warn!("Ignoring join snapshot for a room we already joined"),

            _ => {
                warn!("Unexpected packet type");
            }
        }

        Ok(())
    }
}
