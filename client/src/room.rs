//! Local replica of the room's world state
//!
//! The room owns the foreground and background grids, the metadata layer, the
//! set of active keys and every scalar room setting. It is the only writer of
//! the grids. Two kinds of input reach it:
//!
//! - local edits (`set_foreground`, `set_background`, `set_data`) which are
//!   validated, applied immediately without publishing an event, and queued
//!   for the authority through a [`ModificationBatcher`];
//! - authoritative updates forwarded by the session, which are applied the
//!   same way but always publish a [`RoomEvent`] attributed to whoever caused
//!   them.
//!
//! The metadata layer holds untyped cells; a cell is interpreted with the
//! payload kind of the foreground tile currently on it.

use crate::batcher::{EditKind, ModificationBatcher, DEFAULT_FLUSH_DELAY};
use crate::events::{EventBus, RoomEvent};
use crate::network::Outbox;
use crate::notifier::ChangeNotifier;
use log::{debug, info};
use shared::grid::{bordered_grid, decode_grid, decode_metadata_layer, empty_metadata_layer};
use shared::{
    keys, CellValue, Category, JoinSnapshot, Packet, RoomSettings, TileCatalog, TileData,
    TileDefinition, TileRef, WorldError, WorldResult, WorldSnapshot, BOUNDARY_TILE,
    ROOM_CODE_MAX_LEN, ROOM_NAME_MAX_LEN,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Tunables for the replica.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// Quiet period before a batch of local edits is sent.
    pub flush_delay: Duration,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            flush_delay: DEFAULT_FLUSH_DELAY,
        }
    }
}

/// Decoded contents of a [`WorldSnapshot`], ready to be installed.
struct DecodedWorld {
    foreground: Vec<u16>,
    background: Vec<u16>,
    data: Vec<CellValue>,
}

impl DecodedWorld {
    fn decode(snapshot: &WorldSnapshot, width: u32, height: u32) -> WorldResult<Self> {
        Ok(Self {
            foreground: decode_grid(&snapshot.foreground, width, height)?,
            background: decode_grid(&snapshot.background, width, height)?,
            data: decode_metadata_layer(&snapshot.data, width, height)?,
        })
    }
}

pub struct Room {
    catalog: Arc<TileCatalog>,
    outbox: Outbox,
    events: EventBus,

    name: ChangeNotifier<String>,
    code: ChangeNotifier<String>,
    category: ChangeNotifier<Category>,
    visible: ChangeNotifier<bool>,
    auto_save: ChangeNotifier<bool>,
    allow_spectate: ChangeNotifier<bool>,
    allow_particle_actions: ChangeNotifier<bool>,
    plays: ChangeNotifier<u32>,

    active_keys: BTreeSet<String>,
    width: u32,
    height: u32,
    foreground: Vec<u16>,
    background: Vec<u16>,
    data: Vec<CellValue>,
    gold_coins: u32,
    blue_coins: u32,
    crown: Option<i32>,

    foreground_queue: ModificationBatcher,
    background_queue: ModificationBatcher,
    data_queue: ModificationBatcher,
}

impl Room {
    /// Builds the replica from the snapshot received when joining.
    ///
    /// `crown` must already be resolved against the roster.
    pub fn new(
        catalog: Arc<TileCatalog>,
        outbox: Outbox,
        events: EventBus,
        config: &RoomConfig,
        snapshot: &JoinSnapshot,
        crown: Option<i32>,
    ) -> WorldResult<Self> {
        let (width, height) = (snapshot.width, snapshot.height);
        let world = DecodedWorld::decode(&snapshot.world, width, height)?;

        let mut active_keys = BTreeSet::new();
        for tile in &snapshot.active_keys {
            active_keys.insert(catalog.resolve_foreground(*tile)?.name.clone());
        }

        let settings = &snapshot.settings;
        let notify = |value: bool, to_event: fn(bool) -> RoomEvent| {
            ChangeNotifier::new(value, events.clone(), to_event)
        };

        info!(
            "Room '{}' replica ready: {}x{}, {} active keys",
            settings.name,
            width,
            height,
            active_keys.len()
        );

        Ok(Self {
            name: ChangeNotifier::new(
                settings.name.clone(),
                events.clone(),
                RoomEvent::NameChanged,
            ),
            code: ChangeNotifier::new(
                settings.code.clone(),
                events.clone(),
                RoomEvent::CodeChanged,
            ),
            category: ChangeNotifier::new(
                settings.category,
                events.clone(),
                RoomEvent::CategoryChanged,
            ),
            visible: notify(settings.visible, RoomEvent::VisibleChanged),
            auto_save: notify(settings.auto_save, RoomEvent::AutoSaveChanged),
            allow_spectate: notify(settings.allow_spectate, RoomEvent::AllowSpectateChanged),
            allow_particle_actions: notify(
                settings.allow_particle_actions,
                RoomEvent::AllowParticleActionsChanged,
            ),
            plays: ChangeNotifier::new(snapshot.plays, events.clone(), RoomEvent::PlaysChanged),

            active_keys,
            width,
            height,
            foreground: world.foreground,
            background: world.background,
            data: world.data,
            gold_coins: snapshot.world.gold_coins,
            blue_coins: snapshot.world.blue_coins,
            crown,

            foreground_queue: ModificationBatcher::new(EditKind::Foreground, config.flush_delay),
            background_queue: ModificationBatcher::new(EditKind::Background, config.flush_delay),
            data_queue: ModificationBatcher::new(EditKind::Data, config.flush_delay),

            catalog,
            outbox,
            events,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_out_of_bounds(&self, x: i32, y: i32) -> bool {
        x < 0 || y < 0 || x as i64 >= self.width as i64 || y as i64 >= self.height as i64
    }

    fn index(&self, x: i32, y: i32) -> WorldResult<usize> {
        if self.is_out_of_bounds(x, y) {
            return Err(WorldError::LocationOutOfBounds { x, y });
        }
        Ok(y as usize * self.width as usize + x as usize)
    }

    // ---- reads ----

    /// Foreground id at a cell; 0 outside the room.
    pub fn foreground_id(&self, x: i32, y: i32) -> u16 {
        self.index(x, y).map_or(0, |i| self.foreground[i])
    }

    /// Background id at a cell; 0 outside the room.
    pub fn background_id(&self, x: i32, y: i32) -> u16 {
        self.index(x, y).map_or(0, |i| self.background[i])
    }

    pub fn foreground(&self, x: i32, y: i32) -> Option<&TileDefinition> {
        self.catalog.foreground(self.foreground_id(x, y))
    }

    pub fn background(&self, x: i32, y: i32) -> Option<&TileDefinition> {
        self.catalog.background(self.background_id(x, y))
    }

    /// The structured data at a cell, interpreted for the foreground tile on it.
    /// `None` for tiles without data and for cells outside the room.
    pub fn data(&self, x: i32, y: i32) -> WorldResult<Option<TileData>> {
        let Ok(index) = self.index(x, y) else {
            return Ok(None);
        };
        match self.foreground(x, y) {
            Some(tile) => TileData::from_cell(tile.metadata_kind, &self.data[index]),
            None => Ok(None),
        }
    }

    pub fn name(&self) -> &str {
        self.name.get()
    }

    pub fn code(&self) -> &str {
        self.code.get()
    }

    pub fn category(&self) -> Category {
        *self.category.get()
    }

    pub fn visible(&self) -> bool {
        *self.visible.get()
    }

    pub fn auto_save(&self) -> bool {
        *self.auto_save.get()
    }

    pub fn allow_spectate(&self) -> bool {
        *self.allow_spectate.get()
    }

    pub fn allow_particle_actions(&self) -> bool {
        *self.allow_particle_actions.get()
    }

    pub fn plays(&self) -> u32 {
        *self.plays.get()
    }

    pub fn gold_coins(&self) -> u32 {
        self.gold_coins
    }

    pub fn blue_coins(&self) -> u32 {
        self.blue_coins
    }

    /// Participant currently holding the gold crown.
    pub fn crown(&self) -> Option<i32> {
        self.crown
    }

    pub fn is_key_active(&self, key: &str) -> bool {
        self.active_keys.contains(key)
    }

    pub fn active_keys(&self) -> impl Iterator<Item = &str> {
        self.active_keys.iter().map(String::as_str)
    }

    // ---- local edits ----

    /// Places a foreground tile. The cell's data resets to the new tile's default.
    pub fn set_foreground<'a>(
        &mut self,
        x: i32,
        y: i32,
        tile: impl Into<TileRef<'a>>,
    ) -> WorldResult<()> {
        let index = self.index(x, y)?;
        let catalog = Arc::clone(&self.catalog);
        let tile = catalog.resolve_foreground(tile)?;
        if !tile.placeable {
            return Err(WorldError::TileNotPlaceable(tile.name.clone()));
        }
        if self.foreground[index] == tile.id {
            return Ok(());
        }

        self.write_foreground(index, tile);
        self.foreground_queue
            .enqueue(x, y, CellValue::Int(tile.id as u32), Instant::now());
        Ok(())
    }

    pub fn set_background<'a>(
        &mut self,
        x: i32,
        y: i32,
        tile: impl Into<TileRef<'a>>,
    ) -> WorldResult<()> {
        let index = self.index(x, y)?;
        let id = self.catalog.resolve_background(tile)?.id;
        if self.background[index] == id {
            return Ok(());
        }

        self.background[index] = id;
        self.background_queue
            .enqueue(x, y, CellValue::Int(id as u32), Instant::now());
        Ok(())
    }

    /// Sets a cell's structured data. Any pending foreground batch is sent first
    /// so the authority already knows the tile the data belongs to.
    pub fn set_data(&mut self, x: i32, y: i32, data: impl Into<TileData>) -> WorldResult<()> {
        self.foreground_queue.force_flush(&self.outbox);

        let data = data.into();
        let index = self.index(x, y)?;
        self.check_accepts(x, y, &data)?;

        let value = data.serialize();
        self.data[index] = value.clone();
        self.data_queue.enqueue(x, y, value, Instant::now());
        Ok(())
    }

    fn check_accepts(&self, x: i32, y: i32, data: &TileData) -> WorldResult<()> {
        let kind = self.foreground(x, y).map(|tile| tile.metadata_kind);
        if kind != Some(data.kind()) {
            return Err(WorldError::InvalidPayload(format!(
                "tile at ({}, {}) does not accept {}",
                x, y, data
            )));
        }
        Ok(())
    }

    fn write_foreground(&mut self, index: usize, tile: &TileDefinition) {
        self.foreground[index] = tile.id;
        self.data[index] = TileData::default_for(tile.metadata_kind)
            .map(|data| data.serialize())
            .unwrap_or_default();
    }

    // ---- batching ----

    /// Earliest moment a pending batch wants to be sent.
    pub fn flush_deadline(&self) -> Option<Instant> {
        [
            self.foreground_queue.deadline(),
            self.background_queue.deadline(),
            self.data_queue.deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Sends every batch whose deadline has passed, foreground first.
    pub fn flush_expired(&mut self, now: Instant) {
        self.foreground_queue.flush_expired(now, &self.outbox);
        self.background_queue.flush_expired(now, &self.outbox);
        self.data_queue.flush_expired(now, &self.outbox);
    }

    /// Sends everything pending right away.
    pub fn flush_all(&mut self) {
        self.foreground_queue.force_flush(&self.outbox);
        self.background_queue.force_flush(&self.outbox);
        self.data_queue.force_flush(&self.outbox);
    }

    // ---- settings ----

    fn send_settings(&self) {
        self.outbox.send(Packet::Settings(RoomSettings {
            name: self.name.shadow().clone(),
            code: self.code.shadow().clone(),
            category: *self.category.shadow(),
            visible: *self.visible.shadow(),
            auto_save: *self.auto_save.shadow(),
            allow_spectate: *self.allow_spectate.shadow(),
            allow_particle_actions: *self.allow_particle_actions.shadow(),
        }));
    }

    pub fn set_name(&mut self, name: &str) -> WorldResult<()> {
        let len = name.encode_utf16().count();
        if len < 1 || len > ROOM_NAME_MAX_LEN {
            return Err(WorldError::Validation(format!(
                "name must be 1 to {} characters, got {}",
                ROOM_NAME_MAX_LEN, len
            )));
        }
        if self.name.set(name.to_string()) {
            self.send_settings();
        }
        Ok(())
    }

    pub fn set_code(&mut self, code: &str) -> WorldResult<()> {
        let len = code.encode_utf16().count();
        if len > ROOM_CODE_MAX_LEN {
            return Err(WorldError::Validation(format!(
                "code must be at most {} characters, got {}",
                ROOM_CODE_MAX_LEN, len
            )));
        }
        if self.code.set(code.to_string()) {
            self.send_settings();
        }
        Ok(())
    }

    pub fn set_category(&mut self, category: Category) {
        if self.category.set(category) {
            self.send_settings();
        }
    }

    /// Like [`Room::set_category`], for a category given by its lobby name.
    pub fn set_category_name(&mut self, category: &str) -> WorldResult<()> {
        self.set_category(category.parse()?);
        Ok(())
    }

    pub fn set_visible(&mut self, visible: bool) {
        if self.visible.set(visible) {
            self.send_settings();
        }
    }

    pub fn set_auto_save(&mut self, auto_save: bool) {
        if self.auto_save.set(auto_save) {
            self.send_settings();
        }
    }

    pub fn set_allow_spectate(&mut self, allow: bool) {
        if self.allow_spectate.set(allow) {
            self.send_settings();
        }
    }

    pub fn set_allow_particle_actions(&mut self, allow: bool) {
        if self.allow_particle_actions.set(allow) {
            self.send_settings();
        }
    }

    // ---- commands ----

    pub fn save(&self) {
        self.outbox.send(Packet::Save);
    }

    /// Asks the authority to clear the room. The grid changes when it answers.
    pub fn clear(&self) {
        self.outbox.send(Packet::Clear);
    }

    /// Asks the authority to reload the last save.
    pub fn load(&self) {
        self.outbox.send(Packet::Load);
    }

    pub fn reset_participants(&self) {
        self.outbox.send(Packet::ResetParticipants);
    }

    pub fn set_drag(&self, enabled: bool) {
        self.outbox.send(Packet::NoDrag { disabled: !enabled });
    }

    /// Switches one of the trigger keys by name.
    pub fn set_key_active(&self, key: &str, active: bool) -> WorldResult<()> {
        if !keys::ALL.contains(&key) {
            return Err(WorldError::Validation(format!("'{}' is not a key", key)));
        }
        let tile = self.catalog.resolve_foreground(key)?.id;
        self.outbox.send(Packet::SetKeyActive { tile, active });
        Ok(())
    }

    // ---- authoritative updates ----

    pub(crate) fn apply_foreground(
        &mut self,
        x: i32,
        y: i32,
        tile: u16,
        by: Option<i32>,
    ) -> WorldResult<()> {
        let index = self.index(x, y)?;
        let catalog = Arc::clone(&self.catalog);
        let tile = catalog.resolve_foreground(tile)?;

        self.write_foreground(index, tile);
        self.events.publish(RoomEvent::ForegroundChanged {
            by,
            x,
            y,
            tile: tile.id,
        });
        Ok(())
    }

    pub(crate) fn apply_background(
        &mut self,
        x: i32,
        y: i32,
        tile: u16,
        by: Option<i32>,
    ) -> WorldResult<()> {
        let index = self.index(x, y)?;
        let tile = self.catalog.resolve_background(tile)?.id;

        self.background[index] = tile;
        self.events
            .publish(RoomEvent::BackgroundChanged { by, x, y, tile });
        Ok(())
    }

    pub(crate) fn apply_data(
        &mut self,
        x: i32,
        y: i32,
        value: &CellValue,
        by: Option<i32>,
    ) -> WorldResult<()> {
        let index = self.index(x, y)?;
        let kind = self
            .foreground(x, y)
            .map(|tile| tile.metadata_kind)
            .ok_or_else(|| WorldError::UnknownTile(format!("#{}", self.foreground[index])))?;
        let data = TileData::from_cell(kind, value)?.ok_or_else(|| {
            WorldError::InvalidPayload(format!("tile at ({}, {}) does not accept data", x, y))
        })?;

        self.data[index] = data.serialize();
        self.events.publish(RoomEvent::DataChanged { by, x, y, data });
        Ok(())
    }

    /// Installs a full reload. The buffers are decoded before anything changes,
    /// so a corrupt snapshot leaves the replica untouched.
    pub(crate) fn apply_load(&mut self, snapshot: &WorldSnapshot) -> WorldResult<()> {
        let world = DecodedWorld::decode(snapshot, self.width, self.height)?;

        self.deactivate_all_keys();
        self.foreground = world.foreground;
        self.background = world.background;
        self.data = world.data;
        self.gold_coins = snapshot.gold_coins;
        self.blue_coins = snapshot.blue_coins;

        info!("Room reloaded");
        self.events.publish(RoomEvent::Loaded);
        Ok(())
    }

    /// Replaces the world with an empty one framed by the boundary tile.
    pub(crate) fn apply_clear(&mut self) -> WorldResult<()> {
        let boundary = self.catalog.resolve_foreground(BOUNDARY_TILE)?.id;

        self.deactivate_all_keys();
        self.foreground = bordered_grid(self.width, self.height, boundary);
        self.background = vec![0; self.foreground.len()];
        self.data = empty_metadata_layer(self.width, self.height);
        self.gold_coins = 0;
        self.blue_coins = 0;

        info!("Room cleared");
        self.events.publish(RoomEvent::Cleared);
        Ok(())
    }

    pub(crate) fn apply_saved(&self, autosaved: bool) {
        debug!("Room saved (autosave: {})", autosaved);
        self.events.publish(RoomEvent::Saved { autosaved });
    }

    pub(crate) fn apply_owner_info(
        &mut self,
        code: &str,
        category: Category,
        visible: bool,
        auto_save: bool,
    ) {
        self.code.set(code.to_string());
        self.category.set(category);
        self.visible.set(visible);
        self.auto_save.set(auto_save);
    }

    pub(crate) fn apply_update_info(
        &mut self,
        name: &str,
        allow_spectate: bool,
        allow_particle_actions: bool,
    ) {
        self.name.set(name.to_string());
        self.allow_spectate.set(allow_spectate);
        self.allow_particle_actions.set(allow_particle_actions);
    }

    pub(crate) fn apply_play_count(&mut self, plays: u32) {
        self.plays.set(plays);
    }

    pub(crate) fn activate_key(&mut self, tile: u16, by: Option<i32>) -> WorldResult<()> {
        let key = self.catalog.resolve_foreground(tile)?.name.clone();
        self.events.publish(RoomEvent::KeyActivated {
            by,
            key: key.clone(),
        });
        self.active_keys.insert(key);
        Ok(())
    }

    pub(crate) fn deactivate_key(&mut self, tile: u16) -> WorldResult<()> {
        let key = self.catalog.resolve_foreground(tile)?.name.clone();
        self.deactivate_key_named(key);
        Ok(())
    }

    fn deactivate_key_named(&mut self, key: String) {
        self.active_keys.remove(&key);
        self.events.publish(RoomEvent::KeyDeactivated { key });
    }

    fn deactivate_all_keys(&mut self) {
        for key in std::mem::take(&mut self.active_keys) {
            self.deactivate_key_named(key);
        }
    }

    pub(crate) fn set_crown(&mut self, holder: Option<i32>) {
        self.crown = holder;
        self.events.publish(RoomEvent::CrownChanged { holder });
    }

    /// Drops the crown if its holder just left.
    pub(crate) fn participant_left(&mut self, participant: i32) {
        if self.crown == Some(participant) {
            self.set_crown(None);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use shared::grid::{encode_grid, encode_metadata_layer};
    use shared::{
        Direction, NumberPayload, PortalPayload, TextPayload, VanishPayload, SYSTEM_PARTICIPANT,
    };
    use tokio::sync::mpsc::UnboundedReceiver;

    pub(crate) const CATALOG: &str = r#"[
        {"contents": [
            {"name": "empty"},
            {"name": "shiny light grey"},
            {"name": "spawn", "placeable": false},
            {"name": "basic"}
        ]},
        {"contents": [
            {"name": "gold coin door", "class": "GoldCoinDoor"},
            {"name": "vanish", "class": "Vanish"},
            {"name": "portal", "class": "Portal"},
            {"name": "sign", "class": "Text"},
            {"name": "blue key", "class": "Key"},
            {"name": "red key", "class": "Key"}
        ]}
    ]"#;

    pub(crate) const BACKGROUNDS: &str = r#"[{"contents": [{"name": "none"}, {"name": "brick"}]}]"#;

    pub(crate) fn catalog() -> Arc<TileCatalog> {
        Arc::new(TileCatalog::from_json(CATALOG, BACKGROUNDS).unwrap())
    }

    pub(crate) fn settings() -> RoomSettings {
        RoomSettings {
            name: "lobby".to_string(),
            code: "secret".to_string(),
            category: Category::Platformer,
            visible: true,
            auto_save: false,
            allow_spectate: true,
            allow_particle_actions: false,
        }
    }

    pub(crate) fn world(
        width: u32,
        height: u32,
        foreground: &[u16],
        data: &[CellValue],
    ) -> WorldSnapshot {
        let cells = (width * height) as usize;
        WorldSnapshot {
            foreground: encode_grid(foreground).unwrap(),
            background: encode_grid(&vec![0; cells]).unwrap(),
            data: encode_metadata_layer(data).unwrap(),
            gold_coins: 2,
            blue_coins: 1,
        }
    }

    pub(crate) fn snapshot(width: u32, height: u32) -> JoinSnapshot {
        let cells = (width * height) as usize;
        JoinSnapshot {
            width,
            height,
            world: world(width, height, &vec![0; cells], &vec![CellValue::Empty; cells]),
            participants: Vec::new(),
            crown: SYSTEM_PARTICIPANT,
            settings: settings(),
            plays: 3,
            active_keys: Vec::new(),
        }
    }

    struct Fixture {
        room: Room,
        sent: UnboundedReceiver<Packet>,
        events: UnboundedReceiver<RoomEvent>,
    }

    impl Fixture {
        fn new(snapshot: &JoinSnapshot) -> Self {
            let (outbox, sent) = Outbox::channel();
            let (bus, events) = EventBus::channel();
            let room =
                Room::new(catalog(), outbox, bus, &RoomConfig::default(), snapshot, None).unwrap();
            Self { room, sent, events }
        }

        fn sent(&mut self) -> Vec<Packet> {
            std::iter::from_fn(|| self.sent.try_recv().ok()).collect()
        }

        fn events(&mut self) -> Vec<RoomEvent> {
            std::iter::from_fn(|| self.events.try_recv().ok()).collect()
        }

        fn flush_later(&mut self) {
            self.room
                .flush_expired(Instant::now() + Duration::from_millis(50));
        }
    }

    fn fixture(width: u32, height: u32) -> Fixture {
        Fixture::new(&snapshot(width, height))
    }

    #[test]
    fn test_new_decodes_snapshot() {
        let mut snapshot = snapshot(2, 2);
        snapshot.world = world(
            2,
            2,
            &[1, 4, 5, 0],
            &[
                CellValue::Empty,
                CellValue::Int(12),
                CellValue::Int(0x0203),
                CellValue::Empty,
            ],
        );
        snapshot.active_keys = vec![8];
        let f = Fixture::new(&snapshot);

        assert_eq!(f.room.width(), 2);
        assert_eq!(f.room.foreground_id(1, 0), 4);
        assert_eq!(f.room.foreground(0, 0).unwrap().name, "shiny light grey");
        assert_eq!(
            f.room.data(1, 0).unwrap(),
            Some(TileData::Number(NumberPayload::new(12).unwrap()))
        );
        assert_eq!(
            f.room.data(0, 1).unwrap(),
            Some(TileData::Vanish(VanishPayload::new(2, 3).unwrap()))
        );
        assert_eq!(f.room.data(0, 0).unwrap(), None);
        assert!(f.room.is_key_active("blue key"));
        assert_eq!(f.room.gold_coins(), 2);
        assert_eq!(f.room.plays(), 3);
        assert_eq!(f.room.name(), "lobby");
    }

    #[test]
    fn test_new_rejects_corrupt_grid() {
        let mut snapshot = snapshot(3, 3);
        snapshot.world.foreground = encode_grid(&[0; 8]).unwrap();
        let (outbox, _sent) = Outbox::channel();
        let (bus, _events) = EventBus::channel();
        let result = Room::new(catalog(), outbox, bus, &RoomConfig::default(), &snapshot, None);
        assert!(matches!(result, Err(WorldError::CorruptGrid(_))));
    }

    #[test]
    fn test_out_of_bounds_reads_are_empty() {
        let f = fixture(3, 2);
        assert_eq!(f.room.foreground_id(-1, 0), 0);
        assert_eq!(f.room.foreground_id(3, 0), 0);
        assert_eq!(f.room.background_id(0, 2), 0);
        assert_eq!(f.room.data(7, 7).unwrap(), None);
    }

    #[test]
    fn test_bounds_are_enforced_on_every_edit() {
        let mut f = fixture(4, 3);
        let outside = [(-1, 0), (0, -1), (4, 0), (0, 3)];
        for (x, y) in outside {
            assert_eq!(
                f.room.set_foreground(x, y, "basic"),
                Err(WorldError::LocationOutOfBounds { x, y })
            );
            assert_eq!(
                f.room.set_background(x, y, "brick"),
                Err(WorldError::LocationOutOfBounds { x, y })
            );
            assert_eq!(
                f.room.set_data(x, y, NumberPayload::default()),
                Err(WorldError::LocationOutOfBounds { x, y })
            );
        }

        for y in 0..3 {
            for x in 0..4 {
                assert!(f.room.set_foreground(x, y, "basic").is_ok());
                assert!(f.room.set_background(x, y, "brick").is_ok());
                assert!(!matches!(
                    f.room.set_data(x, y, NumberPayload::default()),
                    Err(WorldError::LocationOutOfBounds { .. })
                ));
            }
        }
    }

    #[test]
    fn test_set_foreground_is_optimistic_and_silent() {
        let mut f = fixture(3, 3);
        f.room.set_foreground(1, 1, "basic").unwrap();

        assert_eq!(f.room.foreground(1, 1).unwrap().name, "basic");
        assert!(f.events().is_empty());
        assert!(f.sent().is_empty());

        f.flush_later();
        match f.sent().as_slice() {
            [Packet::Foreground { edits }] => {
                assert_eq!(edits.len(), 1);
                assert_eq!((edits[0].x, edits[0].y), (1, 1));
                assert_eq!(edits[0].value, CellValue::Int(3));
            }
            other => panic!("Unexpected packets {:?}", other),
        }
    }

    #[test]
    fn test_set_foreground_rejects_unplaceable() {
        let mut f = fixture(3, 3);
        assert_eq!(
            f.room.set_foreground(1, 1, "spawn"),
            Err(WorldError::TileNotPlaceable("spawn".to_string()))
        );
        assert!(matches!(
            f.room.set_foreground(1, 1, "lava"),
            Err(WorldError::UnknownTile(_))
        ));
        assert_eq!(f.room.foreground_id(1, 1), 0);
        assert!(f.room.flush_deadline().is_none());
    }

    #[test]
    fn test_same_foreground_is_not_batched() {
        let mut f = fixture(3, 3);
        f.room.set_foreground(1, 1, 0u16).unwrap();
        assert!(f.room.flush_deadline().is_none());

        f.room.set_foreground(1, 1, "basic").unwrap();
        f.flush_later();
        f.sent();
        f.room.set_foreground(1, 1, "basic").unwrap();
        assert!(f.room.flush_deadline().is_none());

        f.room.set_background(0, 0, 0u16).unwrap();
        assert!(f.room.flush_deadline().is_none());
    }

    #[test]
    fn test_foreground_change_resets_data() {
        let mut f = fixture(3, 3);
        f.room.set_foreground(1, 1, "gold coin door").unwrap();
        f.room.set_data(1, 1, NumberPayload::new(9).unwrap()).unwrap();

        f.room.set_foreground(1, 1, "vanish").unwrap();
        assert_eq!(
            f.room.data(1, 1).unwrap(),
            Some(TileData::Vanish(VanishPayload::default()))
        );
        assert_eq!(f.room.data[4], CellValue::Int(0x0101));

        f.room.set_foreground(1, 1, "basic").unwrap();
        assert_eq!(f.room.data[4], CellValue::Empty);
        assert_eq!(f.room.data(1, 1).unwrap(), None);
    }

    #[test]
    fn test_set_data_checks_kind() {
        let mut f = fixture(3, 3);
        f.room.set_foreground(1, 1, "portal").unwrap();

        assert!(matches!(
            f.room.set_data(1, 1, TextPayload::new("hi").unwrap()),
            Err(WorldError::InvalidPayload(_))
        ));
        assert!(matches!(
            f.room.set_data(0, 0, NumberPayload::default()),
            Err(WorldError::InvalidPayload(_))
        ));

        let portal = PortalPayload::new(5, 10, Direction::Right).unwrap();
        f.room.set_data(1, 1, portal).unwrap();
        assert_eq!(f.room.data(1, 1).unwrap(), Some(TileData::Portal(portal)));
    }

    #[test]
    fn test_foreground_batch_is_sent_before_data() {
        let mut f = fixture(8, 8);
        f.room.set_foreground(5, 5, "sign").unwrap();
        f.room.set_data(5, 5, TextPayload::new("hello").unwrap()).unwrap();

        // foreground went out synchronously, data is still pending
        let sent = f.sent();
        assert_eq!(sent.len(), 1);
        assert!(matches!(&sent[0], Packet::Foreground { edits } if edits.len() == 1));

        f.flush_later();
        match f.sent().as_slice() {
            [Packet::ForegroundData { edits }] => {
                assert_eq!(edits[0].value, CellValue::Text("hello".to_string()));
            }
            other => panic!("Unexpected packets {:?}", other),
        }
    }

    #[test]
    fn test_burst_of_edits_is_one_message() {
        let mut f = fixture(8, 8);
        f.room.set_foreground(1, 1, "basic").unwrap();
        f.room.set_foreground(2, 1, "basic").unwrap();
        f.room.set_foreground(3, 1, "basic").unwrap();
        f.room.set_background(3, 1, "brick").unwrap();

        f.flush_later();
        let sent = f.sent();
        assert_eq!(sent.len(), 2);
        match &sent[0] {
            Packet::Foreground { edits } => {
                let xs: Vec<i32> = edits.iter().map(|e| e.x).collect();
                assert_eq!(xs, vec![1, 2, 3]);
            }
            other => panic!("Unexpected packet {:?}", other),
        }
        assert!(matches!(&sent[1], Packet::Background { edits } if edits.len() == 1));
    }

    #[test]
    fn test_settings_send_full_record() {
        let mut f = fixture(3, 3);
        f.room.set_visible(false);

        match f.sent().as_slice() {
            [Packet::Settings(sent)] => {
                let mut expected = settings();
                expected.visible = false;
                assert_eq!(sent, &expected);
            }
            other => panic!("Unexpected packets {:?}", other),
        }
        assert_eq!(f.events(), vec![RoomEvent::VisibleChanged(false)]);
    }

    #[test]
    fn test_unchanged_setting_is_silent() {
        let mut f = fixture(3, 3);
        f.room.set_name("lobby").unwrap();
        f.room.set_code("secret").unwrap();
        f.room.set_category(Category::Platformer);
        f.room.set_allow_spectate(true);
        assert!(f.sent().is_empty());
        assert!(f.events().is_empty());
    }

    #[test]
    fn test_setting_validation() {
        let mut f = fixture(3, 3);
        assert!(matches!(f.room.set_name(""), Err(WorldError::Validation(_))));
        assert!(matches!(
            f.room.set_name(&"n".repeat(31)),
            Err(WorldError::Validation(_))
        ));
        assert!(f.room.set_name(&"n".repeat(30)).is_ok());
        assert!(matches!(
            f.room.set_code(&"c".repeat(21)),
            Err(WorldError::Validation(_))
        ));
        assert!(f.room.set_code("").is_ok());
        assert!(matches!(
            f.room.set_category_name("shooter"),
            Err(WorldError::Validation(_))
        ));
        f.room.set_category_name("race").unwrap();
        assert_eq!(f.room.category(), Category::Race);
    }

    #[test]
    fn test_remote_edits_publish_attributed_events() {
        let mut f = fixture(3, 3);
        f.room.apply_foreground(1, 1, 4, Some(7)).unwrap();
        f.room.apply_data(1, 1, &CellValue::Int(3), Some(7)).unwrap();
        f.room.apply_background(2, 2, 1, None).unwrap();

        assert_eq!(
            f.events(),
            vec![
                RoomEvent::ForegroundChanged {
                    by: Some(7),
                    x: 1,
                    y: 1,
                    tile: 4
                },
                RoomEvent::DataChanged {
                    by: Some(7),
                    x: 1,
                    y: 1,
                    data: TileData::Number(NumberPayload::new(3).unwrap())
                },
                RoomEvent::BackgroundChanged {
                    by: None,
                    x: 2,
                    y: 2,
                    tile: 1
                },
            ]
        );
        assert!(f.sent().is_empty());
        assert!(f.room.flush_deadline().is_none());
    }

    #[test]
    fn test_remote_foreground_skips_placeable_check() {
        let mut f = fixture(3, 3);
        f.room.apply_foreground(1, 1, 2, None).unwrap();
        assert_eq!(f.room.foreground(1, 1).unwrap().name, "spawn");
        assert!(f.room.apply_foreground(3, 3, 2, None).is_err());
    }

    #[test]
    fn test_remote_data_for_plain_tile_is_rejected() {
        let mut f = fixture(3, 3);
        assert!(matches!(
            f.room.apply_data(1, 1, &CellValue::Int(1), None),
            Err(WorldError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_clear_builds_bordered_room() {
        let mut snapshot = snapshot(3, 3);
        snapshot.active_keys = vec![8, 9];
        let mut f = Fixture::new(&snapshot);
        f.room.set_background(1, 1, "brick").unwrap();

        f.room.apply_clear().unwrap();

        assert_eq!(f.room.foreground(0, 0).unwrap().name, "shiny light grey");
        assert_eq!(f.room.foreground_id(2, 1), 1);
        assert_eq!(f.room.foreground(1, 1).unwrap().name, "empty");
        assert_eq!(f.room.background_id(1, 1), 0);
        assert_eq!(f.room.gold_coins(), 0);
        assert_eq!(f.room.active_keys().count(), 0);
        assert_eq!(
            f.events(),
            vec![
                RoomEvent::KeyDeactivated {
                    key: "blue key".to_string()
                },
                RoomEvent::KeyDeactivated {
                    key: "red key".to_string()
                },
                RoomEvent::Cleared,
            ]
        );
    }

    #[test]
    fn test_load_replaces_world() {
        let mut snapshot = snapshot(2, 1);
        snapshot.active_keys = vec![8];
        let mut f = Fixture::new(&snapshot);

        let mut reload = world(2, 1, &[6, 3], &[CellValue::Int(1310742), CellValue::Empty]);
        reload.gold_coins = 9;
        f.room.apply_load(&reload).unwrap();

        assert_eq!(f.room.foreground_id(0, 0), 6);
        assert_eq!(
            f.room.data(0, 0).unwrap(),
            Some(TileData::Portal(
                PortalPayload::new(5, 10, Direction::Right).unwrap()
            ))
        );
        assert_eq!(f.room.gold_coins(), 9);
        assert!(!f.room.is_key_active("blue key"));
        assert_eq!(
            f.events(),
            vec![
                RoomEvent::KeyDeactivated {
                    key: "blue key".to_string()
                },
                RoomEvent::Loaded,
            ]
        );
    }

    #[test]
    fn test_corrupt_load_changes_nothing() {
        let mut snapshot = snapshot(2, 1);
        snapshot.active_keys = vec![8];
        let mut f = Fixture::new(&snapshot);

        let mut reload = world(2, 1, &[6, 3], &[CellValue::Empty, CellValue::Empty]);
        reload.data = encode_metadata_layer(&[CellValue::Empty]).unwrap();
        assert!(f.room.apply_load(&reload).is_err());

        assert!(f.room.is_key_active("blue key"));
        assert_eq!(f.room.foreground_id(0, 0), 0);
        assert!(f.events().is_empty());
    }

    #[test]
    fn test_keys_and_crown() {
        let mut f = fixture(3, 3);
        f.room.activate_key(8, Some(2)).unwrap();
        assert!(f.room.is_key_active("blue key"));
        f.room.deactivate_key(8).unwrap();
        assert!(!f.room.is_key_active("blue key"));
        assert!(f.room.activate_key(200, None).is_err());

        f.room.set_crown(Some(2));
        f.room.participant_left(3);
        assert_eq!(f.room.crown(), Some(2));
        f.room.participant_left(2);
        assert_eq!(f.room.crown(), None);

        assert_eq!(
            f.events(),
            vec![
                RoomEvent::KeyActivated {
                    by: Some(2),
                    key: "blue key".to_string()
                },
                RoomEvent::KeyDeactivated {
                    key: "blue key".to_string()
                },
                RoomEvent::CrownChanged { holder: Some(2) },
                RoomEvent::CrownChanged { holder: None },
            ]
        );
    }

    #[test]
    fn test_inbound_settings_publish_only_changes() {
        let mut f = fixture(3, 3);
        f.room
            .apply_owner_info("secret", Category::Art, true, true);
        f.room.apply_update_info("arena", true, false);
        f.room.apply_play_count(3);

        assert_eq!(
            f.events(),
            vec![
                RoomEvent::CategoryChanged(Category::Art),
                RoomEvent::AutoSaveChanged(true),
                RoomEvent::NameChanged("arena".to_string()),
            ]
        );
        assert!(f.sent().is_empty());
    }

    #[test]
    fn test_commands() {
        let mut f = fixture(3, 3);
        f.room.save();
        f.room.set_drag(false);
        f.room.set_key_active(keys::RED, true).unwrap();
        assert!(f.room.set_key_active("gold key", true).is_err());
        assert!(matches!(
            f.room.set_key_active("basic", true),
            Err(WorldError::Validation(_))
        ));

        let sent = f.sent();
        assert!(matches!(sent[0], Packet::Save));
        assert!(matches!(sent[1], Packet::NoDrag { disabled: true }));
        assert!(matches!(
            sent[2],
            Packet::SetKeyActive {
                tile: 9,
                active: true
            }
        ));
        assert_eq!(sent.len(), 3);
    }
}
