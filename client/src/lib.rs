//! # Room Client Library
//!
//! This library provides the client-side replica of a tile-based multiplayer
//! room. It keeps a local copy of the world in sync with a remote authority,
//! applies the local participant's edits optimistically and forwards them in
//! small batches, and turns everything the authority reports into typed events.
//!
//! ## Architecture Overview
//!
//! The authority owns the canonical world. This client never arbitrates
//! conflicts; it mirrors what it is told and predicts only its own edits.
//!
//! ### Optimistic Local Edits
//! Placing a tile or changing a tile's data updates the replica immediately.
//! Nothing is published for these edits, since the caller already knows what it
//! did. The edit is queued for the authority instead.
//!
//! ### Batched Modifications
//! Painting produces bursts of edits. Each kind of edit (foreground, background,
//! tile data) is collected for a few milliseconds and sent as one packet. A data
//! edit always pushes out pending foreground edits first so the authority sees
//! the tile before the data that belongs to it.
//!
//! ### Authoritative Updates
//! Edits made by other participants, reloads, clears, trigger switches and
//! setting changes arrive as packets. They are applied without re-validation and
//! always published as a [`events::RoomEvent`] attributed to whoever caused them.
//!
//! ## Module Organization
//!
//! ### Room Module (`room`)
//! The world replica: grids, the metadata layer, active keys and room settings.
//!
//! ### Batcher Module (`batcher`)
//! Deadline-driven coalescing of outbound edits.
//!
//! ### Notifier Module (`notifier`)
//! Scalar settings that publish an event only when their value really changes.
//!
//! ### Events Module (`events`)
//! The closed set of domain events and the channel they travel on.
//!
//! ### Roster Module (`roster`)
//! Participants in the room with their positions and coin counts.
//!
//! ### Session Module (`session`)
//! Dispatch of inbound packets into the roster and the room.
//!
//! ### Command Module (`command`)
//! A cloneable [`command::RoomHandle`] for editing the room while the client runs.
//!
//! ### Network Module (`network`)
//! UDP transport, the outbound packet queue and the main `tokio::select!` loop.
//!
//! ## Usage Example
//!
//! ```no_run
//! use client::events::EventBus;
//! use client::network::Client;
//! use client::room::RoomConfig;
//! use shared::TileCatalog;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example(catalog: TileCatalog) -> Result<(), Box<dyn std::error::Error>> {
//! let (events, mut rx) = EventBus::channel();
//! let mut client = Client::new(
//!     "127.0.0.1:8080",
//!     "builder",
//!     "lobby",
//!     Arc::new(catalog),
//!     RoomConfig::default(),
//!     events,
//! )
//! .await?;
//! client.join(Duration::from_secs(5)).await?;
//!
//! tokio::spawn(async move {
//!     while let Some(event) = rx.recv().await {
//!         println!("{:?}", event);
//!     }
//! });
//!
//! let room = client.handle();
//! let painter = async move {
//!     for x in 1..10 {
//!         if let Err(e) = room.set_foreground(x, 4, "basic").await {
//!             eprintln!("edit rejected: {}", e);
//!         }
//!     }
//! };
//! let (result, ()) = tokio::join!(client.run(), painter);
//! result?;
//! client.disconnect().await?;
//! # Ok(())
//! # }
//! ```

pub mod batcher;
pub mod command;
pub mod events;
pub mod network;
pub mod notifier;
pub mod room;
pub mod roster;
pub mod session;
