//! # mumemap - live map support for MUME clients
//!
//! mumemap follows the player through the world of MUME (Multi-Users in
//! Middle-earth) by reading the game's XML mode output, and serves the
//! surrounding rooms from the published map data so a client can draw them.
//!
//! ## Features
//!
//! - **Streaming tag filter**: strips MUME XML mode tags from arbitrarily
//!   chunked server output, negotiates XML mode at login, and ignores rooms
//!   seen while scouting.
//! - **Position tracking**: each room name and description is hashed and
//!   looked up in the room index to find the player's coordinates.
//! - **On-demand map data**: index chunks and 20×20 zones are downloaded once
//!   and cached for the session; concurrent requests share one download.
//! - **Pluggable data sources**: HTTP (feature `http`), a local mirror of the
//!   data tree, or documents held in memory.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mumemap::mapper::{DirSource, MapDataSource, MapDisplay, MapSession, Room, RoomCoords};
//!
//! struct Printer;
//!
//! impl MapDisplay for Printer {
//!     fn on_movement(&self, here: RoomCoords) {
//!         println!("now at {}", here);
//!     }
//!     fn on_rooms(&self, rooms: &[Arc<Room>]) {
//!         println!("{} rooms to draw", rooms.len());
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let source: Arc<dyn MapDataSource> = Arc::new(DirSource::new("mapdata"));
//!     let mut session = MapSession::open(source, Arc::new(Printer), 20).await?;
//!     session.connected();
//!     let shown = session.feed("By what name do you wish to be known? ").await?;
//!     print!("{}", shown);
//!     for request in session.take_outbound() {
//!         // send `request` to the server
//!         let _ = request;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`markup`] - XML mode tag filter and scouting detection
//! - [`mapper`] - position tracking, room index, zone cache and sessions
//! - [`config`] - configuration loading and validation
//! - [`logutil`] - log formatting for game text
//! - [`metrics`] - process-wide counters

pub mod config;
pub mod logutil;
pub mod mapper;
pub mod markup;
pub mod metrics;
