//! # Mapper
//!
//! Locating the player on the MUME world map and serving the rooms around
//! them.
//!
//! ## Components
//!
//! - [`path`] - turns `name`/`description` tag events into positions
//! - [`index`] - `roomindex/{xx}.json` chunks mapping room hashes to coordinates
//! - [`zones`] - `zone/{x},{y}.json` room records and `arda.json` metadata
//! - [`coords`] - coordinates, zones and the sparse 3D [`SpatialIndex`]
//! - [`normalize`] - text normalization and the name/description hash
//! - [`source`] - where map data comes from (HTTP, a local mirror, memory)
//! - [`session`] - wires the tag filter, path machine, caches and display
//!
//! ## Data flow
//!
//! ```text
//! server output ─► TagStreamFilter ─► PathMachine ─► RoomIndexCache
//!                        │                 │
//!                   plain text        movement ─► MapDisplay
//!                                          │
//!                                          └──► ZoneDataCache ─► MapDisplay
//! ```
//!
//! All downloads go through [`MapDataSource`] and happen at most once per
//! chunk or zone at a time, however many callers wait for them.

pub mod coords;
pub mod errors;
pub mod index;
mod inflight;
pub mod normalize;
pub mod path;
pub mod room;
pub mod session;
pub mod source;
pub mod zones;

use std::sync::Arc;

pub use coords::{MapMetaData, RoomCoords, SpatialIndex, ZoneId, ZONE_SIZE};
pub use errors::{FetchError, MapperError};
pub use index::RoomIndexCache;
pub use path::PathMachine;
pub use room::{ExitData, Room, RoomData, Sector};
pub use session::MapSession;
#[cfg(feature = "http")]
pub use source::HttpSource;
pub use source::{DirSource, MapDataSource, MemorySource};
pub use zones::{ZoneDataCache, ZoneFetch};

/// Default half-width of the square of rooms shown around the player.
pub const DEFAULT_VIEW_RADIUS: i32 = 20;

/// Largest view radius; the display asks for (2r+1)² rooms per move.
pub const MAX_VIEW_RADIUS: i32 = 100;

/// Receives map updates. Implemented by whatever renders the map.
pub trait MapDisplay: Send + Sync {
    /// The player is now at `here`.
    fn on_movement(&self, here: RoomCoords);

    /// Rooms near the player became available. Called repeatedly as zones
    /// arrive, each room once per movement.
    fn on_rooms(&self, rooms: &[Arc<Room>]);
}

/// Coordinates of the `(2 * radius + 1)²` square centered on `here`, on the
/// same z layer, row by row. The radius is clamped to [`MAX_VIEW_RADIUS`].
pub fn rooms_near(here: RoomCoords, radius: i32) -> Vec<RoomCoords> {
    let radius = radius.clamp(0, MAX_VIEW_RADIUS);
    let side = (2 * radius + 1) as usize;
    let mut out = Vec::with_capacity(side * side);
    for y in here.y.saturating_sub(radius)..=here.y.saturating_add(radius) {
        for x in here.x.saturating_sub(radius)..=here.x.saturating_add(radius) {
            out.push(RoomCoords::new(x, y, here.z));
        }
    }
    out
}
