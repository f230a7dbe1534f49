//! Zone-partitioned room data, downloaded on demand and cached for the session.
//!
//! Rooms live in `zone/{x},{y}.json` files, one per `ZONE_SIZE` square of the
//! x/y plane (all z layers included). A zone is either unknown, cached (every
//! record valid), or known to be missing on the server. Cached and missing
//! zones are never downloaded again; anything else is retried on demand.

use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, error, info, warn};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::mapper::coords::{MapMetaData, RoomCoords, SpatialIndex, ZoneId};
use crate::mapper::errors::{FetchError, MapperError};
use crate::mapper::inflight::{InFlight, Pending};
use crate::mapper::room::{Room, RoomData};
use crate::mapper::source::{lock, MapDataSource};
use crate::metrics;

/// Path of the metadata document.
pub const METADATA_PATH: &str = "arda.json";

#[derive(Debug)]
struct ZoneState {
    rooms: SpatialIndex<Arc<Room>>,
    cached_zones: HashSet<ZoneId>,
    missing_zones: HashSet<ZoneId>,
}

/// How a zone download settled.
#[derive(Debug, Clone)]
pub enum ZoneFetch {
    /// Rooms admitted from the file (possibly a subset if some were invalid).
    Loaded(Arc<Vec<Arc<Room>>>),
    /// The zone does not exist on the server.
    Missing,
    /// Transient failure; the zone stays retryable.
    Failed(FetchError),
}

pub struct ZoneDataCache {
    source: Arc<dyn MapDataSource>,
    meta: Arc<MapMetaData>,
    state: Arc<Mutex<ZoneState>>,
    inflight: InFlight<ZoneId, ZoneFetch>,
}

impl ZoneDataCache {
    /// Download `arda.json` and build an empty cache around it.
    pub async fn load(source: Arc<dyn MapDataSource>) -> Result<Self, MapperError> {
        let json = source
            .fetch_json(METADATA_PATH)
            .await
            .map_err(|e| MapperError::Fetch {
                path: METADATA_PATH.to_string(),
                source: e,
            })?;
        let meta = MapMetaData::from_json(json)?;
        info!(
            "Map metadata loaded from {}: {} rooms, x {}..{} y {}..{} z {}..{}",
            source.describe(),
            meta.rooms_count,
            meta.min_x,
            meta.max_x,
            meta.min_y,
            meta.max_y,
            meta.min_z,
            meta.max_z
        );
        Ok(Self::with_metadata(source, meta))
    }

    pub fn with_metadata(source: Arc<dyn MapDataSource>, meta: MapMetaData) -> Self {
        let state = ZoneState {
            rooms: SpatialIndex::new(&meta),
            cached_zones: HashSet::new(),
            missing_zones: HashSet::new(),
        };
        Self {
            source,
            meta: Arc::new(meta),
            state: Arc::new(Mutex::new(state)),
            inflight: InFlight::new(),
        }
    }

    pub fn metadata(&self) -> &MapMetaData {
        &self.meta
    }

    /// Zone holding (x, y), or `None` outside the map.
    pub fn room_zone(&self, x: i32, y: i32) -> Option<ZoneId> {
        self.meta.room_zone(x, y)
    }

    pub fn is_zone_cached(&self, zone: ZoneId) -> bool {
        lock(&self.state).cached_zones.contains(&zone)
    }

    pub fn is_zone_missing(&self, zone: ZoneId) -> bool {
        lock(&self.state).missing_zones.contains(&zone)
    }

    /// Room from memory only; never downloads.
    pub fn room_at_cached(&self, c: RoomCoords) -> Option<Arc<Room>> {
        lock(&self.state).rooms.get(c).cloned()
    }

    /// Number of rooms in memory.
    pub fn cached_rooms(&self) -> usize {
        lock(&self.state).rooms.len()
    }

    fn download(&self, zone: ZoneId) -> Pending<ZoneFetch> {
        let source = Arc::clone(&self.source);
        let state = Arc::clone(&self.state);
        self.inflight
            .join(zone, move || download_zone(source, state, zone))
    }

    /// Fetch one room from the cache or the server.
    pub async fn get_room_at(&self, c: RoomCoords) -> Option<Arc<Room>> {
        if !self.meta.contains(c) {
            return None;
        }
        let zone = self.meta.room_zone(c.x, c.y)?;
        {
            let state = lock(&self.state);
            if state.missing_zones.contains(&zone) {
                return None;
            }
            if state.cached_zones.contains(&zone) {
                return state.rooms.get(c).cloned();
            }
        }

        match self.download(zone).await {
            ZoneFetch::Loaded(_) => self.room_at_cached(c),
            ZoneFetch::Missing | ZoneFetch::Failed(_) => None,
        }
    }

    /// Fetch rooms at many coordinates, delivering them incrementally.
    ///
    /// Rooms already in memory are passed to `on_partial` first. Every zone
    /// that has to be downloaded is fetched once, however many coordinates
    /// fall in it, and its requested rooms are passed to `on_partial` as soon
    /// as it arrives. The returned vector holds every resolved room exactly
    /// once, after all downloads settled. Coordinates without a room are
    /// simply absent.
    pub async fn get_rooms_at<F>(
        &self,
        coordinates: &[RoomCoords],
        mut on_partial: F,
    ) -> Vec<Arc<Room>>
    where
        F: FnMut(&[Arc<Room>]),
    {
        let mut seen = HashSet::with_capacity(coordinates.len());
        let mut to_download: HashMap<ZoneId, HashSet<RoomCoords>> = HashMap::new();
        let mut rooms = Vec::new();

        {
            let state = lock(&self.state);
            for &c in coordinates {
                if !seen.insert(c) || !self.meta.contains(c) {
                    continue;
                }
                let Some(zone) = self.meta.room_zone(c.x, c.y) else {
                    continue;
                };
                if state.missing_zones.contains(&zone) {
                    continue;
                }
                if state.cached_zones.contains(&zone) {
                    if let Some(room) = state.rooms.get(c) {
                        rooms.push(Arc::clone(room));
                    }
                } else {
                    to_download.entry(zone).or_default().insert(c);
                }
            }
        }

        on_partial(&rooms);

        let mut downloads: FuturesUnordered<_> = to_download
            .into_iter()
            .map(|(zone, needed)| {
                debug!("Downloading map zone {} for {} rooms", zone, needed.len());
                let pending = self.download(zone);
                async move { (zone, needed, pending.await) }
            })
            .collect();

        while let Some((zone, needed, outcome)) = downloads.next().await {
            if let ZoneFetch::Loaded(loaded) = outcome {
                let batch: Vec<Arc<Room>> = loaded
                    .iter()
                    .filter(|room| needed.contains(&room.coords()))
                    .cloned()
                    .collect();
                debug!("Zone {} delivered {} requested rooms", zone, batch.len());
                on_partial(&batch);
                rooms.extend(batch);
            }
        }

        rooms
    }
}

async fn download_zone(
    source: Arc<dyn MapDataSource>,
    state: Arc<Mutex<ZoneState>>,
    zone: ZoneId,
) -> ZoneFetch {
    let path = zone.path();
    info!("Downloading map zone {}", zone);

    match source.fetch_json(&path).await {
        Ok(json) => {
            metrics::inc_zones_downloaded();
            ZoneFetch::Loaded(Arc::new(cache_zone(&mut lock(&state), zone, json)))
        }
        Err(FetchError::NotFound) => {
            // Not an error: zones without data simply don't get drawn.
            info!("Map zone {} does not exist", zone);
            metrics::inc_zones_missing();
            lock(&state).missing_zones.insert(zone);
            ZoneFetch::Missing
        }
        Err(e) => {
            metrics::inc_fetch_failures();
            error!("Downloading map zone {} failed: {}", zone, e);
            ZoneFetch::Failed(e)
        }
    }
}

/// Validate and store a downloaded zone. Returns the rooms admitted. The zone
/// is marked cached only when every record was valid.
fn cache_zone(state: &mut ZoneState, zone: ZoneId, json: Value) -> Vec<Arc<Room>> {
    let Value::Array(records) = json else {
        error!("Expected an array of rooms for zone {}", zone);
        return Vec::new();
    };

    let mut admitted = Vec::with_capacity(records.len());
    let mut rejected = 0u64;
    for (i, record) in records.into_iter().enumerate() {
        let context = format!("room #{} of zone {}", i, zone);
        let room = match RoomData::from_json(record, &context) {
            Ok(data) => Arc::new(Room::new(data)),
            Err(e) => {
                error!("{}", e);
                rejected += 1;
                continue;
            }
        };
        if !state.rooms.set(room.coords(), Arc::clone(&room)) {
            warn!("Out of bounds {} in {}", room.coords(), context);
            rejected += 1;
            continue;
        }
        admitted.push(room);
    }

    if rejected == 0 {
        state.cached_zones.insert(zone);
        debug!("Cached {} rooms for zone {}", admitted.len(), zone);
    } else {
        metrics::add_records_rejected(rejected);
        warn!(
            "Zone {}: {} invalid records, {} rooms usable; zone will be retried",
            zone,
            rejected,
            admitted.len()
        );
    }
    admitted
}
