//! Map geometry: global bounds, room coordinates, zone partitioning and the
//! dense spatial index shared by the room cache and display layers.

use serde::Deserialize;
use serde_json::Value;
use std::fmt;

use crate::mapper::errors::MapperError;

/// Arda is split into zone files this wide (in both x and y).
pub const ZONE_SIZE: i32 = 20;

/// Keys every `arda.json` must carry.
pub const REQUIRED_META_KEYS: &[&str] = &[
    "directions",
    "maxX",
    "maxY",
    "maxZ",
    "minX",
    "minY",
    "minZ",
    "roomsCount",
];

/// Global map description loaded once per session from `arda.json`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapMetaData {
    /// Direction table as published by the map exporter. Kept opaque.
    pub directions: Value,
    pub max_x: i32,
    pub max_y: i32,
    pub max_z: i32,
    pub min_x: i32,
    pub min_y: i32,
    pub min_z: i32,
    pub rooms_count: u64,
}

impl MapMetaData {
    /// Validate and decode the metadata document, reporting every missing key.
    pub fn from_json(json: Value) -> Result<Self, MapperError> {
        let missing = missing_keys(&json, REQUIRED_META_KEYS);
        if !missing.is_empty() {
            return Err(MapperError::Schema {
                context: "arda.json".to_string(),
                missing,
            });
        }
        let meta: MapMetaData = serde_json::from_value(json)?;
        if meta.min_x > meta.max_x || meta.min_y > meta.max_y || meta.min_z > meta.max_z {
            return Err(MapperError::Metadata(format!(
                "inverted bounds x {}..{} y {}..{} z {}..{}",
                meta.min_x, meta.max_x, meta.min_y, meta.max_y, meta.min_z, meta.max_z
            )));
        }
        Ok(meta)
    }

    /// Metadata with the given inclusive bounds and no direction table.
    pub fn with_bounds(min: (i32, i32, i32), max: (i32, i32, i32)) -> Self {
        Self {
            directions: Value::Array(Vec::new()),
            max_x: max.0,
            max_y: max.1,
            max_z: max.2,
            min_x: min.0,
            min_y: min.1,
            min_z: min.2,
            rooms_count: 0,
        }
    }

    pub fn contains(&self, c: RoomCoords) -> bool {
        self.contains_xy(c.x, c.y) && c.z >= self.min_z && c.z <= self.max_z
    }

    fn contains_xy(&self, x: i32, y: i32) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Zone holding the (x, y) column, or `None` outside the map.
    pub fn room_zone(&self, x: i32, y: i32) -> Option<ZoneId> {
        if !self.contains_xy(x, y) {
            return None;
        }
        Some(ZoneId::containing(x, y))
    }
}

/// Names from `required` that `json` lacks (everything, if it is not an object).
pub(crate) fn missing_keys(json: &Value, required: &[&str]) -> Vec<String> {
    match json.as_object() {
        Some(obj) => required
            .iter()
            .filter(|key| !obj.contains_key(**key))
            .map(|key| key.to_string())
            .collect(),
        None => required.iter().map(|key| key.to_string()).collect(),
    }
}

/// Room coordinates within the metadata bounds. Compared by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomCoords {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl RoomCoords {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for RoomCoords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RoomCoords({}, {}, {})", self.x, self.y, self.z)
    }
}

impl From<(i32, i32, i32)> for RoomCoords {
    fn from((x, y, z): (i32, i32, i32)) -> Self {
        Self::new(x, y, z)
    }
}

/// Server-side partition key: the floor-aligned south-west corner of a
/// `ZONE_SIZE` square. All z layers of a column share one zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ZoneId {
    pub x: i32,
    pub y: i32,
}

impl ZoneId {
    pub fn containing(x: i32, y: i32) -> Self {
        Self {
            x: x.div_euclid(ZONE_SIZE) * ZONE_SIZE,
            y: y.div_euclid(ZONE_SIZE) * ZONE_SIZE,
        }
    }

    /// Path of the zone file relative to the map data root.
    pub fn path(&self) -> String {
        format!("zone/{}.json", self)
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

/// `RoomCoords` shifted by the metadata minimums into array offsets.
#[derive(Debug, Clone, Copy)]
struct ZeroedCoords {
    x: usize,
    y: usize,
    z: usize,
}

type Column<T> = Vec<Option<T>>;
type Plane<T> = Vec<Option<Column<T>>>;

/// Stores values in an x/y/z indexed 3D array covering the metadata bounds.
///
/// Planes (per x) and columns (per x,y) are allocated on first write, so a
/// sparsely visited map stays cheap.
#[derive(Debug)]
pub struct SpatialIndex<T> {
    min: (i32, i32, i32),
    size: (usize, usize, usize),
    planes: Vec<Option<Plane<T>>>,
    len: usize,
}

impl<T> SpatialIndex<T> {
    pub fn new(meta: &MapMetaData) -> Self {
        let span = |min: i32, max: i32| (i64::from(max) - i64::from(min) + 1).max(0) as usize;
        let size = (
            span(meta.min_x, meta.max_x),
            span(meta.min_y, meta.max_y),
            span(meta.min_z, meta.max_z),
        );
        Self {
            min: (meta.min_x, meta.min_y, meta.min_z),
            size,
            planes: std::iter::repeat_with(|| None).take(size.0).collect(),
            len: 0,
        }
    }

    fn zeroed(&self, c: RoomCoords) -> Option<ZeroedCoords> {
        let offset = |v: i32, min: i32, size: usize| {
            let off = i64::from(v) - i64::from(min);
            if off < 0 || off >= size as i64 {
                None
            } else {
                Some(off as usize)
            }
        };
        Some(ZeroedCoords {
            x: offset(c.x, self.min.0, self.size.0)?,
            y: offset(c.y, self.min.1, self.size.1)?,
            z: offset(c.z, self.min.2, self.size.2)?,
        })
    }

    /// Store `what` at `c`. Returns false (and stores nothing) out of bounds.
    pub fn set(&mut self, c: RoomCoords, what: T) -> bool {
        let Some(zero) = self.zeroed(c) else {
            return false;
        };
        let (size_y, size_z) = (self.size.1, self.size.2);
        let plane = self.planes[zero.x]
            .get_or_insert_with(|| std::iter::repeat_with(|| None).take(size_y).collect());
        let column = plane[zero.y]
            .get_or_insert_with(|| std::iter::repeat_with(|| None).take(size_z).collect());
        if column[zero.z].replace(what).is_none() {
            self.len += 1;
        }
        true
    }

    pub fn get(&self, c: RoomCoords) -> Option<&T> {
        let zero = self.zeroed(c)?;
        self.planes[zero.x].as_ref()?[zero.y].as_ref()?[zero.z].as_ref()
    }

    pub fn contains(&self, c: RoomCoords) -> bool {
        self.get(c).is_some()
    }

    /// Number of occupied cells.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn small_meta() -> MapMetaData {
        MapMetaData::with_bounds((-30, -5, -2), (45, 50, 3))
    }

    #[test]
    fn spatial_index_round_trips_every_cell() {
        let meta = MapMetaData::with_bounds((-3, -2, -1), (4, 3, 1));
        let mut index = SpatialIndex::new(&meta);
        for x in meta.min_x..=meta.max_x {
            for y in meta.min_y..=meta.max_y {
                for z in meta.min_z..=meta.max_z {
                    let c = RoomCoords::new(x, y, z);
                    let value = format!("{}", c);
                    assert!(index.set(c, value.clone()));
                    assert_eq!(index.get(c), Some(&value));
                }
            }
        }
        assert_eq!(index.len(), 8 * 6 * 3);
    }

    #[test]
    fn spatial_index_rejects_out_of_bounds() {
        let meta = small_meta();
        let mut index = SpatialIndex::new(&meta);
        assert!(!index.set(RoomCoords::new(46, 0, 0), 1));
        assert!(!index.set(RoomCoords::new(0, -6, 0), 1));
        assert!(!index.set(RoomCoords::new(0, 0, 4), 1));
        assert!(index.get(RoomCoords::new(-31, 0, 0)).is_none());
        assert!(index.is_empty());
    }

    #[test]
    fn spatial_index_overwrite_keeps_count() {
        let mut index = SpatialIndex::new(&small_meta());
        let c = RoomCoords::new(1, 2, 3);
        index.set(c, "a");
        index.set(c, "b");
        assert_eq!(index.len(), 1);
        assert_eq!(index.get(c), Some(&"b"));
        assert!(!index.contains(RoomCoords::new(1, 2, 2)));
    }

    #[test]
    fn zone_partition_covers_bounds_only() {
        let meta = small_meta();
        for x in meta.min_x - 2..=meta.max_x + 2 {
            for y in meta.min_y - 2..=meta.max_y + 2 {
                let inside =
                    x >= meta.min_x && x <= meta.max_x && y >= meta.min_y && y <= meta.max_y;
                let zone = meta.room_zone(x, y);
                assert_eq!(zone.is_some(), inside, "({}, {})", x, y);
                if let Some(zone) = zone {
                    assert!(zone.x <= x && x < zone.x + ZONE_SIZE);
                    assert!(zone.y <= y && y < zone.y + ZONE_SIZE);
                    assert_eq!(zone.x.rem_euclid(ZONE_SIZE), 0);
                }
            }
        }
    }

    #[test]
    fn zone_keys_are_floor_aligned() {
        assert_eq!(ZoneId::containing(0, 0).to_string(), "0,0");
        assert_eq!(ZoneId::containing(19, 20).to_string(), "0,20");
        assert_eq!(ZoneId::containing(-1, -20).to_string(), "-20,-20");
        assert_eq!(ZoneId::containing(-21, 41).path(), "zone/-40,40.json");
    }

    #[test]
    fn coords_compare_by_value() {
        use std::collections::HashSet;
        let a = RoomCoords::new(1, 2, 3);
        let b = RoomCoords::from((1, 2, 3));
        assert_eq!(a, b);
        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
        assert_eq!(a.to_string(), "RoomCoords(1, 2, 3)");
    }

    #[test]
    fn metadata_reports_all_missing_keys() {
        let err = MapMetaData::from_json(json!({ "minX": 0, "maxX": 10, "directions": [] }))
            .unwrap_err();
        match err {
            MapperError::Schema { context, missing } => {
                assert_eq!(context, "arda.json");
                assert_eq!(missing, vec!["maxY", "maxZ", "minY", "minZ", "roomsCount"]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn metadata_decodes_camel_case() {
        let meta = MapMetaData::from_json(json!({
            "directions": {"north": 0},
            "maxX": 10, "maxY": 11, "maxZ": 2,
            "minX": -10, "minY": -11, "minZ": -2,
            "roomsCount": 42
        }))
        .unwrap();
        assert_eq!(meta.rooms_count, 42);
        assert!(meta.contains(RoomCoords::new(10, -11, 2)));
        assert!(!meta.contains(RoomCoords::new(10, -11, 3)));
    }

    #[test]
    fn metadata_rejects_inverted_bounds() {
        let err = MapMetaData::from_json(json!({
            "directions": [],
            "maxX": 0, "maxY": 0, "maxZ": 0,
            "minX": 5, "minY": 0, "minZ": 0,
            "roomsCount": 0
        }))
        .unwrap_err();
        assert!(matches!(err, MapperError::Metadata(_)));
    }
}
