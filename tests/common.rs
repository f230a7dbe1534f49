//! Test utilities & fixtures.
//! A tiny world of three rooms spread over two zones, served from memory or
//! written out as a mirrored data tree.

use serde_json::{json, Value};
use std::path::Path;
use std::sync::{Arc, Mutex};

use mumemap::mapper::normalize::{chunk_of, hash_name_desc};
use mumemap::mapper::{MapDisplay, MemorySource, Room, RoomCoords};

pub const MARSH_NAME: &str = "A Flat Marsh";
pub const MARSH_DESC: &str =
    "The few, low patches of tangled rushes add a clear tone to the\nsurrounding marsh.\n";
pub const BRIDGE_NAME: &str = "Stone Bridge";
pub const BRIDGE_DESC: &str = "A narrow bridge spans the river.\n";

/// Marsh (5,5,0) and shrub (6,5,0) share zone 0,0; the bridge (25,5,0) is in zone 20,0.
pub fn documents() -> Vec<(String, Value)> {
    let mut docs = vec![
        (
            "arda.json".to_string(),
            json!({
                "directions": ["north", "east", "south", "west", "up", "down"],
                "maxX": 39, "maxY": 19, "maxZ": 0,
                "minX": 0, "minY": 0, "minZ": 0,
                "roomsCount": 3
            }),
        ),
        (
            "zone/0,0.json".to_string(),
            json!([
                room(1, MARSH_NAME, MARSH_DESC, 5, 5, 10),
                room(2, "A Large Shrub", "Mud everywhere.\n", 6, 5, 10),
            ]),
        ),
        (
            "zone/20,0.json".to_string(),
            json!([room(3, BRIDGE_NAME, BRIDGE_DESC, 25, 5, 0)]),
        ),
    ];
    let mut chunks: std::collections::HashMap<String, serde_json::Map<String, Value>> =
        Default::default();
    for (name, desc, coords) in [
        (MARSH_NAME, MARSH_DESC, json!([[5, 5, 0]])),
        (BRIDGE_NAME, BRIDGE_DESC, json!([[25, 5, 0]])),
    ] {
        let hash = hash_name_desc(name, desc);
        chunks
            .entry(format!("roomindex/{}.json", chunk_of(&hash)))
            .or_default()
            .insert(hash, coords);
    }
    docs.extend(chunks.into_iter().map(|(path, map)| (path, Value::Object(map))));
    docs
}

fn room(id: u32, name: &str, desc: &str, x: i32, y: i32, sector: u8) -> Value {
    json!({
        "name": name, "desc": desc, "id": id,
        "x": x, "y": y, "z": 0,
        "exits": [{}, {"out": [id + 1]}, {}, {}, {}, {}],
        "sector": sector
    })
}

#[allow(dead_code)]
pub fn memory_world() -> Arc<MemorySource> {
    let source = Arc::new(MemorySource::new());
    for (path, doc) in documents() {
        source.insert(path, doc);
    }
    source
}

/// Write the world as a data tree under `root`.
#[allow(dead_code)]
pub fn write_world(root: &Path) {
    for (path, doc) in documents() {
        let target = root.join(&path);
        std::fs::create_dir_all(target.parent().unwrap()).unwrap();
        std::fs::write(target, serde_json::to_vec_pretty(&doc).unwrap()).unwrap();
    }
}

/// Server output for one room, as MUME sends it in XML mode.
#[allow(dead_code)]
pub fn room_markup(name: &str, desc: &str) -> String {
    format!(
        "<room><name>{}</name>\n<description>{}</description>Exits: north.\n</room>",
        name, desc
    )
}

#[derive(Default)]
pub struct Recorder {
    pub moves: Mutex<Vec<RoomCoords>>,
    pub batches: Mutex<Vec<Vec<u32>>>,
}

#[allow(dead_code)]
impl Recorder {
    pub fn moves(&self) -> Vec<RoomCoords> {
        self.moves.lock().unwrap().clone()
    }

    pub fn room_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.batches.lock().unwrap().iter().flatten().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl MapDisplay for Recorder {
    fn on_movement(&self, here: RoomCoords) {
        self.moves.lock().unwrap().push(here);
    }

    fn on_rooms(&self, rooms: &[Arc<Room>]) {
        self.batches
            .lock()
            .unwrap()
            .push(rooms.iter().map(|r| r.data.id).collect());
    }
}
