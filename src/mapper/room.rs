//! Room records as published in the zone files.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::convert::TryFrom;
use std::fmt;

use crate::mapper::coords::{missing_keys, RoomCoords};
use crate::mapper::errors::MapperError;

/// Keys every room record must carry.
pub const REQUIRED_ROOM_KEYS: &[&str] = &["name", "desc", "id", "x", "y", "z", "exits"];

/// Terrain category of a room, as numbered by the map exporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Sector {
    #[default]
    Undefined,
    Inside,
    City,
    Field,
    Forest,
    Hills,
    Mountain,
    WaterShallow,
    Water,
    WaterNoBoat,
    Underwater,
    Road,
    Brush,
    Tunnel,
    Cavern,
    Deathtrap,
}

impl Sector {
    pub const COUNT: u8 = 16;

    pub const ALL: [Sector; 16] = [
        Sector::Undefined,
        Sector::Inside,
        Sector::City,
        Sector::Field,
        Sector::Forest,
        Sector::Hills,
        Sector::Mountain,
        Sector::WaterShallow,
        Sector::Water,
        Sector::WaterNoBoat,
        Sector::Underwater,
        Sector::Road,
        Sector::Brush,
        Sector::Tunnel,
        Sector::Cavern,
        Sector::Deathtrap,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sector::Undefined => "undefined",
            Sector::Inside => "inside",
            Sector::City => "city",
            Sector::Field => "field",
            Sector::Forest => "forest",
            Sector::Hills => "hills",
            Sector::Mountain => "mountain",
            Sector::WaterShallow => "shallow water",
            Sector::Water => "water",
            Sector::WaterNoBoat => "rapids",
            Sector::Underwater => "underwater",
            Sector::Road => "road",
            Sector::Brush => "brush",
            Sector::Tunnel => "tunnel",
            Sector::Cavern => "cavern",
            Sector::Deathtrap => "deathtrap",
        }
    }
}

impl TryFrom<u8> for Sector {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Sector::ALL
            .get(value as usize)
            .copied()
            .ok_or_else(|| format!("unknown sector type {}", value))
    }
}

impl From<Sector> for u8 {
    fn from(sector: Sector) -> u8 {
        sector as u8
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the six exits of a room (north, east, south, west, up, down).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitData {
    #[serde(default)]
    pub flags: u32,
    #[serde(default)]
    pub dflags: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "in")]
    pub inbound: Vec<u32>,
    #[serde(default, rename = "out")]
    pub outbound: Vec<u32>,
}

impl ExitData {
    /// An exit leads somewhere when it has at least one outbound link.
    pub fn is_open(&self) -> bool {
        !self.outbound.is_empty()
    }
}

/// Room record as stored in `zone/{x},{y}.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomData {
    pub name: String,
    pub desc: String,
    pub id: u32,
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub exits: Vec<ExitData>,
    #[serde(default)]
    pub sector: Sector,
    #[serde(default)]
    pub mobflags: u64,
    #[serde(default)]
    pub loadflags: u64,
}

impl RoomData {
    /// Validate one record from a zone file. `context` names the zone and
    /// record index for diagnostics.
    pub fn from_json(json: Value, context: &str) -> Result<Self, MapperError> {
        let missing = missing_keys(&json, REQUIRED_ROOM_KEYS);
        if !missing.is_empty() {
            return Err(MapperError::Schema {
                context: context.to_string(),
                missing,
            });
        }
        Ok(serde_json::from_value(json)?)
    }
}

/// A validated room.
#[derive(Debug, Clone, PartialEq)]
pub struct Room {
    pub data: RoomData,
}

impl Room {
    pub fn new(data: RoomData) -> Self {
        Self { data }
    }

    pub fn coords(&self) -> RoomCoords {
        RoomCoords::new(self.data.x, self.data.y, self.data.z)
    }

    pub fn name(&self) -> &str {
        &self.data.name
    }

    pub fn sector(&self) -> Sector {
        self.data.sector
    }
}
