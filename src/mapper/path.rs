//! Turns tag-close events into room arrivals.
//!
//! This is a naive exact search on room name and description, with no
//! "path" to speak of: a `name` tag is remembered, the following
//! `description` completes the room, and the pair is looked up in the room
//! index. A `room` tag boundary forgets any pending name.

use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::logutil::escape_log;
use crate::mapper::coords::RoomCoords;
use crate::mapper::errors::MapperError;
use crate::mapper::index::RoomIndexCache;
use crate::markup::Tag;
use crate::metrics;

pub struct PathMachine {
    index: Arc<RoomIndexCache>,
    movements: mpsc::UnboundedSender<RoomCoords>,
    room_name: Option<String>,
    current: Option<RoomCoords>,
}

impl PathMachine {
    /// Resolved positions are sent on `movements`.
    pub fn new(index: Arc<RoomIndexCache>, movements: mpsc::UnboundedSender<RoomCoords>) -> Self {
        Self {
            index,
            movements,
            room_name: None,
            current: None,
        }
    }

    /// Last resolved position, kept when later rooms cannot be resolved.
    pub fn current(&self) -> Option<RoomCoords> {
        self.current
    }

    /// Forget the pending room name (new session or broken stream).
    pub fn reset(&mut self) {
        self.room_name = None;
    }

    /// Handle one closed tag.
    ///
    /// Returns the new position when this tag completed a room that the
    /// index knows. A description without a preceding name is a protocol
    /// violation.
    pub async fn process_tag(&mut self, tag: &Tag) -> Result<Option<RoomCoords>, MapperError> {
        match tag.name.as_str() {
            "name" => {
                self.room_name = Some(tag.text.clone());
                Ok(None)
            }
            "description" => match self.room_name.take() {
                Some(name) => Ok(self.enter_room(&name, &tag.text).await),
                None => Err(MapperError::Protocol(format!(
                    "room description without a room name: {}",
                    escape_log(&tag.text)
                ))),
            },
            "room" => {
                self.room_name = None;
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    async fn enter_room(&mut self, name: &str, desc: &str) -> Option<RoomCoords> {
        let candidates = match self.index.find_pos_by_name_desc(name, desc).await {
            Ok(Some(candidates)) => candidates,
            Ok(None) => {
                info!("Path machine: no position for {}", escape_log(name));
                return None;
            }
            Err(e) => {
                warn!("Path machine: lookup of {} failed: {}", escape_log(name), e);
                return None;
            }
        };

        let here = *candidates.first()?;
        if candidates.len() > 1 {
            debug!(
                "Path machine: {} matches {} rooms, using {}",
                escape_log(name),
                candidates.len(),
                here
            );
        }
        self.current = Some(here);
        metrics::inc_movements();
        if self.movements.send(here).is_err() {
            debug!("Path machine: movement receiver gone");
        }
        Some(here)
    }
}
