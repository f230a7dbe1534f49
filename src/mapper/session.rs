//! One connection's worth of mapping.
//!
//! [`MapSession`] owns the tag filter and the path machine, shares the two
//! caches, and drives a [`MapDisplay`]. The host feeds it raw server output
//! and gets back the text to show; anything the session wants sent to the
//! server (the XML mode request) is collected for [`MapSession::take_outbound`].

use log::{debug, warn};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::mapper::coords::RoomCoords;
use crate::mapper::errors::MapperError;
use crate::mapper::index::RoomIndexCache;
use crate::mapper::path::PathMachine;
use crate::mapper::source::MapDataSource;
use crate::mapper::zones::ZoneDataCache;
use crate::mapper::{rooms_near, MapDisplay};
use crate::markup::{FilterEvent, MarkupMode, TagStreamFilter};

pub struct MapSession {
    filter: TagStreamFilter,
    filter_events: mpsc::UnboundedReceiver<FilterEvent>,
    path: PathMachine,
    movements: mpsc::UnboundedReceiver<RoomCoords>,
    index: Arc<RoomIndexCache>,
    zones: Arc<ZoneDataCache>,
    display: Arc<dyn MapDisplay>,
    view_radius: i32,
    outbound: Vec<String>,
}

impl MapSession {
    /// Load the map metadata from `source` and start a session on it.
    pub async fn open(
        source: Arc<dyn MapDataSource>,
        display: Arc<dyn MapDisplay>,
        view_radius: i32,
    ) -> Result<Self, MapperError> {
        let zones = Arc::new(ZoneDataCache::load(Arc::clone(&source)).await?);
        let index = Arc::new(RoomIndexCache::new(source));
        Ok(Self::new(index, zones, display, view_radius))
    }

    /// Start a session on existing caches, e.g. after a reconnect.
    pub fn new(
        index: Arc<RoomIndexCache>,
        zones: Arc<ZoneDataCache>,
        display: Arc<dyn MapDisplay>,
        view_radius: i32,
    ) -> Self {
        let (filter, filter_events) = TagStreamFilter::channel();
        let (movement_tx, movements) = mpsc::unbounded_channel();
        Self {
            filter,
            filter_events,
            path: PathMachine::new(Arc::clone(&index), movement_tx),
            movements,
            index,
            zones,
            display,
            view_radius,
            outbound: Vec::new(),
        }
    }

    pub fn index(&self) -> &Arc<RoomIndexCache> {
        &self.index
    }

    pub fn zones(&self) -> &Arc<ZoneDataCache> {
        &self.zones
    }

    pub fn markup_mode(&self) -> MarkupMode {
        self.filter.mode()
    }

    /// Last known player position.
    pub fn current(&self) -> Option<RoomCoords> {
        self.path.current()
    }

    /// A new connection to the server was made.
    pub fn connected(&mut self) {
        self.filter.connected();
        self.path.reset();
        self.outbound.clear();
    }

    /// Skip negotiation: XML mode was already requested by someone else.
    pub fn assume_markup(&mut self) {
        self.filter.offer_markup();
    }

    /// Requests to send to the server, in order.
    pub fn take_outbound(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outbound)
    }

    /// Process one chunk of server output and return the text to display.
    ///
    /// Room arrivals are resolved before this returns, and the display has
    /// been given the rooms around each new position. A room description
    /// arriving without its name aborts the chunk with
    /// [`MapperError::Protocol`]; the session stays usable.
    pub async fn feed(&mut self, raw: &str) -> Result<String, MapperError> {
        let plain = self.filter.filter_input_text(raw);

        while let Ok(event) = self.filter_events.try_recv() {
            match event {
                FilterEvent::NegotiationRequest(request) => self.outbound.push(request),
                FilterEvent::TagEnd(tag) => {
                    if let Err(e) = self.path.process_tag(&tag).await {
                        warn!("Map session: {}", e);
                        self.abandon_chunk();
                        return Err(e);
                    }
                }
            }
            while let Ok(here) = self.movements.try_recv() {
                self.show_area(here).await;
            }
        }
        Ok(plain)
    }

    fn abandon_chunk(&mut self) {
        while let Ok(event) = self.filter_events.try_recv() {
            if let FilterEvent::NegotiationRequest(request) = event {
                self.outbound.push(request);
            }
        }
        while self.movements.try_recv().is_ok() {}
        self.path.reset();
    }

    async fn show_area(&self, here: RoomCoords) {
        self.display.on_movement(here);
        let around = rooms_near(here, self.view_radius);
        let display = Arc::clone(&self.display);
        let rooms = self
            .zones
            .get_rooms_at(&around, |batch| {
                if !batch.is_empty() {
                    display.on_rooms(batch);
                }
            })
            .await;
        debug!("Map session: {} rooms around {}", rooms.len(), here);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::normalize::{chunk_of, hash_name_desc};
    use crate::mapper::room::Room;
    use crate::mapper::source::MemorySource;
    use crate::markup::XML_MODE_REQUEST;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        moves: Mutex<Vec<RoomCoords>>,
        rooms: Mutex<Vec<u32>>,
    }

    impl MapDisplay for Recorder {
        fn on_movement(&self, here: RoomCoords) {
            self.moves.lock().unwrap().push(here);
        }

        fn on_rooms(&self, rooms: &[Arc<Room>]) {
            self.rooms
                .lock()
                .unwrap()
                .extend(rooms.iter().map(|r| r.data.id));
        }
    }

    fn world() -> Arc<MemorySource> {
        let source = Arc::new(MemorySource::new());
        source.insert(
            "arda.json",
            json!({
                "directions": [], "maxX": 30, "maxY": 30, "maxZ": 0,
                "minX": 0, "minY": 0, "minZ": 0, "roomsCount": 1
            }),
        );
        let hash = hash_name_desc("A Flat Marsh", "Some text.\n");
        source.insert(
            format!("roomindex/{}.json", chunk_of(&hash)),
            json!({ hash: [[3, 4, 0]] }),
        );
        source.insert(
            "zone/0,0.json",
            json!([{
                "name": "A Flat Marsh", "desc": "Some text.\n", "id": 42,
                "x": 3, "y": 4, "z": 0, "exits": [], "sector": 10
            }]),
        );
        source
    }

    async fn session(source: &Arc<MemorySource>) -> (MapSession, Arc<Recorder>) {
        let display = Arc::new(Recorder::default());
        let dyn_source: Arc<dyn MapDataSource> = source.clone();
        let dyn_display: Arc<dyn MapDisplay> = display.clone();
        let mut session = MapSession::open(dyn_source, dyn_display, 1).await.unwrap();
        session.assume_markup();
        (session, display)
    }

    #[tokio::test]
    async fn room_tags_move_the_player() {
        let source = world();
        let (mut session, display) = session(&source).await;

        let out = session
            .feed(concat!(
                "<xml><room><name>A Flat Marsh</name>",
                "<description>Some text.\n</description></room>",
            ))
            .await
            .unwrap();
        assert_eq!(out, "A Flat MarshSome text.\n");
        assert_eq!(session.current(), Some(RoomCoords::new(3, 4, 0)));
        assert_eq!(*display.moves.lock().unwrap(), vec![RoomCoords::new(3, 4, 0)]);
        assert_eq!(*display.rooms.lock().unwrap(), vec![42]);
        assert_eq!(source.fetch_count("zone/0,0.json"), 1);
    }

    #[tokio::test]
    async fn protocol_error_abandons_chunk_only() {
        let source = world();
        let (mut session, display) = session(&source).await;

        let err = session
            .feed("<xml><description>Orphan.\n</description><name>A Flat Marsh</name>")
            .await
            .unwrap_err();
        assert!(matches!(err, MapperError::Protocol(_)));

        // The name after the bad description was dropped with the chunk.
        assert!(session
            .feed("<description>Some text.\n</description>")
            .await
            .is_err());

        session
            .feed("<name>A Flat Marsh</name><description>Some text.\n</description>")
            .await
            .unwrap();
        assert_eq!(display.moves.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn negotiation_request_is_queued() {
        let source = world();
        let (mut session, _display) = session(&source).await;
        session.connected();
        assert_eq!(session.markup_mode(), MarkupMode::NegotiationPending);

        let out = session.feed("By what name do you wish to be known? ").await.unwrap();
        assert_eq!(out, "By what name do you wish to be known? ");
        assert_eq!(session.take_outbound(), vec![XML_MODE_REQUEST.to_string()]);
        assert!(session.take_outbound().is_empty());
        assert_eq!(session.markup_mode(), MarkupMode::MarkupOffered);
    }

    #[tokio::test]
    async fn unknown_room_does_not_move() {
        let source = world();
        let (mut session, display) = session(&source).await;
        session
            .feed("<xml><name>Nowhere</name><description>Void.\n</description>")
            .await
            .unwrap();
        assert_eq!(session.current(), None);
        assert!(display.moves.lock().unwrap().is_empty());
    }
}
