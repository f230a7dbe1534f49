//! Queries and caches the server-hosted room index.
//!
//! The index maps `md5(name + "\n" + desc)` to the coordinates of every room
//! with that text. It is split by the first two hex characters of the hash
//! into `roomindex/{xx}.json` chunks which are downloaded on first use and
//! kept for the session.

use log::{debug, error, info, warn};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::logutil::escape_log;
use crate::mapper::coords::RoomCoords;
use crate::mapper::errors::{FetchError, MapperError};
use crate::mapper::inflight::InFlight;
use crate::mapper::normalize::{chunk_of, hash_name_desc};
use crate::mapper::source::{lock, MapDataSource};
use crate::metrics;

#[derive(Debug, Default)]
struct IndexState {
    entries: HashMap<String, Vec<RoomCoords>>,
    cached_chunks: HashSet<String>,
}

/// Result of merging one downloaded chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkStats {
    pub added: usize,
    pub skipped: usize,
}

/// Settled state of a chunk download, shared by every waiting lookup.
#[derive(Debug, Clone)]
enum ChunkStatus {
    Ready,
    Malformed(Arc<String>),
    Unavailable(FetchError),
}

pub struct RoomIndexCache {
    source: Arc<dyn MapDataSource>,
    state: Arc<Mutex<IndexState>>,
    inflight: InFlight<String, ChunkStatus>,
}

impl RoomIndexCache {
    pub fn new(source: Arc<dyn MapDataSource>) -> Self {
        Self {
            source,
            state: Arc::new(Mutex::new(IndexState::default())),
            inflight: InFlight::new(),
        }
    }

    /// Candidate coordinates for a room, downloading its chunk if needed.
    ///
    /// `Ok(None)` means the room is not in the index; that is common (renamed
    /// or unmapped rooms) and not an error. Several candidates are possible
    /// when rooms share their text.
    pub async fn find_pos_by_name_desc(
        &self,
        name: &str,
        desc: &str,
    ) -> Result<Option<Vec<RoomCoords>>, MapperError> {
        let hash = hash_name_desc(name, desc);
        let chunk = chunk_of(&hash).to_string();

        if !self.is_chunk_cached(&chunk) {
            let source = Arc::clone(&self.source);
            let state = Arc::clone(&self.state);
            let key = chunk.clone();
            let status = self
                .inflight
                .join(chunk.clone(), move || download_chunk(source, state, key))
                .await;
            match status {
                ChunkStatus::Ready => {}
                ChunkStatus::Malformed(reason) => {
                    return Err(MapperError::MalformedChunk {
                        chunk,
                        reason: reason.to_string(),
                    })
                }
                ChunkStatus::Unavailable(source) => {
                    return Err(MapperError::Fetch {
                        path: format!("roomindex/{}.json", chunk),
                        source,
                    })
                }
            }
        }

        let found = lock(&self.state).entries.get(&hash).cloned();
        match &found {
            Some(coords) => debug!(
                "Room index: found {} ({}) at {:?}",
                escape_log(name),
                hash,
                coords
            ),
            None => info!(
                "Room index: unknown room {} ({}), desc {}",
                escape_log(name),
                hash,
                escape_log(desc)
            ),
        }
        Ok(found.filter(|coords| !coords.is_empty()))
    }

    pub fn is_chunk_cached(&self, chunk: &str) -> bool {
        lock(&self.state).cached_chunks.contains(chunk)
    }

    /// Number of hashes known so far.
    pub fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fetch a chunk and merge it. A missing chunk counts as an empty one.
async fn download_chunk(
    source: Arc<dyn MapDataSource>,
    state: Arc<Mutex<IndexState>>,
    chunk: String,
) -> ChunkStatus {
    let path = format!("roomindex/{}.json", chunk);
    info!("Downloading map index chunk {}", chunk);

    match source.fetch_json(&path).await {
        Ok(json) => {
            metrics::inc_index_chunks_downloaded();
            let mut state = lock(&state);
            match merge_chunk(&mut state.entries, &chunk, json) {
                Ok(stats) => {
                    state.cached_chunks.insert(chunk.clone());
                    info!(
                        "Room index: cached {} new entries from chunk {} ({} total)",
                        stats.added,
                        chunk,
                        state.entries.len()
                    );
                    ChunkStatus::Ready
                }
                Err(e) => {
                    error!("{}", e);
                    ChunkStatus::Malformed(Arc::new(e.to_string()))
                }
            }
        }
        Err(FetchError::NotFound) => {
            info!("Room index chunk {} does not exist", chunk);
            lock(&state).cached_chunks.insert(chunk);
            ChunkStatus::Ready
        }
        Err(e) => {
            metrics::inc_fetch_failures();
            error!("Loading map index chunk {} failed: {}", path, e);
            ChunkStatus::Unavailable(e)
        }
    }
}

/// Merge a chunk document into `entries`, skipping malformed entries.
fn merge_chunk(
    entries: &mut HashMap<String, Vec<RoomCoords>>,
    chunk: &str,
    json: Value,
) -> Result<ChunkStats, MapperError> {
    let Value::Object(map) = json else {
        return Err(MapperError::MalformedChunk {
            chunk: chunk.to_string(),
            reason: "expected an object of hash => coordinates".to_string(),
        });
    };

    let mut stats = ChunkStats::default();
    for (hash, candidates) in map {
        match serde_json::from_value::<Vec<(i32, i32, i32)>>(candidates) {
            Ok(triples) => {
                let coords = triples.into_iter().map(RoomCoords::from).collect();
                if entries.insert(hash, coords).is_none() {
                    stats.added += 1;
                }
            }
            Err(e) => {
                debug!("Room index chunk {}: bad entry {}: {}", chunk, hash, e);
                stats.skipped += 1;
            }
        }
    }

    if stats.skipped > 0 {
        warn!(
            "Room index chunk {}: skipped {} malformed entries",
            chunk, stats.skipped
        );
        metrics::add_records_rejected(stats.skipped as u64);
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::source::MemorySource;
    use serde_json::json;

    fn cache_with(source: &Arc<MemorySource>) -> RoomIndexCache {
        let dyn_source: Arc<dyn MapDataSource> = source.clone();
        RoomIndexCache::new(dyn_source)
    }

    fn chunk_path(name: &str, desc: &str) -> (String, String) {
        let hash = hash_name_desc(name, desc);
        let path = format!("roomindex/{}.json", chunk_of(&hash));
        (hash, path)
    }

    #[tokio::test]
    async fn finds_all_candidates() {
        let source = Arc::new(MemorySource::new());
        let (hash, path) = chunk_path("A Flat Marsh", "Some text.\n");
        source.insert(path.clone(), json!({ hash: [[1, 2, 0], [5, 6, -1]] }));

        let cache = cache_with(&source);
        let found = cache
            .find_pos_by_name_desc("A Flat Marsh", "Some text.\n")
            .await
            .unwrap();
        assert_eq!(
            found,
            Some(vec![RoomCoords::new(1, 2, 0), RoomCoords::new(5, 6, -1)])
        );

        // Second lookup is served from memory.
        cache
            .find_pos_by_name_desc("\x1b[32mA Flat Marsh\x1b[0m", "Some text.  \r\n")
            .await
            .unwrap();
        assert_eq!(source.fetch_count(&path), 1);
    }

    #[tokio::test]
    async fn unknown_room_in_downloaded_chunk_is_none() {
        let source = Arc::new(MemorySource::new());
        let (_, path) = chunk_path("Nowhere", "Empty.\n");
        source.insert(path.clone(), json!({ "00000000000000000000000000000000": [[0, 0, 0]] }));

        let cache = cache_with(&source);
        assert_eq!(
            cache.find_pos_by_name_desc("Nowhere", "Empty.\n").await.unwrap(),
            None
        );
        assert!(cache.is_chunk_cached(&path[10..12]));
    }

    #[tokio::test]
    async fn missing_chunk_is_cached_as_empty() {
        let source = Arc::new(MemorySource::new());
        let (_, path) = chunk_path("Lost", "Gone.\n");
        let cache = cache_with(&source);

        assert_eq!(cache.find_pos_by_name_desc("Lost", "Gone.\n").await.unwrap(), None);
        assert_eq!(cache.find_pos_by_name_desc("Lost", "Gone.\n").await.unwrap(), None);
        assert_eq!(source.fetch_count(&path), 1);
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let mut entries = HashMap::new();
        let stats = merge_chunk(
            &mut entries,
            "ab",
            json!({
                "ab01": [[1, 2, 3]],
                "ab02": [[1, 2]],
                "ab03": "nope",
                "ab04": [[4, 5, 6], [7, 8, 9]]
            }),
        )
        .unwrap();
        assert_eq!(stats, ChunkStats { added: 2, skipped: 2 });
        assert_eq!(entries["ab04"].len(), 2);
        assert!(!entries.contains_key("ab02"));
    }

    #[tokio::test]
    async fn malformed_chunk_keeps_other_entries_and_is_retried() {
        let source = Arc::new(MemorySource::new());
        let (good_hash, good_path) = chunk_path("Good", "Room.\n");
        source.insert(good_path, json!({ good_hash: [[1, 1, 1]] }));

        // Find a second room landing in a different chunk.
        let (bad_name, bad_path) = (0..)
            .map(|i| format!("Bad {}", i))
            .map(|name| {
                let (_, path) = chunk_path(&name, "Room.\n");
                (name, path)
            })
            .find(|(_, path)| *path != chunk_path("Good", "Room.\n").1)
            .unwrap();
        source.insert(bad_path.clone(), json!([1, 2, 3]));

        let cache = cache_with(&source);
        assert!(cache.find_pos_by_name_desc("Good", "Room.\n").await.unwrap().is_some());
        let err = cache.find_pos_by_name_desc(&bad_name, "Room.\n").await.unwrap_err();
        assert!(matches!(err, MapperError::MalformedChunk { .. }));
        assert_eq!(cache.len(), 1);

        let _ = cache.find_pos_by_name_desc(&bad_name, "Room.\n").await;
        assert_eq!(source.fetch_count(&bad_path), 2);
    }

    #[tokio::test]
    async fn transport_failure_is_an_error_and_retryable() {
        let source = Arc::new(MemorySource::new());
        let (hash, path) = chunk_path("Flaky", "Room.\n");
        source.fail(path.clone(), "timeout");
        let cache = cache_with(&source);

        assert!(matches!(
            cache.find_pos_by_name_desc("Flaky", "Room.\n").await,
            Err(MapperError::Fetch { .. })
        ));
        source.insert(path.clone(), json!({ hash: [[3, 3, 3]] }));
        assert_eq!(
            cache.find_pos_by_name_desc("Flaky", "Room.\n").await.unwrap(),
            Some(vec![RoomCoords::new(3, 3, 3)])
        );
        assert_eq!(source.fetch_count(&path), 2);
    }

    #[tokio::test]
    async fn concurrent_lookups_download_chunk_once() {
        let source = Arc::new(MemorySource::new());
        let (hash, path) = chunk_path("Busy", "Crossroads.\n");
        source.insert(path.clone(), json!({ hash: [[9, 9, 0]] }));
        let cache = cache_with(&source);

        let lookups = (0..8).map(|_| cache.find_pos_by_name_desc("Busy", "Crossroads.\n"));
        let results = futures::future::join_all(lookups).await;
        assert!(results
            .iter()
            .all(|r| matches!(r, Ok(Some(c)) if c[0] == RoomCoords::new(9, 9, 0))));
        assert_eq!(source.fetch_count(&path), 1);
    }
}
