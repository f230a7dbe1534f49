//! Process-wide counters for map data traffic and parser recoveries.
//! Read through [`snapshot`]; printed by the `status` and `replay` commands.
use std::sync::atomic::{AtomicU64, Ordering};

static INDEX_CHUNKS_DOWNLOADED: AtomicU64 = AtomicU64::new(0);
static ZONES_DOWNLOADED: AtomicU64 = AtomicU64::new(0);
static ZONES_MISSING: AtomicU64 = AtomicU64::new(0);
static FETCH_FAILURES: AtomicU64 = AtomicU64::new(0);
static RECORDS_REJECTED: AtomicU64 = AtomicU64::new(0);
static TAGS_DROPPED: AtomicU64 = AtomicU64::new(0);
static MOVEMENTS: AtomicU64 = AtomicU64::new(0);

pub fn inc_index_chunks_downloaded() {
    INDEX_CHUNKS_DOWNLOADED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_zones_downloaded() {
    ZONES_DOWNLOADED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_zones_missing() {
    ZONES_MISSING.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_fetch_failures() {
    FETCH_FAILURES.fetch_add(1, Ordering::Relaxed);
}

/// Index entries or room records thrown away by validation.
pub fn add_records_rejected(count: u64) {
    RECORDS_REJECTED.fetch_add(count, Ordering::Relaxed);
}

/// Tags discarded by the markup filter (nesting cap, runaway text, unmatched).
pub fn inc_tags_dropped() {
    TAGS_DROPPED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_movements() {
    MOVEMENTS.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub index_chunks_downloaded: u64,
    pub zones_downloaded: u64,
    pub zones_missing: u64,
    pub fetch_failures: u64,
    pub records_rejected: u64,
    pub tags_dropped: u64,
    pub movements: u64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        index_chunks_downloaded: INDEX_CHUNKS_DOWNLOADED.load(Ordering::Relaxed),
        zones_downloaded: ZONES_DOWNLOADED.load(Ordering::Relaxed),
        zones_missing: ZONES_MISSING.load(Ordering::Relaxed),
        fetch_failures: FETCH_FAILURES.load(Ordering::Relaxed),
        records_rejected: RECORDS_REJECTED.load(Ordering::Relaxed),
        tags_dropped: TAGS_DROPPED.load(Ordering::Relaxed),
        movements: MOVEMENTS.load(Ordering::Relaxed),
    }
}

impl std::fmt::Display for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "index chunks {} | zones {} ({} missing) | fetch failures {} | rejected records {} | dropped tags {} | movements {}",
            self.index_chunks_downloaded,
            self.zones_downloaded,
            self.zones_missing,
            self.fetch_failures,
            self.records_rejected,
            self.tags_dropped,
            self.movements
        )
    }
}
