//! Coalescing of multi-part posts (albums).
//!
//! The platform delivers every part of an album as its own update, tagged
//! with a shared burst id and with no end marker. The first part of a burst
//! opens a buffer and holds its task for a fixed latency; parts arriving in
//! the meantime are appended and their tasks return immediately. When the
//! hold ends the first task takes the buffer out and relays it as one unit.
//!
//! Buffers also carry a hard TTL so that a holder that never comes back (its
//! task was dropped) cannot pin memory. A buffer pushed out at capacity stops
//! accepting parts but stays parked for its holder, so parts that already
//! joined it are still relayed.

use std::{collections::HashMap, sync::Mutex, time::Duration};

use {
    tokio::time::Instant,
    topicdesk_common::types::{BurstId, BurstUnit, ContentPart},
    tracing::{debug, warn},
};

/// Window and sizing of the aggregator.
#[derive(Debug, Clone, Copy)]
pub struct AlbumSettings {
    pub latency: Duration,
    pub ttl: Duration,
    pub capacity: usize,
}

impl Default for AlbumSettings {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(200),
            ttl: Duration::from_millis(300),
            capacity: 10_000,
        }
    }
}

/// What happened to an offered part.
#[derive(Debug, PartialEq, Eq)]
pub enum Offer {
    /// Appended to a burst that another task is holding.
    Joined,
    /// Opening a new burst was refused by the admission check.
    Refused,
    /// This task opened the burst and the window has elapsed.
    Flushed(BurstUnit),
}

struct OpenBurst {
    /// Distinguishes reopenings of the same burst id.
    seq: u64,
    opened_at: Instant,
    parts: Vec<ContentPart>,
    caption: Option<String>,
}

#[derive(Default)]
struct Buffers {
    open: HashMap<BurstId, OpenBurst>,
    /// Bursts evicted at capacity, keyed by sequence number.
    parked: HashMap<u64, OpenBurst>,
    next_seq: u64,
}

impl Buffers {
    /// Take the burst opened as `seq`, wherever it is held.
    fn take(&mut self, burst_id: &BurstId, seq: u64) -> Option<OpenBurst> {
        match self.open.get(burst_id) {
            Some(burst) if burst.seq == seq => self.open.remove(burst_id),
            _ => self.parked.remove(&seq),
        }
    }
}

pub struct BurstAggregator {
    settings: AlbumSettings,
    buffers: Mutex<Buffers>,
}

impl BurstAggregator {
    pub fn new(settings: AlbumSettings) -> Self {
        Self {
            settings,
            buffers: Mutex::new(Buffers::default()),
        }
    }

    /// Offer one part of a burst.
    ///
    /// `admit` is consulted only when the part would open a new burst, under
    /// the same lock that makes the open-or-join decision. A part joining a
    /// burst already held inherits that burst's admission.
    pub async fn offer(
        &self,
        burst_id: BurstId,
        part: ContentPart,
        caption: Option<String>,
        admit: impl FnOnce() -> bool,
    ) -> Offer {
        let now = Instant::now();
        let seq = {
            let mut buffers = self.buffers.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(burst) = buffers.open.get_mut(&burst_id)
                && now.duration_since(burst.opened_at) < self.settings.ttl
            {
                burst.parts.push(part);
                if burst.caption.is_none() {
                    burst.caption = caption;
                }
                debug!(burst_id = %burst_id, parts = burst.parts.len(), "joined burst");
                return Offer::Joined;
            }

            if !admit() {
                return Offer::Refused;
            }

            self.evict(&mut buffers, now);
            buffers.next_seq += 1;
            let seq = buffers.next_seq;
            buffers.open.insert(burst_id.clone(), OpenBurst {
                seq,
                opened_at: now,
                parts: vec![part.clone()],
                caption: caption.clone(),
            });
            debug!(burst_id = %burst_id, "opened burst");
            seq
        };

        tokio::time::sleep(self.settings.latency).await;

        let taken = self
            .buffers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take(&burst_id, seq);

        let unit = match taken {
            Some(burst) => BurstUnit {
                burst_id,
                parts: burst.parts,
                caption: burst.caption,
            },
            None => {
                warn!(burst_id = %burst_id, "burst expired before flush, relaying first part only");
                BurstUnit {
                    burst_id,
                    parts: vec![part],
                    caption,
                }
            },
        };
        debug!(burst_id = %unit.burst_id, parts = unit.parts.len(), "flushing burst");
        Offer::Flushed(unit)
    }

    /// Number of bursts currently accepting parts.
    pub fn len(&self) -> usize {
        self.buffers.lock().unwrap_or_else(|e| e.into_inner()).open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired buffers, then park the oldest ones while at capacity.
    fn evict(&self, buffers: &mut Buffers, now: Instant) {
        let ttl = self.settings.ttl;
        buffers
            .open
            .retain(|_, burst| now.duration_since(burst.opened_at) < ttl);
        buffers
            .parked
            .retain(|_, burst| now.duration_since(burst.opened_at) < ttl);

        while buffers.open.len() >= self.settings.capacity.max(1) {
            let Some(oldest) = buffers
                .open
                .iter()
                .min_by_key(|(_, burst)| burst.opened_at)
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            if let Some(burst) = buffers.open.remove(&oldest) {
                warn!(
                    burst_id = %oldest,
                    parts = burst.parts.len(),
                    "album buffer full, parking oldest burst"
                );
                buffers.parked.insert(burst.seq, burst);
            }
        }
    }
}
