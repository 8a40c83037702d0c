pub mod audit;
mod availability;
pub mod cancellation;
mod error;
mod mutations;
pub mod pricing;
mod queries;
mod validation;

pub use availability::{assign_room, free_rooms, is_available, room_is_free};
pub use error::{EngineError, ValidationError};
pub use mutations::{CategoryUpdate, EditResult};
pub use queries::{CategoryOffer, InventorySummary};

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::wal::Wal;

use cancellation::CancellationPolicy;

pub type SharedCategoryState = Arc<RwLock<CategoryState>>;

/// Source of "now". Swapped out in tests to pin the date.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Clone)]
pub struct EngineOptions {
    pub clock: Clock,
    pub cancellation_policy: CancellationPolicy,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            clock: Arc::new(Utc::now),
            cancellation_policy: CancellationPolicy::standard(),
        }
    }
}

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                        Ok(other) => {
                            // Flush what we have before handling the non-append command.
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
                let flush_start = std::time::Instant::now();
                let result = flush_batch(&mut wal, &batch);
                metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                    .record(flush_start.elapsed().as_secs_f64());
                respond_batch(batch, &result);

                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an append error so half-written bytes do not leak
    // into the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn respond_batch(batch: Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => {
            let result = wal.append_buffered(&event).and_then(|()| wal.flush_sync());
            let _ = response.send(result);
        }
    }
}

/// One hotel property's booking store: per-category state behind a lock,
/// indexes for lookups by id, and the WAL that makes it durable.
pub struct Engine {
    pub state: DashMap<Ulid, SharedCategoryState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Arena of extra services; bookings refer to them by id.
    pub(super) extras: DashMap<Ulid, ExtraService>,
    pub(super) booking_to_category: DashMap<Ulid, Ulid>,
    pub(super) room_to_category: DashMap<Ulid, Ulid>,
    pub(super) booking_numbers: DashMap<String, Ulid>,
    /// Append-only audit trail per booking.
    pub(super) modifications: DashMap<Ulid, Vec<ModificationRecord>>,
    pub(super) cancellations: DashMap<Ulid, CancellationRecord>,
    pub(super) next_booking_seq: AtomicU64,
    /// Serialises catalog writes (categories, extras) with compaction.
    pub(super) catalog_lock: Mutex<()>,
    pub(super) clock: Clock,
    pub(super) policy: CancellationPolicy,
}

pub(super) const BOOKING_NUMBER_PREFIX: &str = "BK-";

pub(super) fn format_booking_number(seq: u64) -> String {
    format!("{BOOKING_NUMBER_PREFIX}{seq:06}")
}

fn parse_booking_number(number: &str) -> Option<u64> {
    number.strip_prefix(BOOKING_NUMBER_PREFIX)?.parse().ok()
}

impl Engine {
    pub fn new(wal_path: PathBuf) -> io::Result<Self> {
        Self::with_options(wal_path, EngineOptions::default())
    }

    /// Replay the WAL at `wal_path` and start its writer task. Must run
    /// inside a tokio runtime.
    pub fn with_options(wal_path: PathBuf, options: EngineOptions) -> io::Result<Self> {
        let events = Wal::recover(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            state: DashMap::new(),
            wal_tx,
            extras: DashMap::new(),
            booking_to_category: DashMap::new(),
            room_to_category: DashMap::new(),
            booking_numbers: DashMap::new(),
            modifications: DashMap::new(),
            cancellations: DashMap::new(),
            next_booking_seq: AtomicU64::new(1),
            catalog_lock: Mutex::new(()),
            clock: options.clock,
            policy: options.cancellation_policy,
        };

        // Rebuild plain state first; nobody else can see it yet.
        let mut categories: HashMap<Ulid, CategoryState> = HashMap::new();
        for event in &events {
            match event {
                Event::CategoryCreated { category } => {
                    categories.insert(category.id, CategoryState::new(category.clone()));
                }
                Event::ExtraServiceSaved { extra } => {
                    engine.extras.insert(extra.id, extra.clone());
                }
                other => {
                    if let Some(cid) = other.category_id()
                        && let Some(cs) = categories.get_mut(&cid)
                    {
                        engine.apply_to_category(cs, other);
                    }
                }
            }
        }
        for (id, cs) in categories {
            engine.state.insert(id, Arc::new(RwLock::new(cs)));
        }

        tracing::debug!(
            "replayed {} events: {} categories, {} bookings",
            events.len(),
            engine.state.len(),
            engine.booking_to_category.len()
        );
        Ok(engine)
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub fn cancellation_policy(&self) -> &CancellationPolicy {
        &self.policy
    }

    /// Apply an event to a category (no locking — caller holds the lock).
    pub(super) fn apply_to_category(&self, cs: &mut CategoryState, event: &Event) {
        match event {
            Event::CategoryUpdated { category } => {
                cs.category = category.clone();
            }
            Event::RoomAdded { room } => {
                self.room_to_category.insert(room.id, room.category_id);
                cs.insert_room(room.clone());
            }
            Event::RoomStatusChanged { room_id, status, .. } => {
                if let Some(room) = cs.room_mut(*room_id) {
                    room.status = *status;
                }
            }
            Event::BookingCreated { booking } => {
                self.index_booking(booking);
                cs.insert_booking(booking.clone());
            }
            Event::BookingModified { booking, records } => {
                cs.replace_booking(booking.clone());
                self.modifications
                    .entry(booking.id)
                    .or_default()
                    .extend(records.iter().cloned());
            }
            Event::BookingStatusChanged { booking_id, status, .. } => {
                if let Some(booking) = cs.booking_mut(*booking_id) {
                    booking.status = *status;
                    booking.modified = false;
                }
            }
            Event::BookingCancelled { record, .. } => {
                if let Some(booking) = cs.booking_mut(record.booking_id) {
                    booking.status = BookingStatus::Cancelled;
                    booking.modified = false;
                }
                self.cancellations.insert(record.booking_id, record.clone());
            }
            Event::BookingRestored {
                booking,
                modifications,
                cancellation,
            } => {
                self.index_booking(booking);
                cs.insert_booking(booking.clone());
                if !modifications.is_empty() {
                    self.modifications.insert(booking.id, modifications.clone());
                }
                if let Some(record) = cancellation {
                    self.cancellations.insert(booking.id, record.clone());
                }
            }
            // Handled at the engine level, not per category.
            Event::CategoryCreated { .. } | Event::ExtraServiceSaved { .. } => {}
        }
    }

    fn index_booking(&self, booking: &Booking) {
        self.booking_to_category.insert(booking.id, booking.category_id);
        self.booking_numbers.insert(booking.number.clone(), booking.id);
        if let Some(seq) = parse_booking_number(&booking.number) {
            self.next_booking_seq.fetch_max(seq + 1, Ordering::SeqCst);
        }
    }

    pub(super) fn next_booking_number(&self) -> String {
        format_booking_number(self.next_booking_seq.fetch_add(1, Ordering::SeqCst))
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// WAL-append then apply, under the caller's category write lock.
    pub(super) async fn persist_and_apply(&self, cs: &mut CategoryState, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.apply_to_category(cs, event);
        Ok(())
    }

    pub fn get_category_state(&self, id: &Ulid) -> Option<SharedCategoryState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    pub fn category_of_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_to_category.get(booking_id).map(|e| *e.value())
    }

    pub fn category_of_room(&self, room_id: &Ulid) -> Option<Ulid> {
        self.room_to_category.get(room_id).map(|e| *e.value())
    }

    /// Lookup booking → category, acquire the category write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<tokio::sync::OwnedRwLockWriteGuard<CategoryState>, EngineError> {
        let category_id = self
            .category_of_booking(booking_id)
            .ok_or(EngineError::NotFound(*booking_id))?;
        let cs = self
            .get_category_state(&category_id)
            .ok_or(EngineError::NotFound(category_id))?;
        Ok(cs.write_owned().await)
    }

    /// Rewrite the WAL with only the events needed to recreate the current
    /// state, audit trail included.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _catalog = self.catalog_lock.lock().await;

        let mut events: Vec<Event> = self
            .extras
            .iter()
            .map(|e| Event::ExtraServiceSaved { extra: e.value().clone() })
            .collect();

        // Hold every category read guard until the swap is done so no
        // booking can commit between snapshot and swap. Sorted to keep lock
        // order stable.
        let mut ids: Vec<Ulid> = self.state.iter().map(|e| *e.key()).collect();
        ids.sort();
        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(cs) = self.get_category_state(&id) {
                guards.push(cs.read_owned().await);
            }
        }

        for guard in &guards {
            events.push(Event::CategoryCreated {
                category: guard.category.clone(),
            });
            for room in &guard.rooms {
                events.push(Event::RoomAdded { room: room.clone() });
            }
            for booking in &guard.bookings {
                events.push(Event::BookingRestored {
                    booking: booking.clone(),
                    modifications: self
                        .modifications
                        .get(&booking.id)
                        .map(|m| m.value().clone())
                        .unwrap_or_default(),
                    cancellation: self.cancellations.get(&booking.id).map(|c| c.value().clone()),
                });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL).increment(1);
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
