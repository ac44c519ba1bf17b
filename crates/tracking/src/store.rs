//! The tracking store: the one place feed ingestion, readers and the sweeper
//! meet.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::instrument;

use crate::clock::{Clock, SystemClock};
use crate::db::{Database, PoolSettings};
use crate::error::{ErrorKind, Result};
use crate::models::{EntityRow, GroupSummary, PositionUpdate, StaticAttributes, TrackedEntity, unix_millis};
use crate::repo;
use crate::staleness::StalenessPolicy;
use crate::sweeper::Sweeper;

/// Longest sweep period the scheduler accepts.
const MAX_SWEEP_PERIOD: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// How long rows live and how often they are swept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreOptions {
    pub policy: StalenessPolicy,
    /// Defaults to the staleness threshold.
    pub sweep_interval: Option<Duration>,
}
impl StoreOptions {
    pub fn with_threshold(mut self, threshold: time::Duration) -> Self {
        self.policy = StalenessPolicy::new(threshold);
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// A period derived from a very long threshold is capped; an explicit
    /// one is taken as given.
    fn sweep_period(&self) -> Duration {
        self.sweep_interval.unwrap_or_else(|| self.policy.threshold().unsigned_abs().min(MAX_SWEEP_PERIOD))
    }
}

/// State shared between the store and its sweeper.
#[derive(Debug, Clone)]
pub(crate) struct Core {
    db: Database,
    policy: StalenessPolicy,
    clock: Arc<dyn Clock>,
}
impl Core {
    pub(crate) fn new(db: Database, policy: StalenessPolicy, clock: Arc<dyn Clock>) -> Self {
        Self { db, policy, clock }
    }

    fn cutoff(&self) -> Result<i64> {
        unix_millis(self.policy.cutoff(self.clock.now()))
    }

    /// Delete every row that is stale right now, in one write transaction.
    pub(crate) async fn sweep(&self) -> Result<u64> {
        let cutoff = self.cutoff()?;
        let removed = self.db.execute(move |conn| Box::pin(repo::delete_stale(conn, cutoff))).await?;
        tracing::info!(removed, "Cleanup completed");
        Ok(removed)
    }
}

struct Attached {
    core: Core,
    sweeper: Option<Sweeper>,
}

/// Store of the most recent known state of every tracked aircraft.
///
/// Construct one per process with [`open`](Self::open) (or
/// [`open_with`](Self::open_with) to supply the database and clock), share it
/// behind an `Arc`, and [`close`](Self::close) it on shutdown. Opening spawns
/// the background sweeper, so it must happen inside a Tokio runtime.
///
/// A [`detached`](Self::detached) store has no database at all: writes are
/// accepted and dropped, reads come back empty. Callers that run where no
/// database is reachable can hold one without special-casing every call.
/// A closed store behaves the same way.
pub struct TrackingStore {
    attached: RwLock<Option<Attached>>,
}
impl std::fmt::Debug for TrackingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingStore").finish_non_exhaustive()
    }
}
impl TrackingStore {
    /// Open (creating if needed) the database at `path` and start sweeping.
    pub async fn open(path: impl AsRef<Path>, settings: PoolSettings, options: StoreOptions) -> Result<Self> {
        let db = Database::connect_with(path, settings).await?;
        Self::open_with(db, options, Arc::new(SystemClock)).await
    }

    pub async fn open_with(db: Database, options: StoreOptions, clock: Arc<dyn Clock>) -> Result<Self> {
        if !options.policy.threshold().is_positive() {
            exn::bail!(ErrorKind::Initialization);
        }
        let period = options.sweep_period();
        if period.is_zero() || period > MAX_SWEEP_PERIOD {
            exn::bail!(ErrorKind::Initialization);
        }
        let core = Core::new(db, options.policy, clock);
        let sweeper = Sweeper::spawn(core.clone(), period);
        tracing::info!(
            threshold_secs = options.policy.threshold().whole_seconds(),
            sweep_secs = period.as_secs(),
            "Tracking store opened"
        );
        Ok(Self { attached: RwLock::new(Some(Attached { core, sweeper: Some(sweeper) })) })
    }

    pub fn detached() -> Self {
        Self { attached: RwLock::new(None) }
    }

    pub async fn is_attached(&self) -> bool {
        self.attached.read().await.is_some()
    }

    /// Insert or update a batch of feed records in one transaction.
    ///
    /// Static attributes are joined in by `icao24`. Every record is validated
    /// first and a single bad record rejects the whole batch with
    /// [`ErrorKind::Validation`]; nothing is written. When the same `icao24`
    /// appears more than once, the last record wins.
    ///
    /// Every written row gets `last_seen` set to the store's clock at write
    /// time, never earlier than what is already stored.
    ///
    /// Returns the number of rows written; zero for an empty batch or a
    /// detached store.
    #[instrument(skip_all, fields(batch = entities.len()))]
    pub async fn upsert_batch(&self, entities: &[PositionUpdate], attributes: &[StaticAttributes]) -> Result<u64> {
        if entities.is_empty() {
            return Ok(0);
        }
        let guard = self.attached.read().await;
        let Some(attached) = guard.as_ref() else {
            tracing::debug!("Skipping upsert; store is not attached to a database");
            return Ok(0);
        };
        let rows = prepare_batch(entities, attributes)?;
        let clock = Arc::clone(&attached.core.clock);
        let written = attached
            .core
            .db
            .execute(move |conn| {
                Box::pin(async move {
                    let mut rows = rows;
                    let seen_at = unix_millis(clock.now())?;
                    rows.iter_mut().for_each(|row| row.last_seen = seen_at);
                    repo::upsert(conn, &rows).await
                })
            })
            .await?;
        tracing::info!(written, "Updated active aircraft");
        Ok(written)
    }

    /// Live aircraft for one group, most recently seen first.
    ///
    /// This feeds live displays, so failures are logged and turned into an
    /// empty list. Use [`try_query`](Self::try_query) to see the error.
    pub async fn query(&self, manufacturer: &str) -> Vec<TrackedEntity> {
        match self.try_query(manufacturer).await {
            Ok(entities) => entities,
            Err(err) => {
                tracing::error!(manufacturer, error = ?err, "Error fetching active aircraft");
                Vec::new()
            },
        }
    }

    pub async fn try_query(&self, manufacturer: &str) -> Result<Vec<TrackedEntity>> {
        let guard = self.attached.read().await;
        let Some(attached) = guard.as_ref() else {
            return Ok(Vec::new());
        };
        let cutoff = attached.core.cutoff()?;
        let rows = repo::live_by_group(attached.core.db.pool(), manufacturer, cutoff).await?;
        rows.into_iter().map(TrackedEntity::try_from).collect()
    }

    /// Delete every row for a group, live or not.
    ///
    /// Returns the number of rows removed.
    #[instrument(skip(self))]
    pub async fn clear_group(&self, manufacturer: &str) -> Result<u64> {
        let guard = self.attached.read().await;
        let Some(attached) = guard.as_ref() else {
            return Ok(0);
        };
        let manufacturer = manufacturer.to_string();
        let removed = attached
            .core
            .db
            .execute(move |conn| Box::pin(async move { repo::delete_group(conn, &manufacturer).await }))
            .await?;
        tracing::info!(removed, "Cleared manufacturer data");
        Ok(removed)
    }

    /// Row counts per group, largest group first.
    ///
    /// `count` includes rows that are stale but not swept yet; `active_count`
    /// only the live ones.
    pub async fn groups(&self) -> Result<Vec<GroupSummary>> {
        let guard = self.attached.read().await;
        let Some(attached) = guard.as_ref() else {
            return Ok(Vec::new());
        };
        let cutoff = attached.core.cutoff()?;
        let rows = repo::group_summaries(attached.core.db.pool(), cutoff).await?;
        rows.into_iter().map(GroupSummary::try_from).collect()
    }

    /// Run one sweep now, outside the regular schedule.
    pub async fn sweep(&self) -> Result<u64> {
        let guard = self.attached.read().await;
        match guard.as_ref() {
            Some(attached) => attached.core.sweep().await,
            None => Ok(0),
        }
    }

    pub async fn health(&self) -> Result<()> {
        let guard = self.attached.read().await;
        let attached = guard.as_ref().ok_or_else(|| exn::Exn::from(ErrorKind::Detached))?;
        attached.core.db.ping().await
    }

    /// Stop the sweeper and release the database.
    ///
    /// Waits for in-flight operations to finish first. Calling it again, or
    /// on a detached store, does nothing.
    pub async fn close(&self) {
        let mut guard = self.attached.write().await;
        let Some(attached) = guard.take() else {
            return;
        };
        if let Some(sweeper) = attached.sweeper {
            sweeper.stop().await;
        }
        attached.core.db.close().await;
        tracing::info!("Tracking store closed");
    }
}

/// Validate a batch and turn it into rows, joining static attributes and
/// collapsing duplicate keys (last record wins, first position kept).
fn prepare_batch(entities: &[PositionUpdate], attributes: &[StaticAttributes]) -> Result<Vec<EntityRow>> {
    for (index, update) in entities.iter().enumerate() {
        if let Err(reason) = update.validate() {
            exn::bail!(ErrorKind::Validation { index, reason });
        }
    }
    let attributes: HashMap<&str, &StaticAttributes> = attributes.iter().map(|a| (a.icao24.as_str(), a)).collect();
    let mut positions: HashMap<&str, usize> = HashMap::with_capacity(entities.len());
    let mut rows = Vec::with_capacity(entities.len());
    for update in entities {
        let row = EntityRow::ingest(update, attributes.get(update.icao24.as_str()).copied());
        match positions.entry(update.icao24.as_str()) {
            Entry::Occupied(slot) => rows[*slot.get()] = row,
            Entry::Vacant(slot) => {
                slot.insert(rows.len());
                rows.push(row);
            },
        }
    }
    Ok(rows)
}
