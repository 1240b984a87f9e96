//! One-race-at-a-time ingestion: fetch, reconcile identities, fold, persist.
//!
//! Every public entry point takes the run lock, so scheduled runs and the
//! administrative trigger never overlap.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::models::driver::{Constructor, Counters, Driver};
use crate::models::ergast::ErgastRace;
use crate::models::error::IngestError;
use crate::models::openf1::SessionFilter;
use crate::models::race::{Race, RaceKey, UnprocessedRace};
use crate::services::accumulator::StatisticsAccumulator;
use crate::services::historical::{HistoricalClient, RaceResource};
use crate::services::live::LiveClient;
use crate::services::reconciler::IdentityReconciler;
use crate::services::standings::{StandingsOutcome, StandingsUpdater};
use crate::services::upstream::Fetched;
use crate::storage::{Document, StorageExt, StorageGateway};

#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Results folded into the counters and the race marked processed.
    Ingested {
        key: RaceKey,
        drivers: usize,
        constructors: usize,
        skipped_rows: usize,
    },
    /// Results refetched for an already-processed race and every counter
    /// rebuilt from stored races.
    Rebuilt { key: RaceKey, races: usize },
    /// Upstream has no results for this race yet.
    NoData(RaceKey),
    /// The race was already folded; nothing was done.
    AlreadyProcessed(RaceKey),
}

impl IngestOutcome {
    pub fn key(&self) -> RaceKey {
        match self {
            IngestOutcome::Ingested { key, .. } | IngestOutcome::Rebuilt { key, .. } => *key,
            IngestOutcome::NoData(key) | IngestOutcome::AlreadyProcessed(key) => *key,
        }
    }
}

impl fmt::Display for IngestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestOutcome::Ingested {
                key,
                drivers,
                constructors,
                skipped_rows,
            } => write!(
                f,
                "Race {key} ingested: updated {drivers} drivers and {constructors} constructors ({skipped_rows} rows skipped)"
            ),
            IngestOutcome::Rebuilt { key, races } => write!(
                f,
                "Race {key} refetched: statistics rebuilt from {races} processed races"
            ),
            IngestOutcome::NoData(key) => write!(
                f,
                "Race {key} not ingested: upstream has no results yet, will retry later"
            ),
            IngestOutcome::AlreadyProcessed(key) => {
                write!(f, "Race {key} not ingested: already processed")
            }
        }
    }
}

/// Summary of a reference-data sync.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReferenceSync {
    pub drivers: usize,
    pub constructors: usize,
    pub races: usize,
}

pub struct IngestionService {
    store: Arc<dyn StorageGateway>,
    historical: HistoricalClient,
    live: LiveClient,
    reconciler: IdentityReconciler,
    accumulator: StatisticsAccumulator,
    standings: StandingsUpdater,
    current_season: AtomicI32,
    /// Set when counters may disagree with the processed races after a
    /// failed write. The next run rebuilds before folding anything.
    counters_dirty: AtomicBool,
    run_lock: Mutex<()>,
}

fn by_id<T: Document>(docs: Vec<T>) -> HashMap<String, T> {
    docs.into_iter().map(|d| (d.id(), d)).collect()
}

fn sorted<T: Document>(docs: HashMap<String, T>) -> Vec<T> {
    docs.into_iter()
        .collect::<BTreeMap<_, _>>()
        .into_values()
        .collect()
}

impl IngestionService {
    pub fn new(
        store: Arc<dyn StorageGateway>,
        historical: HistoricalClient,
        live: LiveClient,
        reconciler: IdentityReconciler,
        current_season: i32,
    ) -> Self {
        let standings = StandingsUpdater::new(store.clone(), historical.clone());
        Self {
            store,
            historical,
            live,
            reconciler,
            accumulator: StatisticsAccumulator::new(),
            standings,
            current_season: AtomicI32::new(current_season),
            counters_dirty: AtomicBool::new(false),
            run_lock: Mutex::new(()),
        }
    }

    pub fn current_season(&self) -> i32 {
        self.current_season.load(Ordering::Acquire)
    }

    /// Move the current season forward to `season` if it is later. Returns the
    /// season now in effect.
    pub fn advance_season(&self, season: i32) -> i32 {
        let previous = self.current_season.fetch_max(season, Ordering::AcqRel);
        if season > previous {
            info!("Current season advanced from {previous} to {season}");
        }
        previous.max(season)
    }

    /// Populate drivers and constructors once; later starts reuse what is stored.
    pub async fn ensure_reference_data(&self) -> Result<Option<ReferenceSync>, IngestError> {
        let _run = self.run_lock.lock().await;
        let drivers: Vec<Driver> = self.store.fetch_all().await?;
        let constructors: Vec<Constructor> = self.store.fetch_all().await?;
        if !drivers.is_empty() && !constructors.is_empty() {
            info!(
                "Reference data present ({} drivers, {} constructors)",
                drivers.len(),
                constructors.len()
            );
            return Ok(None);
        }
        self.sync_reference_locked().await.map(Some)
    }

    /// Full paginated sync of drivers and constructors plus the current calendar.
    pub async fn sync_reference_data(&self) -> Result<ReferenceSync, IngestError> {
        let _run = self.run_lock.lock().await;
        self.sync_reference_locked().await
    }

    async fn sync_reference_locked(&self) -> Result<ReferenceSync, IngestError> {
        let mut drivers = by_id(self.store.fetch_all::<Driver>().await?);
        for upstream in self.historical.drivers().await? {
            let fresh = Driver::from(upstream);
            match drivers.get_mut(&fresh.driver_id) {
                Some(known) => {
                    known.given_name = fresh.given_name;
                    known.family_name = fresh.family_name;
                    known.code = fresh.code.or(known.code.take());
                    known.nationality = fresh.nationality.or(known.nationality.take());
                    known.date_of_birth = fresh.date_of_birth.or(known.date_of_birth);
                    known.live_only = false;
                }
                None => {
                    drivers.insert(fresh.driver_id.clone(), fresh);
                }
            }
        }

        let mut constructors = by_id(self.store.fetch_all::<Constructor>().await?);
        for upstream in self.historical.constructors().await? {
            let fresh = Constructor::from(upstream);
            match constructors.get_mut(&fresh.constructor_id) {
                Some(known) => {
                    known.name = fresh.name;
                    known.nationality = fresh.nationality.or(known.nationality.take());
                }
                None => {
                    constructors.insert(fresh.constructor_id.clone(), fresh);
                }
            }
        }

        let drivers = sorted(drivers);
        let constructors = sorted(constructors);
        self.store.store_all(&drivers).await?;
        self.store.store_all(&constructors).await?;

        let races = self.sync_calendar_locked(self.current_season()).await?;
        if let Err(e) = self.reconcile_live_locked().await {
            warn!("Live roster reconciliation failed: {e}");
        }

        let sync = ReferenceSync {
            drivers: drivers.len(),
            constructors: constructors.len(),
            races,
        };
        info!("Reference data synced: {sync:?}");
        Ok(sync)
    }

    pub async fn sync_calendar(&self, season: i32) -> Result<usize, IngestError> {
        let _run = self.run_lock.lock().await;
        self.sync_calendar_locked(season).await
    }

    /// Upsert the season calendar, keeping results and processed flags of
    /// races already stored.
    async fn sync_calendar_locked(&self, season: i32) -> Result<usize, IngestError> {
        self.collapse_duplicates_locked().await?;
        let mut updated = Vec::new();
        for upstream in self.historical.season_races(season).await? {
            let calendar = match upstream.into_race() {
                Ok(race) => race,
                Err(e) => {
                    warn!("{season}: skipping calendar entry: {e}");
                    continue;
                }
            };
            let key = calendar.key();
            let race = match self.store.fetch::<Race>(&key.doc_id()).await? {
                Some(mut stored) => {
                    stored.merge_schedule(&calendar);
                    stored
                }
                None => calendar,
            };
            updated.push(Race {
                id: key.doc_id(),
                ..race
            });
        }
        self.store.store_all(&updated).await?;
        info!("{season}: calendar holds {} races", updated.len());
        Ok(updated.len())
    }

    /// Collapse Race documents sharing a (season, round) into one canonical
    /// document. Returns how many documents were removed.
    pub async fn collapse_duplicate_races(&self) -> Result<usize, IngestError> {
        let _run = self.run_lock.lock().await;
        self.collapse_duplicates_locked().await
    }

    async fn collapse_duplicates_locked(&self) -> Result<usize, IngestError> {
        let mut groups: BTreeMap<RaceKey, Vec<Race>> = BTreeMap::new();
        for race in self.store.fetch_all::<Race>().await? {
            groups.entry(race.key()).or_default().push(race);
        }

        let mut removed = 0;
        for (key, mut copies) in groups {
            let canonical_id = key.doc_id();
            if copies.len() == 1 && copies[0].id() == canonical_id {
                continue;
            }
            // Processed copies first, then the one with the most results.
            copies.sort_by_key(|r| {
                std::cmp::Reverse((
                    r.standings_updated,
                    r.results.len() + r.sprint.len() + r.qualifying.len(),
                ))
            });
            let stale: Vec<String> = copies
                .iter()
                .map(|r| r.id())
                .filter(|id| *id != canonical_id)
                .collect();
            let mut keep = copies.swap_remove(0);
            keep.id = canonical_id;
            self.store.store(&keep).await?;
            for id in &stale {
                self.store.remove::<Race>(id).await?;
            }
            removed += stale.len();
            warn!("Collapsed {} duplicate documents for race {key}", stale.len());
        }
        Ok(removed)
    }

    /// All known races after duplicate collapse.
    pub async fn races(&self) -> Result<Vec<Race>, IngestError> {
        let _run = self.run_lock.lock().await;
        self.collapse_duplicates_locked().await?;
        Ok(self.store.fetch_all().await?)
    }

    pub async fn reconcile_live_roster(&self) -> Result<usize, IngestError> {
        let _run = self.run_lock.lock().await;
        self.reconcile_live_locked().await
    }

    async fn reconcile_live_locked(&self) -> Result<usize, IngestError> {
        let live = self.live.drivers(SessionFilter::Latest).await?;
        if live.is_empty() {
            info!("Live roster empty, leaving active flags unchanged");
            return Ok(0);
        }
        let drivers: Vec<Driver> = self.store.fetch_all().await?;
        let constructors: Vec<Constructor> = self.store.fetch_all().await?;
        let roster = self.reconciler.reconcile_roster(&live, drivers, constructors);
        self.store.store_all(&roster.constructors).await?;
        self.store.store_all(&roster.drivers).await?;
        for id in &roster.retired {
            self.store.remove::<Driver>(id).await?;
        }
        Ok(roster.matched + roster.created)
    }

    /// Scheduled ingestion. A race already marked processed is left alone.
    pub async fn ingest_race(&self, key: RaceKey) -> Result<IngestOutcome, IngestError> {
        let _run = self.run_lock.lock().await;
        self.ingest_locked(key, false).await
    }

    /// Administrative recovery: refetch the race even if it was processed.
    /// Already-processed races trigger a full rebuild instead of a second fold.
    pub async fn force_reingest(&self, key: RaceKey) -> Result<IngestOutcome, IngestError> {
        let _run = self.run_lock.lock().await;
        info!("Forced re-ingest of race {key}");
        self.ingest_locked(key, true).await
    }

    async fn fetch_race(&self, key: RaceKey) -> Result<Option<(Race, Vec<Driver>, Vec<Constructor>)>, IngestError> {
        let results = match self
            .historical
            .race(key.season, key.round, RaceResource::Results)
            .await?
        {
            Fetched::Data(race) => race,
            Fetched::NoData => return Ok(None),
        };
        let qualifying = self
            .historical
            .race(key.season, key.round, RaceResource::Qualifying)
            .await?
            .into_option();
        let sprint = self
            .historical
            .race(key.season, key.round, RaceResource::Sprint)
            .await?
            .into_option();

        let mut drivers = Vec::new();
        let mut constructors = Vec::new();
        let mut collect = |r: &ErgastRace| {
            let (d, c) = r.identities();
            drivers.extend(d);
            constructors.extend(c);
        };
        collect(&results);
        qualifying.iter().for_each(&mut collect);
        sprint.iter().for_each(&mut collect);

        let mut race = results.into_race()?;
        if let Some(q) = qualifying {
            race.qualifying = q.into_race()?.qualifying;
        }
        if let Some(s) = sprint {
            race.sprint = s.into_race()?.sprint;
        }
        if race.results.is_empty() {
            return Ok(None);
        }
        Ok(Some((race, drivers, constructors)))
    }

    async fn ingest_locked(&self, key: RaceKey, force: bool) -> Result<IngestOutcome, IngestError> {
        if self.counters_dirty.load(Ordering::Acquire) {
            warn!("Counters left inconsistent by an earlier failure, rebuilding first");
            self.rebuild_locked().await?;
        }

        let stored = self.store.fetch::<Race>(&key.doc_id()).await?;
        let was_processed = stored.as_ref().is_some_and(|r| r.standings_updated);
        if was_processed && !force {
            info!("Race {key} already processed, skipping");
            return Ok(IngestOutcome::AlreadyProcessed(key));
        }

        let Some((mut race, referenced_drivers, referenced_constructors)) = self.fetch_race(key).await? else {
            info!("Race {key}: no results yet, leaving it pending");
            return Ok(IngestOutcome::NoData(key));
        };
        race.id = key.doc_id();

        let mut drivers = by_id(self.store.fetch_all::<Driver>().await?);
        let mut constructors = by_id(self.store.fetch_all::<Constructor>().await?);
        let mut created = (0, 0);
        for driver in referenced_drivers {
            if !drivers.contains_key(&driver.driver_id) {
                created.0 += 1;
                drivers.insert(driver.driver_id.clone(), driver);
            }
        }
        for constructor in referenced_constructors {
            if !constructors.contains_key(&constructor.constructor_id) {
                created.1 += 1;
                constructors.insert(constructor.constructor_id.clone(), constructor);
            }
        }
        if created != (0, 0) {
            info!(
                "Race {key}: created {} drivers and {} constructors from result payloads",
                created.0, created.1
            );
        }

        let persisted = if was_processed {
            race.standings_updated = true;
            match self.persist_fold(&race, drivers, constructors).await {
                Ok(()) => self
                    .rebuild_locked()
                    .await
                    .map(|races| IngestOutcome::Rebuilt { key, races }),
                Err(e) => Err(e),
            }
        } else {
            let Some(pending) = UnprocessedRace::new(&race) else {
                return Ok(IngestOutcome::AlreadyProcessed(key));
            };
            let summary = self.accumulator.fold(pending, &mut drivers, &mut constructors);
            race.standings_updated = true;
            self.persist_fold(&race, drivers, constructors)
                .await
                .map(|()| IngestOutcome::Ingested {
                    key,
                    drivers: summary.drivers.len(),
                    constructors: summary.constructors.len(),
                    skipped_rows: summary.skipped_rows,
                })
        };
        let outcome = match persisted {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Race {key}: persisting the fold failed: {e}");
                self.repair_counters().await;
                return Err(e);
            }
        };
        info!("{outcome}");

        if key.season == self.current_season() {
            match self.standings.recompute(key.season).await {
                Ok(StandingsOutcome::Replaced { .. }) | Ok(StandingsOutcome::NoData) => {}
                Err(e) => error!("Race {key}: standings recompute failed: {e}"),
            }
        }
        if let Err(e) = self.reconcile_live_locked().await {
            warn!("Race {key}: live roster reconciliation failed: {e}");
        }
        Ok(outcome)
    }

    /// Counters first, race flag last: a race is only marked processed once its
    /// fold is stored.
    async fn persist_fold(
        &self,
        race: &Race,
        drivers: HashMap<String, Driver>,
        constructors: HashMap<String, Constructor>,
    ) -> Result<(), IngestError> {
        self.store.store_all(&sorted(drivers)).await?;
        self.store.store_all(&sorted(constructors)).await?;
        self.store.store(race).await?;
        Ok(())
    }

    /// After a partial write, bring counters back in line with the races that
    /// are stored as processed. If that fails too, the next run retries it.
    async fn repair_counters(&self) {
        self.counters_dirty.store(true, Ordering::Release);
        match self.rebuild_locked().await {
            Ok(races) => info!("Counters repaired from {races} processed races"),
            Err(e) => error!("Counter repair failed, will rebuild on the next run: {e}"),
        }
    }

    /// Reset every counter and re-fold all processed races from their stored
    /// results. Returns the number of races folded.
    pub async fn rebuild_statistics(&self) -> Result<usize, IngestError> {
        let _run = self.run_lock.lock().await;
        self.rebuild_locked().await
    }

    async fn rebuild_locked(&self) -> Result<usize, IngestError> {
        let mut drivers = by_id(self.store.fetch_all::<Driver>().await?);
        let mut constructors = by_id(self.store.fetch_all::<Constructor>().await?);
        for driver in drivers.values_mut() {
            driver.stats = Counters::default();
        }
        for constructor in constructors.values_mut() {
            constructor.stats = Counters::default();
        }

        let mut races: Vec<Race> = self.store.fetch_all().await?;
        races.retain(|r| r.standings_updated);
        races.sort_by_key(|r| r.key());
        for race in &races {
            self.accumulator.fold(
                UnprocessedRace::for_rebuild(race),
                &mut drivers,
                &mut constructors,
            );
        }

        self.store.store_all(&sorted(drivers)).await?;
        self.store.store_all(&sorted(constructors)).await?;
        self.counters_dirty.store(false, Ordering::Release);
        info!("Rebuilt statistics from {} processed races", races.len());
        Ok(races.len())
    }

    /// Replace the standings snapshot for the current season.
    pub async fn recompute_standings(&self) -> Result<StandingsOutcome, IngestError> {
        let _run = self.run_lock.lock().await;
        self.standings.recompute(self.current_season()).await
    }
}
