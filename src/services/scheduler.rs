//! Decides when the pipeline runs next, from the race calendar rather than a
//! fixed interval, and drives one ingestion per wake.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Datelike, Duration as ChronoDuration, Utc};
use tokio::sync::{watch, Notify};
use tokio::time::{sleep_until, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::models::race::{Race, RaceKey};
use crate::services::ingestion::IngestionService;

/// Delay before retrying a race whose start has passed but is not processed.
pub const OVERDUE_RECHECK: Duration = Duration::from_secs(30 * 60);
/// Time after a race start before results are expected to be final.
pub const POST_RACE_SETTLE: Duration = Duration::from_secs(4 * 60 * 60);
/// Recheck interval when nothing is pending or upcoming.
pub const IDLE_RECHECK: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    Overdue,
    Upcoming,
    Idle,
    /// Planning itself failed; try again soon.
    Recheck,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakePlan {
    pub at: DateTime<Utc>,
    pub target: Option<RaceKey>,
    pub reason: WakeReason,
}

fn after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    now + ChronoDuration::from_std(delay).unwrap_or(ChronoDuration::zero())
}

/// Next wake for a calendar as seen at `now`.
///
/// The earliest started-but-unprocessed race wins; otherwise the nearest
/// future race, woken once results have settled; otherwise an idle recheck.
pub fn plan_next_wake(races: &[Race], now: DateTime<Utc>) -> WakePlan {
    let overdue = races
        .iter()
        .filter(|r| !r.standings_updated && r.starts_at() <= now)
        .min_by_key(|r| (r.starts_at(), r.key()));
    if let Some(race) = overdue {
        return WakePlan {
            at: after(now, OVERDUE_RECHECK),
            target: Some(race.key()),
            reason: WakeReason::Overdue,
        };
    }

    let upcoming = races
        .iter()
        .filter(|r| r.starts_at() > now)
        .min_by_key(|r| (r.starts_at(), r.key()));
    if let Some(race) = upcoming {
        return WakePlan {
            at: after(race.starts_at(), POST_RACE_SETTLE),
            target: Some(race.key()),
            reason: WakeReason::Upcoming,
        };
    }

    WakePlan {
        at: after(now, IDLE_RECHECK),
        target: None,
        reason: WakeReason::Idle,
    }
}

/// A single-slot timer. Arming replaces whatever deadline was armed before,
/// so at most one wake is ever pending.
pub struct WakeTimer {
    slot: watch::Sender<Option<Instant>>,
}

impl Default for WakeTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl WakeTimer {
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self { slot }
    }

    /// Cancel the pending wake, if any, and schedule `deadline` in its place.
    pub fn arm(&self, deadline: Instant) {
        self.slot.send_replace(Some(deadline));
    }

    pub fn cancel(&self) {
        self.slot.send_replace(None);
    }

    pub fn deadline(&self) -> Option<Instant> {
        *self.slot.borrow()
    }

    /// Resolves when the armed deadline passes, following any re-arm made
    /// while waiting. Pending while disarmed. Firing disarms the timer.
    pub async fn fired(&self) {
        let mut rx = self.slot.subscribe();
        loop {
            let armed = *rx.borrow_and_update();
            match armed {
                Some(deadline) => {
                    tokio::select! {
                        _ = sleep_until(deadline) => {
                            let fired = self.slot.send_if_modified(|slot| {
                                if *slot == Some(deadline) {
                                    *slot = None;
                                    true
                                } else {
                                    false
                                }
                            });
                            if fired {
                                return;
                            }
                        }
                        _ = rx.changed() => {}
                    }
                }
                None => {
                    // The sender lives in `self`, so this only errors if it is gone.
                    if rx.changed().await.is_err() {
                        std::future::pending::<()>().await;
                    }
                }
            }
        }
    }
}

pub struct RaceCalendarScheduler {
    ingestion: Arc<IngestionService>,
    timer: WakeTimer,
    replan: Notify,
    shutdown: CancellationToken,
    plan: Mutex<Option<WakePlan>>,
}

impl RaceCalendarScheduler {
    pub fn new(ingestion: Arc<IngestionService>, shutdown: CancellationToken) -> Self {
        Self {
            ingestion,
            timer: WakeTimer::new(),
            replan: Notify::new(),
            shutdown,
            plan: Mutex::new(None),
        }
    }

    pub fn current_plan(&self) -> Option<WakePlan> {
        self.plan.lock().ok().and_then(|p| p.clone())
    }

    /// Deadline of the one armed wake, if any.
    pub fn pending_wake(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    /// Ask the loop to drop its pending wake and plan again.
    pub fn request_replan(&self) {
        self.replan.notify_one();
    }

    pub async fn compute_plan(&self) -> WakePlan {
        let now = Utc::now();
        match self.ingestion.races().await {
            Ok(races) => plan_next_wake(&races, now),
            Err(e) => {
                error!("Cannot read race calendar, rechecking soon: {e}");
                WakePlan {
                    at: after(now, OVERDUE_RECHECK),
                    target: None,
                    reason: WakeReason::Recheck,
                }
            }
        }
    }

    fn rearm(&self, plan: &WakePlan) {
        let wait = (plan.at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        self.timer.arm(Instant::now() + wait);
        if let Ok(mut current) = self.plan.lock() {
            *current = Some(plan.clone());
        }
        info!(
            "Next wake at {} ({:?}, target {})",
            plan.at,
            plan.reason,
            plan.target
                .map(|k| k.to_string())
                .unwrap_or_else(|| "none".to_string())
        );
    }

    async fn on_wake(&self, target: Option<RaceKey>) {
        // The clock, or a race from a later season, moves the season forward.
        let year = Utc::now().year().max(target.map_or(i32::MIN, |k| k.season));
        let season = self.ingestion.advance_season(year);
        if let Some(key) = target {
            match self.ingestion.ingest_race(key).await {
                Ok(outcome) => info!("{outcome}"),
                Err(e) => error!("Race {key} not ingested, will retry later: {e}"),
            }
        }
        if self.shutdown.is_cancelled() {
            return;
        }
        if let Err(e) = self.ingestion.sync_calendar(season).await {
            warn!("{season}: calendar refresh failed: {e}");
        }
        // Nothing pending: the next calendar may already be published.
        if target.is_none() {
            let next = season + 1;
            match self.ingestion.sync_calendar(next).await {
                Ok(0) => debug!("{next}: no calendar published yet"),
                Ok(races) => info!("{next}: picked up {races} races ahead of the season"),
                Err(e) => warn!("{next}: calendar lookahead failed: {e}"),
            }
        }
    }

    /// Run until the shutdown token is cancelled.
    pub async fn run(self: Arc<Self>) {
        info!("Race calendar scheduler started");
        match self.ingestion.ensure_reference_data().await {
            Ok(Some(sync)) => info!("Initial reference sync: {sync:?}"),
            Ok(None) => {}
            Err(e) => error!("Initial reference sync failed: {e}"),
        }

        while !self.shutdown.is_cancelled() {
            let plan = self.compute_plan().await;
            self.rearm(&plan);

            tokio::select! {
                _ = self.timer.fired() => {
                    debug!("Woke for {:?}", plan.target);
                    self.on_wake(plan.target).await;
                }
                _ = self.replan.notified() => {
                    debug!("Replanning on request");
                }
                _ = self.shutdown.cancelled() => {}
            }
        }

        self.timer.cancel();
        info!("Race calendar scheduler stopped");
    }
}
