//! Folds one race's classified results into cumulative driver and
//! constructor counters.
//!
//! The fold is pure over its inputs. Whether a race may be folded is decided
//! before calling in: only an [`UnprocessedRace`] is accepted.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::models::driver::{Constructor, Counters, Driver};
use crate::models::race::{RaceResult, UnprocessedRace};
use crate::utils::race_utils::parse_points;

/// What one fold changed, for logging and for callers that persist only
/// touched documents.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FoldSummary {
    pub drivers: HashSet<String>,
    pub constructors: HashSet<String>,
    pub skipped_rows: usize,
    pub points_awarded: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Session {
    Race,
    Sprint,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StatisticsAccumulator;

impl StatisticsAccumulator {
    pub fn new() -> Self {
        Self
    }

    /// Fold the main race, sprint and qualifying of `race` into the counters.
    pub fn fold(
        &self,
        race: UnprocessedRace<'_>,
        drivers: &mut HashMap<String, Driver>,
        constructors: &mut HashMap<String, Constructor>,
    ) -> FoldSummary {
        let race = race.race();
        let mut summary = FoldSummary::default();
        let key = race.key();

        self.fold_session(Session::Race, &race.results, drivers, constructors, &mut summary);
        self.fold_session(Session::Sprint, &race.sprint, drivers, constructors, &mut summary);

        if let Some(pole) = race.qualifying.iter().find(|q| q.position == 1) {
            match drivers.get_mut(&pole.driver_id) {
                Some(d) => {
                    d.stats.poles += 1;
                    summary.drivers.insert(pole.driver_id.clone());
                }
                None => warn!("{key}: pole sitter {} is unknown", pole.driver_id),
            }
            match constructors.get_mut(&pole.constructor_id) {
                Some(c) => {
                    c.stats.poles += 1;
                    summary.constructors.insert(pole.constructor_id.clone());
                }
                None => warn!("{key}: pole constructor {} is unknown", pole.constructor_id),
            }
        }

        debug!(
            "{key}: folded {} drivers, {} constructors, {} points, {} rows skipped",
            summary.drivers.len(),
            summary.constructors.len(),
            summary.points_awarded,
            summary.skipped_rows
        );
        summary
    }

    fn fold_session(
        &self,
        session: Session,
        results: &[RaceResult],
        drivers: &mut HashMap<String, Driver>,
        constructors: &mut HashMap<String, Constructor>,
        summary: &mut FoldSummary,
    ) {
        // Constructors field two cars; count their race once.
        let mut constructors_counted: HashSet<&str> = HashSet::new();

        for (index, result) in results.iter().enumerate() {
            let points = match parse_points(&result.points) {
                Ok(points) => points,
                Err(e) => {
                    warn!(
                        "Skipping {:?} result of {}: {e}",
                        session, result.driver_id
                    );
                    summary.skipped_rows += 1;
                    continue;
                }
            };
            let fastest = session == Session::Race
                && result.fastest_lap_rank.as_deref().map(str::trim) == Some("1");

            match drivers.get_mut(&result.driver_id) {
                Some(driver) => {
                    apply(&mut driver.stats, session, index, points, fastest, true);
                    summary.drivers.insert(result.driver_id.clone());
                }
                None => warn!("Result for unknown driver {}", result.driver_id),
            }

            match constructors.get_mut(&result.constructor_id) {
                Some(constructor) => {
                    let first_car = constructors_counted.insert(result.constructor_id.as_str());
                    apply(&mut constructor.stats, session, index, points, fastest, first_car);
                    summary.constructors.insert(result.constructor_id.clone());
                }
                None => warn!("Result for unknown constructor {}", result.constructor_id),
            }

            summary.points_awarded += points;
        }
    }
}

fn apply(
    stats: &mut Counters,
    session: Session,
    index: usize,
    points: f64,
    fastest: bool,
    count_race: bool,
) {
    stats.points += points;
    match session {
        Session::Race => {
            if index == 0 {
                stats.wins += 1;
            }
            if index < 3 {
                stats.podiums += 1;
            }
            if fastest {
                stats.fastest_laps += 1;
            }
            if count_race {
                stats.total_races += 1;
            }
        }
        Session::Sprint => {
            stats.sprint_points += points;
            if index == 0 {
                stats.sprint_wins += 1;
            }
            if index < 3 {
                stats.sprint_podiums += 1;
            }
            if count_race {
                stats.sprint_races += 1;
            }
        }
    }
}
