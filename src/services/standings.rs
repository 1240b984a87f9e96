//! Season standings snapshot, replaced wholesale from the upstream feed.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use crate::models::ergast::{ErgastConstructorStanding, ErgastDriverStanding};
use crate::models::error::{IngestError, MappingError};
use crate::models::race::Race;
use crate::models::standings::{positions_moved, ConstructorStanding, DriverStanding};
use crate::services::historical::{HistoricalClient, StandingsFeed};
use crate::services::upstream::Fetched;
use crate::storage::{StorageExt, StorageGateway};
use crate::utils::race_utils::{parse_count, parse_points, parse_position};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StandingsOutcome {
    Replaced { drivers: usize, constructors: usize },
    NoData,
}

/// Podium finishes per driver and per constructor over processed main races.
#[derive(Debug, Default, PartialEq)]
pub struct SeasonPodiums {
    pub drivers: HashMap<String, u32>,
    pub constructors: HashMap<String, u32>,
}

impl SeasonPodiums {
    pub fn count(races: &[Race]) -> Self {
        let mut podiums = SeasonPodiums::default();
        for race in races.iter().filter(|r| r.standings_updated) {
            for result in race.results.iter().take(3) {
                *podiums.drivers.entry(result.driver_id.clone()).or_default() += 1;
                *podiums
                    .constructors
                    .entry(result.constructor_id.clone())
                    .or_default() += 1;
            }
        }
        podiums
    }
}

fn standing_position(raw: Option<&str>, index: usize) -> Result<u32, MappingError> {
    match raw {
        Some(p) => parse_position(p),
        None => Ok(index as u32 + 1),
    }
}

pub fn build_driver_standings(
    season: i32,
    feed: &[ErgastDriverStanding],
    previous: &HashMap<String, u32>,
    podiums: &SeasonPodiums,
) -> Vec<DriverStanding> {
    feed.iter()
        .enumerate()
        .filter_map(|(index, row)| {
            let mapped = (|| {
                let position = standing_position(row.position.as_deref(), index)?;
                Ok::<_, MappingError>(DriverStanding {
                    driver_id: row.driver.driver_id.clone(),
                    season,
                    position,
                    points: parse_points(&row.points)?,
                    wins: parse_count("wins", &row.wins)?,
                    podiums: podiums
                        .drivers
                        .get(&row.driver.driver_id)
                        .copied()
                        .unwrap_or(0),
                    positions_moved: positions_moved(
                        position,
                        previous.get(&row.driver.driver_id).copied(),
                    ),
                    constructor_id: row.constructors.last().map(|c| c.constructor_id.clone()),
                })
            })();
            mapped
                .map_err(|e| warn!("Skipping driver standing of {}: {e}", row.driver.driver_id))
                .ok()
        })
        .collect()
}

pub fn build_constructor_standings(
    season: i32,
    feed: &[ErgastConstructorStanding],
    previous: &HashMap<String, u32>,
    podiums: &SeasonPodiums,
) -> Vec<ConstructorStanding> {
    feed.iter()
        .enumerate()
        .filter_map(|(index, row)| {
            let id = &row.constructor.constructor_id;
            let mapped = (|| {
                let position = standing_position(row.position.as_deref(), index)?;
                Ok::<_, MappingError>(ConstructorStanding {
                    constructor_id: id.clone(),
                    season,
                    position,
                    points: parse_points(&row.points)?,
                    wins: parse_count("wins", &row.wins)?,
                    podiums: podiums.constructors.get(id).copied().unwrap_or(0),
                    positions_moved: positions_moved(position, previous.get(id).copied()),
                })
            })();
            mapped
                .map_err(|e| warn!("Skipping constructor standing of {id}: {e}"))
                .ok()
        })
        .collect()
}

#[derive(Clone)]
pub struct StandingsUpdater {
    store: Arc<dyn StorageGateway>,
    historical: HistoricalClient,
}

impl StandingsUpdater {
    pub fn new(store: Arc<dyn StorageGateway>, historical: HistoricalClient) -> Self {
        Self { store, historical }
    }

    /// Replace both standings collections for `season`. On `NoData` the
    /// previous snapshot is left untouched.
    pub async fn recompute(&self, season: i32) -> Result<StandingsOutcome, IngestError> {
        let StandingsFeed {
            drivers: driver_feed,
            constructors: constructor_feed,
        } = match self.historical.standings(season).await? {
            Fetched::Data(feed) => feed,
            Fetched::NoData => {
                info!("{season}: no standings published yet, keeping previous snapshot");
                return Ok(StandingsOutcome::NoData);
            }
        };

        let previous_drivers: HashMap<String, u32> = self
            .store
            .fetch_all::<DriverStanding>()
            .await?
            .into_iter()
            .filter(|s| s.season == season)
            .map(|s| (s.driver_id, s.position))
            .collect();
        let previous_constructors: HashMap<String, u32> = self
            .store
            .fetch_all::<ConstructorStanding>()
            .await?
            .into_iter()
            .filter(|s| s.season == season)
            .map(|s| (s.constructor_id, s.position))
            .collect();

        let races: Vec<Race> = self.store.fetch_by("season", json!(season)).await?;
        let podiums = SeasonPodiums::count(&races);

        let drivers = build_driver_standings(season, &driver_feed, &previous_drivers, &podiums);
        let constructors = build_constructor_standings(
            season,
            &constructor_feed,
            &previous_constructors,
            &podiums,
        );

        self.store.remove_all::<DriverStanding>().await?;
        self.store.store_all(&drivers).await?;
        self.store.remove_all::<ConstructorStanding>().await?;
        self.store.store_all(&constructors).await?;

        info!(
            "{season}: replaced standings ({} drivers, {} constructors)",
            drivers.len(),
            constructors.len()
        );
        Ok(StandingsOutcome::Replaced {
            drivers: drivers.len(),
            constructors: constructors.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::race::{Circuit, RaceResult};
    use chrono::NaiveDate;
    use serde_json::json;

    fn driver_row(position: Option<&str>, id: &str, points: &str) -> ErgastDriverStanding {
        serde_json::from_value(json!({
            "position": position,
            "points": points,
            "wins": "0",
            "Driver": {"driverId": id, "givenName": "G", "familyName": id},
            "Constructors": [{"constructorId": "team", "name": "Team"}],
        }))
        .unwrap()
    }

    #[test]
    fn movement_against_previous_snapshot() {
        let feed = vec![
            driver_row(Some("1"), "norris", "300"),
            driver_row(Some("2"), "max_verstappen", "290"),
            driver_row(Some("3"), "bearman", "12"),
        ];
        let previous = HashMap::from([
            ("norris".to_string(), 2u32),
            ("max_verstappen".to_string(), 1u32),
        ]);
        let standings =
            build_driver_standings(2025, &feed, &previous, &SeasonPodiums::default());

        let moved: Vec<_> = standings
            .iter()
            .map(|s| (s.driver_id.as_str(), s.positions_moved))
            .collect();
        assert_eq!(
            moved,
            vec![("norris", -1), ("max_verstappen", 1), ("bearman", 0)]
        );
        assert_eq!(standings[0].constructor_id.as_deref(), Some("team"));
    }

    #[test]
    fn bad_rows_are_skipped_and_missing_positions_follow_order() {
        let feed = vec![
            driver_row(Some("1"), "norris", "300"),
            driver_row(Some("2"), "broken", "lots"),
            driver_row(None, "unclassified", "0"),
        ];
        let standings =
            build_driver_standings(2025, &feed, &HashMap::new(), &SeasonPodiums::default());
        assert_eq!(standings.len(), 2);
        assert_eq!(standings[1].driver_id, "unclassified");
        assert_eq!(standings[1].position, 3);
    }

    #[test]
    fn season_podiums_count_only_processed_races() {
        let result = |pos: u32, d: &str, c: &str| RaceResult {
            position: pos,
            driver_id: d.into(),
            constructor_id: c.into(),
            points: "0".into(),
            status: String::new(),
            grid: None,
            fastest_lap_rank: None,
        };
        let race = |processed: bool| Race {
            id: String::new(),
            season: 2025,
            round: 1,
            race_name: "x".into(),
            date: NaiveDate::from_ymd_opt(2025, 3, 16).unwrap(),
            time: None,
            circuit: Circuit::default(),
            results: vec![
                result(1, "norris", "mclaren"),
                result(2, "piastri", "mclaren"),
                result(3, "russell", "mercedes"),
                result(4, "leclerc", "ferrari"),
            ],
            qualifying: vec![],
            sprint: vec![],
            standings_updated: processed,
        };
        let podiums = SeasonPodiums::count(&[race(true), race(false)]);
        assert_eq!(podiums.drivers.get("norris"), Some(&1));
        assert_eq!(podiums.drivers.get("leclerc"), None);
        assert_eq!(podiums.constructors.get("mclaren"), Some(&2));
    }
}
