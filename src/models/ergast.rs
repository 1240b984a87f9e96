//! Wire shapes of the historical provider.
//!
//! Every table under `MRData` is optional: a missing table and an empty list
//! both mean "no data yet". Mapping into domain types happens here and skips
//! individual records that cannot be mapped.

use serde::Deserialize;
use tracing::warn;

use crate::models::driver::{Constructor, Driver};
use crate::models::error::MappingError;
use crate::models::race::{Circuit, QualifyingResult, Race, RaceResult};
use crate::utils::race_utils::{parse_date, parse_position, parse_time};

#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(rename = "MRData")]
    pub mr_data: MrData,
}

#[derive(Debug, Default, Deserialize)]
pub struct MrData {
    #[serde(default)]
    pub total: Option<String>,
    #[serde(default)]
    pub limit: Option<String>,
    #[serde(default)]
    pub offset: Option<String>,
    #[serde(rename = "RaceTable", default)]
    pub race_table: Option<RaceTable>,
    #[serde(rename = "DriverTable", default)]
    pub driver_table: Option<DriverTable>,
    #[serde(rename = "ConstructorTable", default)]
    pub constructor_table: Option<ConstructorTable>,
    #[serde(rename = "StandingsTable", default)]
    pub standings_table: Option<StandingsTable>,
}

impl MrData {
    pub fn total(&self) -> Option<u32> {
        self.total.as_deref().and_then(|t| t.parse().ok())
    }

    pub fn into_races(self) -> Vec<ErgastRace> {
        self.race_table.map(|t| t.races).unwrap_or_default()
    }

    pub fn into_drivers(self) -> Vec<ErgastDriver> {
        self.driver_table.map(|t| t.drivers).unwrap_or_default()
    }

    pub fn into_constructors(self) -> Vec<ErgastConstructor> {
        self.constructor_table.map(|t| t.constructors).unwrap_or_default()
    }

    /// The first standings list, if the season has one yet.
    pub fn into_standings(self) -> Option<StandingsList> {
        self.standings_table
            .and_then(|t| t.standings_lists.into_iter().next())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RaceTable {
    #[serde(rename = "Races", default)]
    pub races: Vec<ErgastRace>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DriverTable {
    #[serde(rename = "Drivers", default)]
    pub drivers: Vec<ErgastDriver>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConstructorTable {
    #[serde(rename = "Constructors", default)]
    pub constructors: Vec<ErgastConstructor>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StandingsTable {
    #[serde(rename = "StandingsLists", default)]
    pub standings_lists: Vec<StandingsList>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StandingsList {
    #[serde(default)]
    pub season: Option<String>,
    #[serde(default)]
    pub round: Option<String>,
    #[serde(rename = "DriverStandings", default)]
    pub driver_standings: Vec<ErgastDriverStanding>,
    #[serde(rename = "ConstructorStandings", default)]
    pub constructor_standings: Vec<ErgastConstructorStanding>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErgastDriver {
    #[serde(rename = "driverId")]
    pub driver_id: String,
    #[serde(rename = "permanentNumber", default)]
    pub permanent_number: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(rename = "givenName")]
    pub given_name: String,
    #[serde(rename = "familyName")]
    pub family_name: String,
    #[serde(rename = "dateOfBirth", default)]
    pub date_of_birth: Option<String>,
    #[serde(default)]
    pub nationality: Option<String>,
}

impl From<ErgastDriver> for Driver {
    fn from(d: ErgastDriver) -> Self {
        Driver {
            driver_id: d.driver_id,
            given_name: d.given_name,
            family_name: d.family_name,
            code: d.code,
            nationality: d.nationality,
            date_of_birth: d.date_of_birth.as_deref().and_then(|s| parse_date(s).ok()),
            car_number: d.permanent_number.as_deref().and_then(|n| n.parse().ok()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErgastConstructor {
    #[serde(rename = "constructorId")]
    pub constructor_id: String,
    pub name: String,
    #[serde(default)]
    pub nationality: Option<String>,
}

impl From<ErgastConstructor> for Constructor {
    fn from(c: ErgastConstructor) -> Self {
        Constructor {
            constructor_id: c.constructor_id,
            name: c.name,
            nationality: c.nationality,
            ..Default::default()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ErgastLocation {
    #[serde(default)]
    pub lat: Option<String>,
    #[serde(default)]
    pub long: Option<String>,
    #[serde(default)]
    pub locality: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ErgastCircuit {
    #[serde(rename = "circuitId")]
    pub circuit_id: String,
    #[serde(rename = "circuitName")]
    pub circuit_name: String,
    #[serde(rename = "Location", default)]
    pub location: Option<ErgastLocation>,
}

impl From<ErgastCircuit> for Circuit {
    fn from(c: ErgastCircuit) -> Self {
        let location = c.location;
        let coord = |v: Option<&String>| v.and_then(|s| s.parse::<f64>().ok());
        Circuit {
            circuit_id: c.circuit_id,
            circuit_name: c.circuit_name,
            lat: coord(location.as_ref().and_then(|l| l.lat.as_ref())),
            long: coord(location.as_ref().and_then(|l| l.long.as_ref())),
            locality: location.as_ref().and_then(|l| l.locality.clone()),
            country: location.and_then(|l| l.country),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ErgastFastestLap {
    #[serde(default)]
    pub rank: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ErgastResult {
    pub position: String,
    pub points: String,
    #[serde(default)]
    pub grid: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(rename = "Driver")]
    pub driver: ErgastDriver,
    #[serde(rename = "Constructor")]
    pub constructor: ErgastConstructor,
    #[serde(rename = "FastestLap", default)]
    pub fastest_lap: Option<ErgastFastestLap>,
}

impl ErgastResult {
    fn to_result(&self) -> Result<RaceResult, MappingError> {
        Ok(RaceResult {
            position: parse_position(&self.position)?,
            driver_id: self.driver.driver_id.clone(),
            constructor_id: self.constructor.constructor_id.clone(),
            points: self.points.clone(),
            status: self.status.clone().unwrap_or_default(),
            grid: self.grid.as_deref().and_then(|g| g.parse().ok()),
            fastest_lap_rank: self.fastest_lap.as_ref().and_then(|f| f.rank.clone()),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ErgastQualifying {
    pub position: String,
    #[serde(rename = "Driver")]
    pub driver: ErgastDriver,
    #[serde(rename = "Constructor")]
    pub constructor: ErgastConstructor,
}

#[derive(Debug, Deserialize)]
pub struct ErgastRace {
    pub season: String,
    pub round: String,
    #[serde(rename = "raceName")]
    pub race_name: String,
    #[serde(rename = "Circuit")]
    pub circuit: ErgastCircuit,
    pub date: String,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(rename = "Results", default)]
    pub results: Option<Vec<ErgastResult>>,
    #[serde(rename = "QualifyingResults", default)]
    pub qualifying: Option<Vec<ErgastQualifying>>,
    #[serde(rename = "SprintResults", default)]
    pub sprint: Option<Vec<ErgastResult>>,
}

impl ErgastRace {
    /// Every driver and constructor referenced by any result table.
    pub fn identities(&self) -> (Vec<Driver>, Vec<Constructor>) {
        let mut drivers = Vec::new();
        let mut constructors = Vec::new();
        let rows = self
            .results
            .iter()
            .flatten()
            .chain(self.sprint.iter().flatten())
            .map(|r| (&r.driver, &r.constructor))
            .chain(
                self.qualifying
                    .iter()
                    .flatten()
                    .map(|q| (&q.driver, &q.constructor)),
            );
        for (driver, constructor) in rows {
            if !drivers.iter().any(|d: &Driver| d.driver_id == driver.driver_id) {
                drivers.push(Driver::from(driver.clone()));
            }
            if !constructors
                .iter()
                .any(|c: &Constructor| c.constructor_id == constructor.constructor_id)
            {
                constructors.push(Constructor::from(constructor.clone()));
            }
        }
        (drivers, constructors)
    }

    /// Maps into a domain race. Schedule fields must parse; individual result
    /// rows that do not are logged and dropped. Rows are sorted by position.
    pub fn into_race(self) -> Result<Race, MappingError> {
        let season = self
            .season
            .parse::<i32>()
            .map_err(|_| MappingError::new("season", &self.season))?;
        let round = self
            .round
            .parse::<u32>()
            .map_err(|_| MappingError::new("round", &self.round))?;
        let date = parse_date(&self.date)?;
        let time = match self.time.as_deref() {
            Some(t) => Some(parse_time(t)?),
            None => None,
        };

        let results = map_results(self.results.as_deref().unwrap_or_default(), season, round);
        let sprint = map_results(self.sprint.as_deref().unwrap_or_default(), season, round);
        let mut qualifying: Vec<QualifyingResult> = self
            .qualifying
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter_map(|q| match parse_position(&q.position) {
                Ok(position) => Some(QualifyingResult {
                    position,
                    driver_id: q.driver.driver_id.clone(),
                    constructor_id: q.constructor.constructor_id.clone(),
                }),
                Err(e) => {
                    warn!("{season}-{round}: skipping qualifying row for {}: {e}", q.driver.driver_id);
                    None
                }
            })
            .collect();
        qualifying.sort_by_key(|q| q.position);

        Ok(Race {
            id: String::new(),
            season,
            round,
            race_name: self.race_name,
            date,
            time,
            circuit: self.circuit.into(),
            results,
            qualifying,
            sprint,
            standings_updated: false,
        })
    }
}

fn map_results(rows: &[ErgastResult], season: i32, round: u32) -> Vec<RaceResult> {
    let mut mapped: Vec<RaceResult> = rows
        .iter()
        .filter_map(|r| match r.to_result() {
            Ok(result) => Some(result),
            Err(e) => {
                warn!("{season}-{round}: skipping result row for {}: {e}", r.driver.driver_id);
                None
            }
        })
        .collect();
    mapped.sort_by_key(|r| r.position);
    mapped
}

#[derive(Debug, Deserialize)]
pub struct ErgastDriverStanding {
    #[serde(default)]
    pub position: Option<String>,
    pub points: String,
    pub wins: String,
    #[serde(rename = "Driver")]
    pub driver: ErgastDriver,
    #[serde(rename = "Constructors", default)]
    pub constructors: Vec<ErgastConstructor>,
}

#[derive(Debug, Deserialize)]
pub struct ErgastConstructorStanding {
    #[serde(default)]
    pub position: Option<String>,
    pub points: String,
    pub wins: String,
    #[serde(rename = "Constructor")]
    pub constructor: ErgastConstructor,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result_row(position: &str, driver: &str, team: &str, points: &str) -> serde_json::Value {
        json!({
            "position": position,
            "points": points,
            "status": "Finished",
            "Driver": {"driverId": driver, "givenName": "G", "familyName": driver},
            "Constructor": {"constructorId": team, "name": team},
        })
    }

    #[test]
    fn missing_race_table_means_no_races() {
        let env: Envelope = serde_json::from_value(json!({"MRData": {"total": "0"}})).unwrap();
        assert!(env.mr_data.into_races().is_empty());

        let env: Envelope =
            serde_json::from_value(json!({"MRData": {"RaceTable": {"Races": []}}})).unwrap();
        assert!(env.mr_data.into_races().is_empty());
    }

    #[test]
    fn maps_race_sorting_results_and_dropping_bad_rows() {
        let raw = json!({
            "season": "2024",
            "round": "5",
            "raceName": "Chinese Grand Prix",
            "date": "2024-04-21",
            "time": "07:00:00Z",
            "Circuit": {
                "circuitId": "shanghai",
                "circuitName": "Shanghai International Circuit",
                "Location": {"lat": "31.3389", "long": "121.22", "locality": "Shanghai", "country": "China"}
            },
            "Results": [
                result_row("2", "norris", "mclaren", "18"),
                result_row("1", "max_verstappen", "red_bull", "25"),
                result_row("X", "ghost", "none", "0"),
            ],
        });
        let race: ErgastRace = serde_json::from_value(raw).unwrap();
        let (drivers, constructors) = race.identities();
        assert_eq!(drivers.len(), 3);
        assert_eq!(constructors.len(), 3);

        let race = race.into_race().unwrap();
        assert_eq!(race.season, 2024);
        assert_eq!(race.round, 5);
        assert_eq!(race.circuit.country.as_deref(), Some("China"));
        assert_eq!(race.circuit.lat, Some(31.3389));
        assert_eq!(race.results.len(), 2);
        assert_eq!(race.results[0].driver_id, "max_verstappen");
        assert!(race.sprint.is_empty());
        assert!(!race.standings_updated);
    }

    #[test]
    fn unparseable_round_is_a_mapping_error() {
        let raw = json!({
            "season": "2024",
            "round": "next",
            "raceName": "?",
            "date": "2024-04-21",
            "Circuit": {"circuitId": "x", "circuitName": "x"},
        });
        let race: ErgastRace = serde_json::from_value(raw).unwrap();
        assert_eq!(race.into_race().unwrap_err().field, "round");
    }
}
