use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::{Collection, Document};

/// Composite race identity. At most one Race document exists per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RaceKey {
    pub season: i32,
    pub round: u32,
}

impl RaceKey {
    pub fn new(season: i32, round: u32) -> Self {
        Self { season, round }
    }

    pub fn doc_id(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.season, self.round)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Circuit {
    pub circuit_id: String,
    pub circuit_name: String,
    #[serde(default)]
    pub locality: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub long: Option<f64>,
}

/// One classified entry of a main race or sprint. Owned by its [`Race`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceResult {
    pub position: u32,
    pub driver_id: String,
    pub constructor_id: String,
    /// Raw points as published upstream, parsed when folded.
    pub points: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub grid: Option<u32>,
    #[serde(default)]
    pub fastest_lap_rank: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualifyingResult {
    pub position: u32,
    pub driver_id: String,
    pub constructor_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Race {
    /// Storage id. Canonical documents use `"{season}-{round}"`.
    #[serde(default)]
    pub id: String,
    pub season: i32,
    pub round: u32,
    pub race_name: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub time: Option<NaiveTime>,
    pub circuit: Circuit,
    #[serde(default)]
    pub results: Vec<RaceResult>,
    #[serde(default)]
    pub qualifying: Vec<QualifyingResult>,
    #[serde(default)]
    pub sprint: Vec<RaceResult>,
    #[serde(default)]
    pub standings_updated: bool,
}

impl Race {
    pub fn key(&self) -> RaceKey {
        RaceKey::new(self.season, self.round)
    }

    /// Scheduled start in UTC. Races without a published time start at midnight UTC.
    pub fn starts_at(&self) -> DateTime<Utc> {
        self.date
            .and_time(self.time.unwrap_or(NaiveTime::MIN))
            .and_utc()
    }

    /// Copies schedule fields from a fresher calendar entry, keeping results
    /// and the processed flag of this document.
    pub fn merge_schedule(&mut self, calendar: &Race) {
        self.race_name = calendar.race_name.clone();
        self.date = calendar.date;
        self.time = calendar.time;
        self.circuit = calendar.circuit.clone();
    }
}

impl Document for Race {
    const COLLECTION: Collection = Collection::Races;

    fn id(&self) -> String {
        if self.id.is_empty() {
            self.key().doc_id()
        } else {
            self.id.clone()
        }
    }
}

/// A race whose results have not yet been folded into the cumulative counters.
///
/// This is the only input the statistics accumulator accepts, which makes the
/// `standingsUpdated` check a precondition of every fold.
#[derive(Debug, Clone, Copy)]
pub struct UnprocessedRace<'a> {
    race: &'a Race,
}

impl<'a> UnprocessedRace<'a> {
    pub fn new(race: &'a Race) -> Option<Self> {
        (!race.standings_updated).then_some(Self { race })
    }

    /// Used only while rebuilding counters from zero.
    pub(crate) fn for_rebuild(race: &'a Race) -> Self {
        Self { race }
    }

    pub fn race(&self) -> &'a Race {
        self.race
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn race(time: Option<NaiveTime>) -> Race {
        Race {
            id: String::new(),
            season: 2024,
            round: 3,
            race_name: "Australian Grand Prix".into(),
            date: NaiveDate::from_ymd_opt(2024, 3, 24).unwrap(),
            time,
            circuit: Circuit::default(),
            results: vec![],
            qualifying: vec![],
            sprint: vec![],
            standings_updated: false,
        }
    }

    #[test]
    fn starts_at_combines_date_and_time() {
        let r = race(NaiveTime::from_hms_opt(4, 0, 0));
        assert_eq!(r.starts_at().to_rfc3339(), "2024-03-24T04:00:00+00:00");
        assert_eq!(race(None).starts_at().to_rfc3339(), "2024-03-24T00:00:00+00:00");
    }

    #[test]
    fn document_id_falls_back_to_key() {
        let mut r = race(None);
        assert_eq!(r.id(), "2024-3");
        r.id = "legacy-17".into();
        assert_eq!(r.id(), "legacy-17");
    }

    #[test]
    fn processed_races_cannot_be_folded() {
        let mut r = race(None);
        assert!(UnprocessedRace::new(&r).is_some());
        r.standings_updated = true;
        assert!(UnprocessedRace::new(&r).is_none());
    }
}
