use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::storage::{Collection, Document};

/// Cumulative counters shared by drivers and constructors.
///
/// Sprint counters are kept apart from the main-race ones; sprint points are
/// added to both `points` and `sprint_points`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Counters {
    pub wins: u32,
    pub podiums: u32,
    pub points: f64,
    pub poles: u32,
    pub fastest_laps: u32,
    pub total_races: u32,
    pub sprint_wins: u32,
    pub sprint_podiums: u32,
    pub sprint_points: f64,
    pub sprint_races: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Driver {
    pub driver_id: String,
    pub given_name: String,
    pub family_name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub nationality: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub car_number: Option<u32>,
    /// Constructor id when the live team resolved to a known constructor,
    /// otherwise the live team name.
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub active: bool,
    /// Created from the live feed alone, before the historical provider knew
    /// the driver. Retired once a historical record with the same name appears.
    #[serde(default)]
    pub live_only: bool,
    #[serde(flatten)]
    pub stats: Counters,
}

impl Driver {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.given_name, self.family_name)
            .trim()
            .to_string()
    }
}

impl Document for Driver {
    const COLLECTION: Collection = Collection::Drivers;

    fn id(&self) -> String {
        self.driver_id.clone()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Constructor {
    pub constructor_id: String,
    pub name: String,
    #[serde(default)]
    pub nationality: Option<String>,
    /// Hex display colour without the leading `#`.
    #[serde(default)]
    pub color: Option<String>,
    #[serde(flatten)]
    pub stats: Counters,
}

impl Document for Constructor {
    const COLLECTION: Collection = Collection::Constructors;

    fn id(&self) -> String {
        self.constructor_id.clone()
    }
}
