use serde::{Deserialize, Serialize};

use crate::storage::{Collection, Document};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverStanding {
    pub driver_id: String,
    pub season: i32,
    pub position: u32,
    pub points: f64,
    pub wins: u32,
    pub podiums: u32,
    /// `position - previous position`; 0 on first appearance.
    pub positions_moved: i32,
    #[serde(default)]
    pub constructor_id: Option<String>,
}

impl Document for DriverStanding {
    const COLLECTION: Collection = Collection::DriverStandings;

    fn id(&self) -> String {
        self.driver_id.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstructorStanding {
    pub constructor_id: String,
    pub season: i32,
    pub position: u32,
    pub points: f64,
    pub wins: u32,
    pub podiums: u32,
    pub positions_moved: i32,
}

impl Document for ConstructorStanding {
    const COLLECTION: Collection = Collection::ConstructorStandings;

    fn id(&self) -> String {
        self.constructor_id.clone()
    }
}

/// Signed movement against the previous snapshot.
pub fn positions_moved(current: u32, previous: Option<u32>) -> i32 {
    match previous {
        Some(prev) => current as i32 - prev as i32,
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_appearance_has_not_moved() {
        assert_eq!(positions_moved(4, None), 0);
    }

    #[test]
    fn movement_is_new_minus_old() {
        assert_eq!(positions_moved(2, Some(5)), -3);
        assert_eq!(positions_moved(7, Some(3)), 4);
        assert_eq!(positions_moved(1, Some(1)), 0);
    }
}
