//! Merges live-provider roster rows into the historical identity space.
//!
//! Historical ids and descriptive fields always win; live rows only add the
//! current team, car number, headshot and the `active` flag. A live row that
//! matches nobody gets a fresh slug id, never an existing one.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::models::driver::{Constructor, Driver};
use crate::models::openf1::LiveDriver;
use crate::utils::config::IdentityTables;
use crate::utils::race_utils::{name_key, slugify};

#[derive(Debug, Default)]
pub struct Roster {
    pub drivers: Vec<Driver>,
    pub constructors: Vec<Constructor>,
    pub matched: usize,
    pub created: usize,
    /// Live-only driver ids superseded by a historical record of the same name.
    pub retired: Vec<String>,
}

#[derive(Clone)]
pub struct IdentityReconciler {
    tables: Arc<IdentityTables>,
}

impl IdentityReconciler {
    pub fn new(tables: Arc<IdentityTables>) -> Self {
        Self { tables }
    }

    /// Historical constructor a live team name refers to, if any.
    pub fn resolve_constructor<'a>(
        &self,
        live_team: &str,
        known: &'a [Constructor],
    ) -> Option<&'a Constructor> {
        let wanted = name_key(self.tables.team_name(live_team));
        known.iter().find(|c| name_key(&c.name) == wanted)
    }

    /// Index of the driver a live row refers to, if any. Historical records
    /// win over live-only ones carrying the same name.
    fn resolve_driver(&self, live_name: &str, known: &[Driver]) -> Option<usize> {
        let wanted = name_key(self.tables.driver_name(live_name));
        known
            .iter()
            .enumerate()
            .filter(|(_, d)| name_key(&d.full_name()) == wanted)
            .min_by_key(|(_, d)| d.live_only)
            .map(|(index, _)| index)
    }

    fn canonical_key(&self, driver: &Driver) -> String {
        name_key(self.tables.driver_name(&driver.full_name()))
    }

    /// Drop live-only drivers that now have a historical counterpart, moving
    /// their live fields onto it where it has none. Returns the dropped ids.
    fn retire_live_duplicates(&self, drivers: &mut Vec<Driver>) -> Vec<String> {
        let historical: HashMap<String, usize> = drivers
            .iter()
            .enumerate()
            .filter(|(_, d)| !d.live_only)
            .map(|(index, d)| (self.canonical_key(d), index))
            .collect();
        let duplicates: Vec<(usize, usize)> = drivers
            .iter()
            .enumerate()
            .filter(|(_, d)| d.live_only)
            .filter_map(|(index, d)| historical.get(&self.canonical_key(d)).map(|&h| (index, h)))
            .collect();

        for &(dup, keep) in &duplicates {
            let live = drivers[dup].clone();
            let target = &mut drivers[keep];
            target.car_number = target.car_number.or(live.car_number);
            target.team = target.team.take().or(live.team);
            target.image_url = target.image_url.take().or(live.image_url);
            target.code = target.code.take().or(live.code);
            info!(
                "Live-only driver {} superseded by historical {}",
                live.driver_id, target.driver_id
            );
        }
        let retired: HashSet<usize> = duplicates.iter().map(|&(dup, _)| dup).collect();
        let ids = retired.iter().map(|&i| drivers[i].driver_id.clone()).collect();
        let mut index = 0;
        drivers.retain(|_| {
            let keep = !retired.contains(&index);
            index += 1;
            keep
        });
        ids
    }

    /// Merge one live row into the known drivers. Returns the index of the
    /// touched driver, or `None` when the row carries no usable name.
    pub fn reconcile_driver(
        &self,
        live: &LiveDriver,
        drivers: &mut Vec<Driver>,
        constructors: &[Constructor],
    ) -> Option<(usize, bool)> {
        let Some(name) = live.display_name() else {
            warn!("Skipping live driver #{:?} without a name", live.driver_number);
            return None;
        };
        let team = live.team_name.as_deref().map(|t| {
            self.resolve_constructor(t, constructors)
                .map(|c| c.constructor_id.clone())
                .unwrap_or_else(|| t.to_string())
        });

        let (index, created) = match self.resolve_driver(&name, drivers) {
            Some(index) => (index, false),
            None => {
                let driver = self.new_driver(live, &name, drivers);
                info!("Live driver {name} has no historical match, created {}", driver.driver_id);
                drivers.push(driver);
                (drivers.len() - 1, true)
            }
        };

        let driver = &mut drivers[index];
        if let Some(number) = live.driver_number {
            driver.car_number = Some(number);
        }
        if team.is_some() {
            driver.team = team;
        }
        if let Some(url) = live.headshot_url.as_ref().filter(|u| !u.is_empty()) {
            driver.image_url = Some(url.clone());
        }
        driver.active = true;
        debug!("Reconciled {name} -> {}", driver.driver_id);
        Some((index, created))
    }

    fn new_driver(&self, live: &LiveDriver, name: &str, known: &[Driver]) -> Driver {
        let canonical = self.tables.driver_name(name);
        let mut driver_id = slugify(canonical);
        if known.iter().any(|d| d.driver_id == driver_id) {
            driver_id = format!(
                "{driver_id}_{}",
                live.driver_number.map_or_else(|| "live".to_string(), |n| n.to_string())
            );
        }
        let (given, family) = match (live.first_name.as_deref(), live.last_name.as_deref()) {
            (Some(first), Some(last)) if canonical == name => (first.to_string(), last.to_string()),
            _ => match canonical.split_once(' ') {
                Some((first, rest)) => (first.to_string(), rest.to_string()),
                None => (String::new(), canonical.to_string()),
            },
        };
        Driver {
            driver_id,
            given_name: given,
            family_name: family,
            code: live.name_acronym.clone(),
            live_only: true,
            ..Default::default()
        }
    }

    /// Reconcile a whole live roster. Every known driver missing from the roster
    /// ends up inactive; constructors pick up display colours and live-only
    /// teams become new constructors.
    pub fn reconcile_roster(
        &self,
        live: &[LiveDriver],
        mut drivers: Vec<Driver>,
        mut constructors: Vec<Constructor>,
    ) -> Roster {
        let mut seen_teams: HashMap<String, Option<String>> = HashMap::new();
        for row in live {
            if let Some(team) = row.team_name.as_deref().filter(|t| !t.is_empty()) {
                seen_teams
                    .entry(team.to_string())
                    .or_insert_with(|| row.team_colour.clone());
            }
        }
        for (team, live_colour) in &seen_teams {
            if self.resolve_constructor(team, &constructors).is_none() {
                let constructor_id = slugify(self.tables.team_name(team));
                info!("Live team {team} has no historical match, created {constructor_id}");
                constructors.push(Constructor {
                    constructor_id,
                    name: self.tables.team_name(team).to_string(),
                    color: live_colour.clone(),
                    ..Default::default()
                });
            }
        }
        for constructor in constructors.iter_mut() {
            if let Some(color) = self.tables.team_color(&constructor.constructor_id) {
                constructor.color = Some(color.to_string());
            }
        }

        let mut retired = self.retire_live_duplicates(&mut drivers);
        retired.sort();
        for driver in drivers.iter_mut() {
            driver.active = false;
        }
        let mut active = HashSet::new();
        let mut created = 0;
        for row in live {
            if let Some((index, new)) = self.reconcile_driver(row, &mut drivers, &constructors) {
                if active.insert(index) && new {
                    created += 1;
                }
            }
        }

        info!(
            "Reconciled live roster: {} active drivers, {} new identities",
            active.len(),
            created
        );
        Roster {
            matched: active.len() - created,
            created,
            retired,
            drivers,
            constructors,
        }
    }
}
