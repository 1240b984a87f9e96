use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use chrono::{Datelike, Utc};
use serde::Deserialize;

use crate::models::error::ConfigError;
use crate::utils::race_utils::name_key;

#[derive(Debug, Clone)]
pub struct Config {
    pub supabase_project_url: String,
    pub supabase_service_role_key: String,
    pub historical_base_url: String,
    pub live_base_url: String,
    pub current_season: i32,
    pub historical_backoff: Duration,
    pub live_backoff: Duration,
    pub max_fetch_attempts: u32,
    pub page_delay: Duration,
    pub http_timeout: Duration,
    pub bind_addr: String,
    pub identity_tables: IdentityTables,
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn optional<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn init() -> Result<Self, ConfigError> {
        let identity_tables = match std::env::var("IDENTITY_TABLES_PATH") {
            Ok(path) => IdentityTables::from_file(&path)?,
            Err(_) => IdentityTables::default(),
        };

        Ok(Config {
            supabase_project_url: required("SUPABASE_PROJECT_URL")?,
            supabase_service_role_key: required("SUPABASE_SERVICE_ROLE_KEY")?,
            historical_base_url: optional(
                "HISTORICAL_BASE_URL",
                "https://api.jolpi.ca/ergast/f1".to_string(),
            )?,
            live_base_url: optional("LIVE_BASE_URL", "https://api.openf1.org/v1".to_string())?,
            current_season: optional("CURRENT_SEASON", Utc::now().year())?,
            historical_backoff: Duration::from_secs(optional("HISTORICAL_BACKOFF_SECS", 30)?),
            live_backoff: Duration::from_secs(optional("LIVE_BACKOFF_SECS", 20)?),
            max_fetch_attempts: optional("MAX_FETCH_ATTEMPTS", 5)?,
            page_delay: Duration::from_millis(optional("PAGE_DELAY_MS", 500)?),
            http_timeout: Duration::from_secs(optional("HTTP_TIMEOUT_SECS", 10)?),
            bind_addr: optional("BIND_ADDR", "127.0.0.1:3000".to_string())?,
            identity_tables,
        })
    }
}

/// Curated cross-provider lookup data, loaded once at startup.
///
/// Keys are compared after [`name_key`] normalisation, so `"Nico Hulkenberg"`
/// and `"NICO HULKENBERG"` are the same entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct IdentityTables {
    /// Live driver name -> historical full name.
    pub driver_names: HashMap<String, String>,
    /// Live team name -> historical constructor name.
    pub team_names: HashMap<String, String>,
    /// Constructor id -> hex colour.
    pub team_colors: HashMap<String, String>,
}

impl IdentityTables {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::IdentityTables {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        let tables: IdentityTables =
            serde_json::from_str(&raw).map_err(|e| ConfigError::IdentityTables {
                path: path.to_string(),
                reason: e.to_string(),
            })?;
        Ok(tables.normalized())
    }

    fn normalized(self) -> Self {
        let keyed = |m: HashMap<String, String>| {
            m.into_iter()
                .map(|(k, v)| (name_key(&k), v))
                .collect::<HashMap<_, _>>()
        };
        IdentityTables {
            driver_names: keyed(self.driver_names),
            team_names: keyed(self.team_names),
            team_colors: self.team_colors,
        }
    }

    pub fn driver_name<'a>(&'a self, live_name: &'a str) -> &'a str {
        self.driver_names
            .get(&name_key(live_name))
            .map(String::as_str)
            .unwrap_or(live_name)
    }

    pub fn team_name<'a>(&'a self, live_team: &'a str) -> &'a str {
        self.team_names
            .get(&name_key(live_team))
            .map(String::as_str)
            .unwrap_or(live_team)
    }

    pub fn team_color(&self, constructor_id: &str) -> Option<&str> {
        self.team_colors.get(constructor_id).map(String::as_str)
    }
}

impl Default for IdentityTables {
    fn default() -> Self {
        let pairs = |entries: &[(&str, &str)]| {
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>()
        };
        IdentityTables {
            driver_names: pairs(&[
                ("Nico HULKENBERG", "Nico Hülkenberg"),
                ("Sergio PEREZ", "Sergio Pérez"),
                ("Kimi RAIKKONEN", "Kimi Räikkönen"),
                ("ZHOU Guanyu", "Guanyu Zhou"),
                ("Guanyu ZHOU", "Guanyu Zhou"),
                ("Kimi ANTONELLI", "Andrea Kimi Antonelli"),
                ("Alex ALBON", "Alexander Albon"),
            ]),
            team_names: pairs(&[
                ("Red Bull Racing", "Red Bull"),
                ("Kick Sauber", "Sauber"),
                ("Racing Bulls", "RB F1 Team"),
                ("RB", "RB F1 Team"),
                ("Alpine", "Alpine F1 Team"),
            ]),
            team_colors: pairs(&[
                ("red_bull", "3671C6"),
                ("ferrari", "E8002D"),
                ("mercedes", "27F4D2"),
                ("mclaren", "FF8000"),
                ("aston_martin", "229971"),
                ("alpine", "0093CC"),
                ("williams", "64C4FF"),
                ("rb", "6692FF"),
                ("sauber", "52E252"),
                ("haas", "B6BABD"),
            ]),
        }
        .normalized()
    }
}
