use serde::Deserialize;

/// One row of the live provider's `drivers` feed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LiveDriver {
    #[serde(default)]
    pub driver_number: Option<u32>,
    /// Given name followed by the uppercase family name, e.g. `Max VERSTAPPEN`.
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub broadcast_name: Option<String>,
    #[serde(default)]
    pub name_acronym: Option<String>,
    #[serde(default)]
    pub team_name: Option<String>,
    #[serde(default)]
    pub team_colour: Option<String>,
    #[serde(default)]
    pub headshot_url: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub session_key: Option<i64>,
    #[serde(default)]
    pub meeting_key: Option<i64>,
}

impl LiveDriver {
    pub fn display_name(&self) -> Option<String> {
        if let Some(full) = self.full_name.as_deref().filter(|n| !n.trim().is_empty()) {
            return Some(full.trim().to_string());
        }
        match (self.first_name.as_deref(), self.last_name.as_deref()) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            _ => None,
        }
    }
}

/// Which sessions the live `drivers` query covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionFilter {
    Latest,
    Session(i64),
    Meeting(i64),
    All,
}

impl SessionFilter {
    pub fn query(&self) -> Vec<(&'static str, String)> {
        match self {
            SessionFilter::Latest => vec![("session_key", "latest".to_string())],
            SessionFilter::Session(key) => vec![("session_key", key.to_string())],
            SessionFilter::Meeting(key) => vec![("meeting_key", key.to_string())],
            SessionFilter::All => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_sparse_rows() {
        let rows: Vec<LiveDriver> = serde_json::from_value(json!([
            {"driver_number": 27, "full_name": "Nico HULKENBERG", "team_name": "Kick Sauber"},
            {"driver_number": 1, "first_name": "Max", "last_name": "Verstappen"},
            {"driver_number": 99}
        ]))
        .unwrap();
        assert_eq!(rows[0].display_name().as_deref(), Some("Nico HULKENBERG"));
        assert_eq!(rows[1].display_name().as_deref(), Some("Max Verstappen"));
        assert_eq!(rows[2].display_name(), None);
    }

    #[test]
    fn session_filter_builds_query() {
        assert_eq!(SessionFilter::Latest.query(), vec![("session_key", "latest".to_string())]);
        assert_eq!(SessionFilter::Meeting(1219).query(), vec![("meeting_key", "1219".to_string())]);
        assert!(SessionFilter::All.query().is_empty());
    }
}
