#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use f1_pipeline::services::upstream::{RawResponse, Transport};
use f1_pipeline::models::error::StorageError;
use f1_pipeline::storage::{Collection, MemoryStore, StorageGateway};
use f1_pipeline::utils::backoff::RecordingSleeper;
use f1_pipeline::utils::config::{Config, IdentityTables};
use f1_pipeline::utils::state::AppState;
use http::StatusCode;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

pub const HISTORICAL: &str = "http://ergast.test/f1";
pub const LIVE: &str = "http://openf1.test/v1";

/// Answers by URL substring. The last queued response for a route repeats;
/// unmatched URLs get a 404.
#[derive(Default)]
pub struct RoutedTransport {
    routes: Mutex<Vec<(String, VecDeque<RawResponse>)>>,
    requests: Mutex<Vec<String>>,
}

impl RoutedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn route(&self, pattern: &str, status: u16, body: Value) -> &Self {
        let response = RawResponse {
            status: StatusCode::from_u16(status).unwrap(),
            body: body.to_string(),
        };
        let mut routes = self.routes.lock().unwrap();
        match routes.iter_mut().find(|(p, _)| p == pattern) {
            Some((_, queue)) => queue.push_back(response),
            None => routes.push((pattern.to_string(), VecDeque::from([response]))),
        }
        self
    }

    pub fn requests_matching(&self, pattern: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.contains(pattern))
            .count()
    }
}

#[async_trait]
impl Transport for RoutedTransport {
    async fn get(&self, url: &str) -> Result<RawResponse, String> {
        self.requests.lock().unwrap().push(url.to_string());
        let mut routes = self.routes.lock().unwrap();
        let Some((_, queue)) = routes.iter_mut().find(|(p, _)| url.contains(p.as_str())) else {
            return Ok(RawResponse {
                status: StatusCode::NOT_FOUND,
                body: String::new(),
            });
        };
        let response = if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap()
        };
        Ok(response)
    }
}

pub fn config(season: i32) -> Config {
    Config {
        supabase_project_url: "http://supabase.test".into(),
        supabase_service_role_key: "service-key".into(),
        historical_base_url: HISTORICAL.into(),
        live_base_url: LIVE.into(),
        current_season: season,
        historical_backoff: Duration::from_secs(30),
        live_backoff: Duration::from_secs(20),
        max_fetch_attempts: 5,
        page_delay: Duration::ZERO,
        http_timeout: Duration::from_secs(5),
        bind_addr: "127.0.0.1:0".into(),
        identity_tables: IdentityTables::default(),
    }
}

pub struct Harness {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub transport: Arc<RoutedTransport>,
    pub sleeper: RecordingSleeper,
    pub shutdown: CancellationToken,
}

pub fn harness(season: i32) -> Harness {
    let store = Arc::new(MemoryStore::new());
    harness_over(season, store.clone(), store)
}

/// Harness whose pipeline writes through `gateway`; `store` is the memory
/// underneath, for assertions.
pub fn harness_over(
    season: i32,
    store: Arc<MemoryStore>,
    gateway: Arc<dyn StorageGateway>,
) -> Harness {
    let transport = RoutedTransport::new();
    let sleeper = RecordingSleeper::new();
    let shutdown = CancellationToken::new();
    let state = AppState::with_parts(
        config(season),
        gateway,
        transport.clone(),
        Arc::new(sleeper.clone()),
        shutdown.clone(),
    );
    Harness {
        state,
        store,
        transport,
        sleeper,
        shutdown,
    }
}

/// Memory store whose writes to a collection follow a script of
/// succeed/fail outcomes, then succeed.
pub struct FlakyStore {
    inner: Arc<MemoryStore>,
    scripts: Mutex<HashMap<Collection, VecDeque<bool>>>,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            scripts: Mutex::new(HashMap::new()),
        })
    }

    /// `true` lets a write through, `false` fails it.
    pub fn script_writes(&self, collection: Collection, outcomes: &[bool]) {
        self.scripts
            .lock()
            .unwrap()
            .insert(collection, outcomes.iter().copied().collect());
    }

    fn write_allowed(&self, collection: Collection) -> Result<(), StorageError> {
        let ok = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&collection)
            .and_then(|s| s.pop_front())
            .unwrap_or(true);
        if ok {
            Ok(())
        } else {
            Err(StorageError::Backend(format!("write to {collection} refused")))
        }
    }
}

#[async_trait]
impl StorageGateway for FlakyStore {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, StorageError> {
        self.inner.get(collection, id).await
    }

    async fn list_all(&self, collection: Collection) -> Result<Vec<Value>, StorageError> {
        self.inner.list_all(collection).await
    }

    async fn list_by_field(
        &self,
        collection: Collection,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Value>, StorageError> {
        self.inner.list_by_field(collection, field, value).await
    }

    async fn save(&self, collection: Collection, id: &str, doc: Value) -> Result<(), StorageError> {
        self.write_allowed(collection)?;
        self.inner.save(collection, id, doc).await
    }

    async fn save_all(
        &self,
        collection: Collection,
        docs: Vec<(String, Value)>,
    ) -> Result<(), StorageError> {
        self.write_allowed(collection)?;
        self.inner.save_all(collection, docs).await
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StorageError> {
        self.inner.delete(collection, id).await
    }

    async fn delete_all(&self, collection: Collection) -> Result<(), StorageError> {
        self.inner.delete_all(collection).await
    }
}

pub fn driver(id: &str, given: &str, family: &str) -> Value {
    json!({"driverId": id, "givenName": given, "familyName": family, "nationality": "Dutch", "dateOfBirth": "1997-09-30"})
}

pub fn constructor(id: &str, name: &str) -> Value {
    json!({"constructorId": id, "name": name, "nationality": "Austrian"})
}

pub fn result_row(position: u32, driver_id: &str, team: &str, points: &str, fastest_rank: &str) -> Value {
    json!({
        "position": position.to_string(),
        "points": points,
        "grid": "1",
        "status": "Finished",
        "Driver": driver(driver_id, "Given", driver_id),
        "Constructor": constructor(team, team),
        "FastestLap": {"rank": fastest_rank},
    })
}

pub fn race_body(season: i32, round: u32, date: &str, table: &str, rows: Vec<Value>) -> Value {
    let mut race = json!({
        "season": season.to_string(),
        "round": round.to_string(),
        "raceName": format!("Round {round} Grand Prix"),
        "date": date,
        "time": "13:00:00Z",
        "Circuit": {
            "circuitId": format!("circuit_{round}"),
            "circuitName": "Circuit",
            "Location": {"lat": "1.0", "long": "2.0", "locality": "Town", "country": "Country"}
        },
    });
    if !table.is_empty() {
        race[table] = Value::Array(rows);
    }
    json!({"MRData": {"RaceTable": {"season": season.to_string(), "Races": [race]}}})
}

pub fn calendar_body(season: i32, rounds: &[(u32, &str)]) -> Value {
    let races: Vec<Value> = rounds
        .iter()
        .map(|(round, date)| {
            race_body(season, *round, date, "", vec![])["MRData"]["RaceTable"]["Races"][0].clone()
        })
        .collect();
    json!({"MRData": {"RaceTable": {"season": season.to_string(), "Races": races}}})
}

pub fn driver_standings_body(rows: &[(u32, &str, &str, &str)]) -> Value {
    let standings: Vec<Value> = rows
        .iter()
        .map(|(pos, id, points, wins)| {
            json!({
                "position": pos.to_string(),
                "points": points,
                "wins": wins,
                "Driver": driver(id, "Given", id),
                "Constructors": [constructor("red_bull", "Red Bull")],
            })
        })
        .collect();
    json!({"MRData": {"StandingsTable": {"StandingsLists": [{"DriverStandings": standings}]}}})
}

pub fn constructor_standings_body(rows: &[(u32, &str, &str, &str)]) -> Value {
    let standings: Vec<Value> = rows
        .iter()
        .map(|(pos, id, points, wins)| {
            json!({
                "position": pos.to_string(),
                "points": points,
                "wins": wins,
                "Constructor": constructor(id, id),
            })
        })
        .collect();
    json!({"MRData": {"StandingsTable": {"StandingsLists": [{"ConstructorStandings": standings}]}}})
}

pub fn counters_of(doc: &Value) -> HashMap<&'static str, f64> {
    [
        "wins",
        "podiums",
        "points",
        "poles",
        "fastestLaps",
        "totalRaces",
        "sprintWins",
        "sprintPoints",
        "sprintRaces",
    ]
    .into_iter()
    .map(|k| (k, doc[k].as_f64().unwrap_or(0.0)))
    .collect()
}
