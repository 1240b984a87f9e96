//! Historical provider: paginated reference listings and per season/round resources.

use tracing::{debug, info};

use crate::models::ergast::{
    Envelope, ErgastConstructor, ErgastConstructorStanding, ErgastDriver, ErgastDriverStanding,
    ErgastRace,
};
use crate::models::error::FetchError;
use crate::services::upstream::{Fetched, Resource, UpstreamClient};

pub const PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaceResource {
    Results,
    Qualifying,
    Sprint,
}

impl RaceResource {
    fn segment(&self) -> &'static str {
        match self {
            RaceResource::Results => "results",
            RaceResource::Qualifying => "qualifying",
            RaceResource::Sprint => "sprint",
        }
    }
}

/// Current standings for one season, as published upstream.
#[derive(Debug, Default)]
pub struct StandingsFeed {
    pub drivers: Vec<ErgastDriverStanding>,
    pub constructors: Vec<ErgastConstructorStanding>,
}

#[derive(Clone)]
pub struct HistoricalClient {
    upstream: UpstreamClient,
}

impl HistoricalClient {
    pub fn new(upstream: UpstreamClient) -> Self {
        Self { upstream }
    }

    fn resource(path: String) -> Resource {
        Resource::new(path).param("format", "json")
    }

    async fn envelope(&self, resource: Resource) -> Result<Fetched<Envelope>, FetchError> {
        self.upstream.fetch::<Envelope>(&resource).await
    }

    /// Walks `limit`/`offset` pages sequentially; the upstream client's
    /// rate limiter spaces the requests.
    async fn paginate<T>(
        &self,
        path: &str,
        extract: impl Fn(Envelope) -> (Option<u32>, Vec<T>),
    ) -> Result<Vec<T>, FetchError> {
        let mut items = Vec::new();
        let mut offset = 0u32;
        loop {
            let resource = Self::resource(path.to_string())
                .param("limit", PAGE_SIZE)
                .param("offset", offset);
            let (total, page) = match self.envelope(resource).await? {
                Fetched::Data(env) => extract(env),
                Fetched::NoData => break,
            };
            let fetched = page.len() as u32;
            items.extend(page);
            offset += fetched;
            debug!("{path}: fetched {offset} of {total:?}");
            if fetched == 0 || total.map_or(fetched < PAGE_SIZE, |t| offset >= t) {
                break;
            }
        }
        Ok(items)
    }

    pub async fn drivers(&self) -> Result<Vec<ErgastDriver>, FetchError> {
        let drivers = self
            .paginate("drivers/", |env| {
                let total = env.mr_data.total();
                (total, env.mr_data.into_drivers())
            })
            .await?;
        info!("Fetched {} drivers from the historical provider", drivers.len());
        Ok(drivers)
    }

    pub async fn constructors(&self) -> Result<Vec<ErgastConstructor>, FetchError> {
        let constructors = self
            .paginate("constructors/", |env| {
                let total = env.mr_data.total();
                (total, env.mr_data.into_constructors())
            })
            .await?;
        info!(
            "Fetched {} constructors from the historical provider",
            constructors.len()
        );
        Ok(constructors)
    }

    /// The season calendar. An absent race table is an empty calendar.
    pub async fn season_races(&self, season: i32) -> Result<Vec<ErgastRace>, FetchError> {
        let resource = Self::resource(format!("{season}/races/")).param("limit", PAGE_SIZE);
        Ok(self
            .envelope(resource)
            .await?
            .into_option()
            .map(|env| env.mr_data.into_races())
            .unwrap_or_default())
    }

    /// One race with the requested result table. `NoData` when the race table is
    /// missing or empty.
    pub async fn race(
        &self,
        season: i32,
        round: u32,
        what: RaceResource,
    ) -> Result<Fetched<ErgastRace>, FetchError> {
        let resource =
            Self::resource(format!("{season}/{round}/{}/", what.segment())).param("limit", PAGE_SIZE);
        let race = self
            .envelope(resource)
            .await?
            .into_option()
            .and_then(|env| env.mr_data.into_races().into_iter().next());
        Ok(match race {
            Some(race) => Fetched::Data(race),
            None => {
                info!("{season}-{round}: no {} published yet", what.segment());
                Fetched::NoData
            }
        })
    }

    pub async fn standings(&self, season: i32) -> Result<Fetched<StandingsFeed>, FetchError> {
        let drivers = self
            .envelope(Self::resource(format!("{season}/driverstandings/")).param("limit", PAGE_SIZE))
            .await?
            .into_option()
            .and_then(|env| env.mr_data.into_standings());
        let constructors = self
            .envelope(
                Self::resource(format!("{season}/constructorstandings/")).param("limit", PAGE_SIZE),
            )
            .await?
            .into_option()
            .and_then(|env| env.mr_data.into_standings());

        if drivers.is_none() && constructors.is_none() {
            return Ok(Fetched::NoData);
        }
        Ok(Fetched::Data(StandingsFeed {
            drivers: drivers.map(|l| l.driver_standings).unwrap_or_default(),
            constructors: constructors
                .map(|l| l.constructor_standings)
                .unwrap_or_default(),
        }))
    }
}
