use tracing::info;

use crate::models::error::FetchError;
use crate::models::openf1::{LiveDriver, SessionFilter};
use crate::services::upstream::{Fetched, Resource, UpstreamClient};

/// Live provider: current-session driver rosters.
#[derive(Clone)]
pub struct LiveClient {
    upstream: UpstreamClient,
}

impl LiveClient {
    pub fn new(upstream: UpstreamClient) -> Self {
        Self { upstream }
    }

    pub async fn drivers(&self, filter: SessionFilter) -> Result<Vec<LiveDriver>, FetchError> {
        let mut resource = Resource::new("drivers");
        for (key, value) in filter.query() {
            resource = resource.param(key, value);
        }
        let drivers = match self.upstream.fetch::<Vec<LiveDriver>>(&resource).await? {
            Fetched::Data(drivers) => drivers,
            Fetched::NoData => Vec::new(),
        };
        info!("Fetched {} live driver records ({:?})", drivers.len(), filter);
        Ok(drivers)
    }
}
