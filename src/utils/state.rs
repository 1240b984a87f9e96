use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::services::historical::HistoricalClient;
use crate::services::ingestion::IngestionService;
use crate::services::live::LiveClient;
use crate::services::reconciler::IdentityReconciler;
use crate::services::scheduler::RaceCalendarScheduler;
use crate::services::upstream::{ReqwestTransport, Transport, UpstreamClient};
use crate::storage::{PostgrestStore, StorageGateway};
use crate::utils::backoff::{RetryPolicy, Sleeper, TokioSleeper};
use crate::utils::config::Config;
use crate::utils::rate_limiter::RateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub ingestion: Arc<IngestionService>,
    pub scheduler: Arc<RaceCalendarScheduler>,
}

impl AppState {
    pub fn init(config: Config, shutdown: CancellationToken) -> Result<Self, reqwest::Error> {
        let store: Arc<dyn StorageGateway> = Arc::new(PostgrestStore::new(
            &config.supabase_project_url,
            &config.supabase_service_role_key,
        ));
        let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(config.http_timeout)?);
        Ok(Self::with_parts(
            config,
            store,
            transport,
            Arc::new(TokioSleeper),
            shutdown,
        ))
    }

    /// Wire the pipeline over explicit collaborators.
    pub fn with_parts(
        config: Config,
        store: Arc<dyn StorageGateway>,
        transport: Arc<dyn Transport>,
        sleeper: Arc<dyn Sleeper>,
        shutdown: CancellationToken,
    ) -> Self {
        let historical = UpstreamClient::new(
            "historical",
            config.historical_base_url.clone(),
            transport.clone(),
            RetryPolicy::new(config.historical_backoff, config.max_fetch_attempts),
            sleeper.clone(),
            RateLimiter::new(config.page_delay),
        )
        .with_cancellation(shutdown.clone());
        let live = UpstreamClient::new(
            "live",
            config.live_base_url.clone(),
            transport,
            RetryPolicy::new(config.live_backoff, config.max_fetch_attempts),
            sleeper,
            RateLimiter::new(config.page_delay),
        )
        .with_cancellation(shutdown.clone());

        let reconciler = IdentityReconciler::new(Arc::new(config.identity_tables.clone()));
        let ingestion = Arc::new(IngestionService::new(
            store,
            HistoricalClient::new(historical),
            LiveClient::new(live),
            reconciler,
            config.current_season,
        ));
        let scheduler = Arc::new(RaceCalendarScheduler::new(ingestion.clone(), shutdown));

        AppState {
            config,
            ingestion,
            scheduler,
        }
    }
}
