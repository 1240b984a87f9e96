pub mod backoff;
pub mod config;
pub mod race_utils;
pub mod rate_limiter;
pub mod state;
