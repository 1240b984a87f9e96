pub mod accumulator;
pub mod historical;
pub mod ingestion;
pub mod live;
pub mod reconciler;
pub mod scheduler;
pub mod standings;
pub mod upstream;
