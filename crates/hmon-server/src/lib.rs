pub mod agent_config;
pub mod catalog;
pub mod config;
pub mod ingest;
pub mod metrics;
pub mod retention;
pub mod scheduler;
pub mod seed;
