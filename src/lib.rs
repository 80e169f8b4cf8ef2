pub mod activator;
pub mod advisor;
pub mod command;
pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod store;
pub mod wal;
