pub mod booking;
pub mod compactor;
pub mod config;
pub mod limits;
pub mod model;
pub mod observability;
pub mod service;
pub mod sql;
pub mod store;
pub mod wal;
pub mod wire;
