//! Rental Scout
//!
//! Polls a paginated rental search, extracts listings and keeps them in
//! three persisted partitions: new, hidden and saved.

pub mod config;
pub mod error;
pub mod export;
pub mod models;
pub mod poller;
pub mod scrapers;
pub mod storage;
pub mod store;

pub use config::Config;
pub use error::{AppError, Result};
pub use models::{Partition, Rental};
pub use poller::{FailurePolicy, PollHandle, PollLoop, PollStatus, TickReport};
pub use store::RecordStore;
