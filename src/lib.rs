pub mod api;
pub mod bus;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod filter;
pub mod generator;
pub mod humanize;
pub mod ledger;
pub mod model;
pub mod observability;
pub mod pipeline;
pub mod resolver;
pub mod runner;
pub mod testing; // Fixtures shared by unit and integration tests

pub use error::{Error, Result};
