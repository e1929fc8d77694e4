//! HTTP surface: the status hook job runners call back into, plus read-only
//! operator views of the ledger.

mod error;
pub mod models;
mod server;
pub mod services;
pub mod state;
pub(crate) mod utils;

pub use error::ApiError;
pub use server::{router, run};
pub use state::AppState;
