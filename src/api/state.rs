use std::sync::Arc;

use crate::config::Config;
use crate::ledger::LedgerStore;
use crate::observability::Metrics;
use crate::runner::LocalJobRunner;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<LedgerStore>,
    pub metrics: Arc<Metrics>,
    /// Present when jobs run in-process; reported by `/health`.
    pub local_runner: Option<Arc<LocalJobRunner>>,
}

impl AppState {
    pub fn new(config: Arc<Config>, store: Arc<LedgerStore>, metrics: Arc<Metrics>) -> Self {
        Self {
            config,
            store,
            metrics,
            local_runner: None,
        }
    }

    pub fn with_local_runner(mut self, runner: Arc<LocalJobRunner>) -> Self {
        self.local_runner = Some(runner);
        self
    }

    pub fn max_callback_bytes(&self) -> usize {
        usize::try_from(self.config.server.max_callback_bytes.as_u64()).unwrap_or(usize::MAX)
    }
}
