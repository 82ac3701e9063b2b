//! Permit pools bounding how many gateway calls run at once.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

use crate::config::BatchConfig;
use crate::types::Provider;

/// Global and per-provider semaphores shared by every batch of an
/// orchestrator.
#[derive(Debug)]
pub struct ConcurrencyLimits {
    global: Arc<Semaphore>,
    providers: HashMap<Provider, Arc<Semaphore>>,
}

/// Both permits held by a dispatched task. Dropping it releases them.
#[derive(Debug)]
pub struct DispatchPermit {
    _provider: Option<OwnedSemaphorePermit>,
    _global: OwnedSemaphorePermit,
}

impl ConcurrencyLimits {
    /// Build pools sized from `config`.
    pub fn from_config(config: &BatchConfig) -> Self {
        let providers = Provider::all()
            .iter()
            .map(|p| (*p, Arc::new(Semaphore::new(config.concurrency_for(*p)))))
            .collect();
        Self {
            global: Arc::new(Semaphore::new(config.global_concurrency)),
            providers,
        }
    }

    /// Wait for a provider permit, then a global permit.
    ///
    /// Acquiring in this fixed order means a task never holds a global
    /// permit while blocked on a saturated provider.
    pub async fn acquire(&self, provider: Provider) -> Result<DispatchPermit, AcquireError> {
        let provider_permit = match self.providers.get(&provider) {
            Some(pool) => Some(pool.clone().acquire_owned().await?),
            None => None,
        };
        let global_permit = self.global.clone().acquire_owned().await?;
        Ok(DispatchPermit {
            _provider: provider_permit,
            _global: global_permit,
        })
    }

    /// Currently free global permits.
    pub fn available_global(&self) -> usize {
        self.global.available_permits()
    }

    /// Currently free permits for `provider`.
    pub fn available_for(&self, provider: Provider) -> usize {
        self.providers
            .get(&provider)
            .map_or(0, |pool| pool.available_permits())
    }
}
