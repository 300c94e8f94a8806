use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

use super::ModelSize;
use crate::Result;

/// Process-wide cache of loaded models, keyed by size
///
/// Loading is expensive (seconds), so each size is loaded at most once and
/// shared for the lifetime of the service. Loads are single-flight: the
/// per-size cell is reserved under the map lock before the slow load starts,
/// so concurrent requests for the same size await one load instead of
/// duplicating it. A failed load leaves the cell empty and a later request
/// retries.
pub struct ModelCache<M> {
    slots: Mutex<HashMap<ModelSize, Arc<OnceCell<Arc<M>>>>>,
    loads: AtomicUsize,
}

impl<M> ModelCache<M> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            loads: AtomicUsize::new(0),
        }
    }

    /// Get the cached model for `size`, running `load` if it is not present
    pub async fn get_or_load<F, Fut>(&self, size: ModelSize, load: F) -> Result<Arc<M>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<M>>,
    {
        let cell = {
            let mut slots = self.slots.lock().await;
            slots.entry(size).or_default().clone()
        };

        let model = cell
            .get_or_try_init(|| async {
                tracing::info!(model = %size, "Loading model");
                self.loads.fetch_add(1, Ordering::Relaxed);
                load().await.map(Arc::new)
            })
            .await?;

        Ok(model.clone())
    }

    /// Number of load attempts performed so far
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }
}

impl<M> Default for ModelCache<M> {
    fn default() -> Self {
        Self::new()
    }
}
