// src/cache/inflight.rs

//! At-most-one execution per key.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;

/// Shares one computation between every concurrent caller with the same key.
///
/// The first caller runs the future; the others wait for it and receive a
/// clone of its value. Completed values stay available for the lifetime of
/// the map.
#[derive(Debug)]
pub struct InFlight<T> {
    cells: Mutex<HashMap<String, Arc<OnceCell<T>>>>,
}

impl<T> Default for InFlight<T> {
    fn default() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
        }
    }
}

/// Whether this caller ran the computation or replayed another's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Executed,
    Replayed,
}

impl<T: Clone> InFlight<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn run<F, Fut>(&self, key: &str, compute: F) -> (T, Origin)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let cell = {
            let mut cells = self
                .cells
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            Arc::clone(cells.entry(key.to_string()).or_default())
        };

        let ran = AtomicBool::new(false);
        let ran_ref = &ran;
        let value = cell
            .get_or_init(move || async move {
                ran_ref.store(true, Ordering::SeqCst);
                compute().await
            })
            .await
            .clone();

        let origin = if ran.load(Ordering::SeqCst) {
            Origin::Executed
        } else {
            Origin::Replayed
        };
        (value, origin)
    }
}
