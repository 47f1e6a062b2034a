//! In-memory `TradeHistoryStore`.
//!
//! Used by tests and by deployments that don't need history to survive a
//! restart. `set_error` makes every call fail, for exercising the
//! degraded paths.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::RwLock;

use super::{merge_flips, TradeHistoryStore};
use crate::types::{Flip, FlipperError};

#[derive(Default)]
pub struct MemoryHistoryStore {
    flips: RwLock<HashMap<String, Vec<Flip>>>,
    force_error: Mutex<Option<String>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap_or_else(|e| e.into_inner()) = Some(msg.to_string());
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    fn check(&self) -> Result<(), FlipperError> {
        match self.force_error.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            Some(msg) => Err(FlipperError::Persistence(msg.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TradeHistoryStore for MemoryHistoryStore {
    async fn load_flips(&self, trader: &str) -> Result<Vec<Flip>, FlipperError> {
        self.check()?;
        Ok(self.flips.read().await.get(trader).cloned().unwrap_or_default())
    }

    async fn save_flips(&self, trader: &str, flips: &[Flip]) -> Result<(), FlipperError> {
        self.check()?;
        let mut all = self.flips.write().await;
        merge_flips(all.entry(trader.to_string()).or_default(), flips);
        Ok(())
    }
}
