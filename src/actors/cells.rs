//! Per-server alert state cells
//!
//! Both poll loops may evaluate the same server at the same time. Every
//! read-evaluate-write of a server's alert state and history happens while
//! holding that server's cell, so a transition observed by both loops is
//! acted on once.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;

use crate::alerts::AlertState;

pub type StateCell = Arc<AsyncMutex<AlertState>>;

#[derive(Debug, Default)]
pub struct ResourceCells {
    cells: Mutex<HashMap<String, StateCell>>,
}

impl ResourceCells {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cell for `server_id`, created on first use
    pub fn cell(&self, server_id: &str) -> StateCell {
        let mut cells = self
            .cells
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        cells
            .entry(server_id.to_string())
            .or_default()
            .clone()
    }

    /// Forget every in-memory state (cooldowns, source flags)
    pub fn clear(&self) {
        self.cells
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}
