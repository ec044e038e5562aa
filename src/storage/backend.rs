//! Settings store trait definition
//!
//! This module defines the `SettingsStore` trait that every persistence
//! backend implements. The engine only ever talks to this trait and knows
//! nothing about the storage format behind it.

use async_trait::async_trait;

use crate::ServerStatus;
use crate::config::ResourceSettings;

use super::error::StorageResult;
use super::history::HistoryEvent;

/// Key-value persistence keyed by server id
///
/// ## Consistency
///
/// - `save_settings` replaces the whole record at once; a poll cycle that
///   already read its snapshot keeps using it.
/// - `append_history` inserts at the head and prunes in the same operation.
/// - `history` re-applies the age filter on read.
///
/// Implementations must be `Send + Sync` as they are shared between the
/// foreground and background poll loops.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Settings for a server, defaults if none were ever saved
    async fn settings(&self, server_id: &str) -> StorageResult<ResourceSettings>;

    /// Replace the settings of a server
    ///
    /// Saving settings equal to the defaults removes the record.
    async fn save_settings(&self, server_id: &str, settings: &ResourceSettings)
    -> StorageResult<()>;

    /// Servers with at least one alert flag enabled
    async fn monitored_ids(&self) -> StorageResult<Vec<String>>;

    async fn last_status(&self, server_id: &str) -> StorageResult<Option<ServerStatus>>;

    async fn set_last_status(&self, server_id: &str, status: ServerStatus) -> StorageResult<()>;

    async fn append_history(&self, server_id: &str, event: HistoryEvent) -> StorageResult<()>;

    /// History of a server, newest first
    async fn history(&self, server_id: &str) -> StorageResult<Vec<HistoryEvent>>;

    async fn clear_history(&self, server_id: &str) -> StorageResult<()>;

    /// Close the store and release resources
    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}
