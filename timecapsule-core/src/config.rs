//! Capsule manager configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Configuration for [`crate::CapsuleManager`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapsuleConfig {
    /// Upper bound on any single blob store call (seconds).
    pub store_timeout_secs: u64,

    /// Entries requested per listing page during a recovery scan.
    pub recovery_page_size: usize,

    /// Pages scanned before recovery gives up.
    pub recovery_max_pages: usize,

    /// Durable records are stored as `<prefix><capsule id>.json`.
    pub record_name_prefix: String,

    /// Refuse to open packages that carry no integrity tag. Off by default so
    /// first-generation capsules stay openable.
    pub require_package_tag: bool,
}

impl Default for CapsuleConfig {
    fn default() -> Self {
        Self {
            store_timeout_secs: 30,
            recovery_page_size: 100,
            recovery_max_pages: 10,
            record_name_prefix: "capsule_".to_string(),
            require_package_tag: false,
        }
    }
}

impl CapsuleConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }

    /// Blob name of the durable record for `id`.
    pub fn record_name(&self, id: &Uuid) -> String {
        format!("{}{id}.json", self.record_name_prefix)
    }
}
