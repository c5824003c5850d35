//! Diagnostic export of a manager's membership.
//!
//! The view is one-way. [`BehaviorManager`] implements `Deserialize` only so
//! that an attempt to rebuild a manager from it fails loudly instead of
//! producing a partial manager.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use super::{BehaviorManager, Priority};
use crate::{Result, TabVizError};

/// One priority bucket as rendered for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriorityGroup {
    pub priority: Priority,
    /// Display form of every resolvable entry, in registration order.
    pub behaviors: Vec<String>,
}

impl BehaviorManager {
    /// Buckets in dispatch order with the display form of each live entry.
    /// Expired entries are left out.
    pub fn export_view(&self) -> Vec<PriorityGroup> {
        self.buckets()
            .map(|(priority, entries)| PriorityGroup {
                priority,
                behaviors: entries
                    .iter()
                    .filter(|entry| entry.resolve().is_some())
                    .map(ToString::to_string)
                    .collect(),
            })
            .collect()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Serialize for BehaviorManager {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.export_view().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for BehaviorManager {
    fn deserialize<D: Deserializer<'de>>(_deserializer: D) -> std::result::Result<Self, D::Error> {
        Err(de::Error::custom(TabVizError::ExportIsWriteOnly))
    }
}
