// ── Topology domain types ──

use serde::{Deserialize, Serialize};

/// A named group of telemetry items. Groups may nest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<String>,
}

/// A telemetry item: a measured point, a loop output, a gateway register.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub name: String,
    /// `None` marks an orphan item.
    pub group_id: Option<String>,
    pub item_type: Option<String>,
    pub unit: Option<String>,
}

impl Item {
    pub fn is_orphan(&self) -> bool {
        self.group_id.is_none()
    }
}
