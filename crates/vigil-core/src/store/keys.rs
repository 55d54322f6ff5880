// ── Persisted key names ──

use strum::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};

/// Every key the snapshot store persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumString, EnumIter, IntoStaticStr)]
pub enum StoreKey {
    #[strum(serialize = "vigil.groups")]
    Groups,
    #[strum(serialize = "vigil.items")]
    Items,
    #[strum(serialize = "vigil.alarms")]
    Alarms,
    #[strum(serialize = "vigil.active-alarms")]
    ActiveAlarms,
    #[strum(serialize = "vigil.alarm-count")]
    AlarmCount,
    #[strum(serialize = "vigil.version")]
    Version,
    #[strum(serialize = "vigil.sync-status")]
    SyncStatus,
    #[strum(serialize = "vigil.metadata")]
    Metadata,
}

/// Backend key carrying cross-instance messages. Not a store key: its
/// value is a message envelope, not state.
pub const BUS_KEY: &str = "vigil.bus";

impl StoreKey {
    /// The three topology snapshots the staleness refresher watches.
    pub const TOPOLOGY: [StoreKey; 3] = [StoreKey::Groups, StoreKey::Items, StoreKey::Alarms];

    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn names_round_trip_through_strum() {
        for key in StoreKey::iter() {
            assert_eq!(key.to_string(), key.as_str());
            assert_eq!(StoreKey::from_str(key.as_ref()).unwrap(), key);
        }
    }

    #[test]
    fn bus_key_is_not_a_store_key() {
        assert!(StoreKey::from_str(BUS_KEY).is_err());
    }
}
