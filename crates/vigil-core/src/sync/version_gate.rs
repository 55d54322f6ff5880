// ── Version gate ──
//
// Decides whether a bulk refresh is needed by comparing the persisted
// `(globalVersion, userVersion)` pair with the server's current one.

use tracing::{debug, info, warn};

use crate::model::SyncVersion;
use crate::source::DataSource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionCheck {
    Unchanged,
    /// Carries the fetched version, to be persisted once the sync commits.
    Changed(SyncVersion),
}

pub struct VersionGate;

impl VersionGate {
    /// Field-by-field comparison. A missing persisted version always
    /// counts as changed.
    pub fn has_changed(persisted: Option<&SyncVersion>, fetched: &SyncVersion) -> bool {
        persisted.is_none_or(|p| {
            p.global_version != fetched.global_version || p.user_version != fetched.user_version
        })
    }

    /// Fetch the server version and compare. A failed fetch is logged and
    /// treated as "unchanged" so a flaky version endpoint never triggers
    /// a bulk refresh or mutates local state.
    pub async fn check<S: DataSource>(source: &S, persisted: Option<&SyncVersion>) -> VersionCheck {
        let fetched = match source.fetch_version().await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "version check failed; assuming unchanged");
                return VersionCheck::Unchanged;
            }
        };

        if Self::has_changed(persisted, &fetched) {
            info!(
                from = ?persisted.and_then(|p| p.global_version.as_deref()),
                to = ?fetched.global_version,
                "server version changed"
            );
            VersionCheck::Changed(fetched)
        } else {
            debug!(version = ?fetched.global_version, "server version unchanged");
            VersionCheck::Unchanged
        }
    }
}
