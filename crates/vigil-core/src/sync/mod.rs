// ── Bulk synchronization ──
//
// Version-gated sync on start/resume, and the staleness refresher that
// keeps long-running sessions current. Both share one `SyncGuard`.

mod guard;
mod orchestrator;
mod phases;
mod refresh;
mod version_gate;

pub use guard::{SyncGuard, SyncPermit};
pub use orchestrator::BackgroundSyncOrchestrator;
pub use refresh::{RefreshOutcome, SkipReason, StalenessRefresher};
pub use version_gate::{VersionCheck, VersionGate};
