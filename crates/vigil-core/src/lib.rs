//! Client-side synchronization engine for the vigil alarm dashboard.
//!
//! Reconciles three unreliable delivery paths into one authoritative,
//! observable state:
//!
//! - **[`StreamChannel`]**: the long-lived push subscription, with fixed
//!   delay reconnects after a clean close and capped exponential backoff
//!   after errors.
//! - **[`PollFallbackCoordinator`]**: interval refetch of the filtered
//!   count that disables itself once the stream is stable and resumes
//!   after a disconnect outlasting the grace period.
//! - **[`BackgroundSyncOrchestrator`]**: version-gated Groups → Items →
//!   Alarms bulk sync, plus the [`StalenessRefresher`] for long sessions.
//!
//! Everything lands in the **[`SnapshotStore`]**, persisted through a
//! [`StorageBackend`] shared with other instances. The
//! **[`AlarmCountAggregator`]** guarantees that the rendered count is
//! always the permission-filtered fetch result, never a raw push value.
//! **[`SyncEngine`]** wires it all together.

pub mod aggregator;
pub mod cache;
pub mod channel;
pub mod config;
pub mod convert;
pub mod engine;
pub mod error;
pub mod model;
pub mod poll;
pub mod retry;
pub mod session;
pub mod source;
pub mod store;
pub mod sync;
pub mod tabs;

// ── Primary re-exports ──────────────────────────────────────────────
pub use aggregator::AlarmCountAggregator;
pub use cache::{CacheInvalidationCoordinator, CachedSource, ResponseCache};
pub use channel::{ChannelState, StreamChannel};
pub use config::{EngineConfig, PollConfig, RefreshConfig, StreamConfig, SyncConfig, TlsVerification};
pub use engine::SyncEngine;
pub use error::CoreError;
pub use poll::PollFallbackCoordinator;
pub use retry::Backoff;
pub use session::Session;
pub use source::{DataSource, PushSource, PushUpdateStream, WebSocketPush};
pub use store::{
    FileBackend, MemoryBackend, SnapshotStore, StorageBackend, StorageEvent, StoreChange, StoreKey,
    TabId,
};
pub use sync::{
    BackgroundSyncOrchestrator, RefreshOutcome, SkipReason, StalenessRefresher, SyncGuard,
    VersionCheck, VersionGate,
};
pub use tabs::{TabBus, TabMessage};

pub use model::{
    ActiveAlarm, AlarmConfig, AlarmCount, CountSource, Group, Item, PushUpdate, Snapshot,
    SyncMetadata, SyncPhase, SyncStatus, SyncVersion, Visibility,
};
