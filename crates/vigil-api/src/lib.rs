// vigil-api: Async Rust client for the telemetry platform's sync endpoints
// and alarm push stream.

pub mod auth;
pub mod client;
pub mod error;
pub mod models;
pub mod push;
pub mod transport;

pub use auth::TokenCell;
pub use client::ApiClient;
pub use error::Error;
pub use models::{
    ActiveAlarmRecord, AlarmRecord, GroupRecord, ItemRecord, PushFrame, VersionResponse,
};
pub use push::PushStream;
pub use transport::{TlsMode, TransportConfig};
