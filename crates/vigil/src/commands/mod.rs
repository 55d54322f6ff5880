//! Command handlers.

pub mod count;
pub mod logout;
pub mod status;
pub mod sync;
pub mod watch;

use std::path::Path;
use std::sync::Arc;

use clap::CommandFactory;
use vigil_api::{ApiClient, TlsMode, TokenCell, TransportConfig};
use vigil_core::{
    CoreError, FileBackend, SnapshotStore, StorageBackend, SyncEngine, TabId, TlsVerification,
    WebSocketPush,
};

use crate::cli::{Cli, Command, GlobalOpts};
use crate::config::Resolved;
use crate::error::CliError;

/// The engine as the CLI runs it: HTTP data source, WebSocket push.
pub type Engine = SyncEngine<ApiClient, WebSocketPush>;

pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Watch(args) => watch::handle(&args, global).await,
        Command::Sync(args) => sync::handle(&args, global).await,
        Command::Status => status::handle(global),
        Command::Count => count::handle(global).await,
        Command::Logout(args) => logout::handle(&args, global),
        Command::Completions(args) => {
            completions(args.shell);
            Ok(())
        }
    }
}

/// Completion scripts never touch config or credentials.
fn completions(shell: clap_complete::Shell) {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "vigil", &mut std::io::stdout());
}

fn tls_mode(tls: &TlsVerification) -> TlsMode {
    match tls {
        TlsVerification::SystemDefaults => TlsMode::System,
        TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
        TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
    }
}

pub(crate) fn open_backend(dir: &Path) -> Result<Arc<FileBackend>, CliError> {
    Ok(Arc::new(FileBackend::open(dir)?))
}

/// Read-only view of a data directory. Never creates it.
pub(crate) fn open_store(dir: &Path) -> Result<Option<SnapshotStore>, CliError> {
    if !dir.is_dir() {
        return Ok(None);
    }
    let backend: Arc<dyn StorageBackend> = open_backend(dir)?;
    Ok(Some(SnapshotStore::open(backend, TabId::new())))
}

/// Build an engine over the profile's data directory. `token` is shared
/// by the HTTP client and the push stream.
pub(crate) fn build_engine(
    resolved: &Resolved,
    token: Arc<TokenCell>,
) -> Result<(Engine, Arc<FileBackend>), CliError> {
    let cfg = &resolved.engine;
    let dir = cfg.data_dir.as_deref().ok_or_else(|| CliError::Validation {
        field: "data_dir".into(),
        reason: "no snapshot directory configured".into(),
    })?;
    let backend = open_backend(dir)?;

    let transport = TransportConfig {
        tls: tls_mode(&cfg.tls),
        ..TransportConfig::with_timeout(cfg.timeout)
    };
    let client = ApiClient::new(cfg.api_url.as_str(), &transport, Arc::clone(&token))
        .map_err(CoreError::from)?;
    let push = WebSocketPush::new(cfg.stream_url.clone(), cfg.timeout);

    let engine = SyncEngine::new(
        cfg.clone(),
        Arc::clone(&backend) as Arc<dyn StorageBackend>,
        client,
        push,
        token,
    );
    Ok((engine, backend))
}
