//! `vigil logout`: clear the snapshot and tell every instance sharing it.

use std::sync::Arc;

use tracing::info;

use vigil_api::TokenCell;
use vigil_core::{Session, SnapshotStore, StorageBackend, TabId};

use crate::cli::{GlobalOpts, LogoutArgs};
use crate::config;
use crate::error::CliError;
use crate::output;

pub fn handle(args: &LogoutArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let (profile, dir) = config::local(global)?;

    if dir.is_dir() {
        let backend: Arc<dyn StorageBackend> = super::open_backend(&dir)?;
        let store = Arc::new(SnapshotStore::open(backend, TabId::new()));
        let session = Session::new(Arc::new(TokenCell::new()), store);
        session.logout()?;
        info!(dir = %dir.display(), "snapshot cleared");
    }

    if args.forget {
        vigil_config::forget_token(&profile)?;
        info!(profile = %profile, "keyring token removed");
    }

    output::print_output(
        &format!("Logged out ({})", dir.display()),
        global.quiet,
    );
    Ok(())
}
