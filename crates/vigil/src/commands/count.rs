//! `vigil count`: one filtered active-alarm fetch.

use std::sync::Arc;

use vigil_api::TokenCell;
use vigil_core::AlarmCount;

use crate::cli::GlobalOpts;
use crate::config;
use crate::error::CliError;
use crate::output::{self, FieldRow};

fn rows(count: &AlarmCount) -> Vec<FieldRow> {
    vec![
        FieldRow::new("Active alarms", count.value.to_string()),
        FieldRow::new("Source", count.source.to_string()),
        FieldRow::new(
            "Updated",
            count
                .last_update
                .map_or_else(|| "-".into(), |t| t.to_rfc3339()),
        ),
    ]
}

pub async fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let resolved = config::resolve(global)?;
    let token = Arc::new(TokenCell::with_token(resolved.require_token()?));
    let (engine, _backend) = super::build_engine(&resolved, token)?;

    let count = engine.refresh_count().await?;
    let out = output::render_single(global.output, &count, rows, |c| c.value.to_string());
    output::print_output(&out, global.quiet);
    Ok(())
}
