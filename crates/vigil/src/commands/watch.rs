//! `vigil watch`: run the full engine and print every count change and
//! channel transition until interrupted.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use vigil_api::TokenCell;
use vigil_core::{AlarmCount, ChannelState, CountSource};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::config;
use crate::error::CliError;
use crate::output;

/// How often the data directory is rescanned for other processes' writes.
const RESCAN_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum WatchEvent {
    Count {
        value: u64,
        source: CountSource,
        at: Option<DateTime<Utc>>,
    },
    Channel {
        state: &'static str,
    },
}

impl From<AlarmCount> for WatchEvent {
    fn from(count: AlarmCount) -> Self {
        Self::Count {
            value: count.value,
            source: count.source,
            at: count.last_update,
        }
    }
}

fn state_name(state: ChannelState) -> &'static str {
    match state {
        ChannelState::Idle => "idle",
        ChannelState::Connecting => "connecting",
        ChannelState::Connected => "connected",
        ChannelState::Disconnected => "disconnected",
        ChannelState::Error => "error",
    }
}

enum Update {
    Count(AlarmCount),
    Channel(ChannelState),
}

fn render(update: &Update, format: OutputFormat, color: bool) -> Option<String> {
    let event = match *update {
        // Nothing fetched yet in this data directory.
        Update::Count(count) if count.last_update.is_none() => return None,
        Update::Count(count) => WatchEvent::from(count),
        Update::Channel(state) => WatchEvent::Channel {
            state: state_name(state),
        },
    };
    let line = match format {
        OutputFormat::Json | OutputFormat::JsonCompact => output::render_json(&event, true),
        OutputFormat::Yaml => format!("- {}", output::render_json(&event, true)),
        OutputFormat::Plain => match *update {
            Update::Count(count) => count.value.to_string(),
            Update::Channel(state) => format!("# {}", state_name(state)),
        },
        OutputFormat::Table => {
            let now = Utc::now().format("%H:%M:%S");
            match *update {
                Update::Count(count) => format!(
                    "{now}  alarms {}",
                    output::paint_count(count.value, color)
                ),
                Update::Channel(state) => {
                    format!("{now}  stream {}", output::paint_state(state, color))
                }
            }
        }
    };
    Some(line)
}

pub async fn handle(args: &WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let resolved = config::resolve(global)?;
    let token = resolved.require_token()?;
    let (engine, backend) = super::build_engine(&resolved, Arc::new(TokenCell::new()))?;

    let rescan_cancel = CancellationToken::new();
    let rescan = backend.watch_external(RESCAN_PERIOD, rescan_cancel.clone());

    engine.init().await;
    engine.login(token, None)?;
    info!(profile = %resolved.profile_name, "watching");

    let color = output::should_color(global.color);
    let mut updates = engine
        .alarm_count_stream()
        .map(Update::Count)
        .merge(engine.channel_state_stream().map(Update::Channel));
    let mut auth = engine.session().subscribe_authenticated();

    let deadline = args.duration.map(|d| Instant::now() + d);
    let stop = async move {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(stop);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                debug!("interrupted");
                break;
            }
            () = &mut stop => {
                debug!("watch duration elapsed");
                break;
            }
            changed = auth.changed() => {
                if changed.is_err() || !*auth.borrow_and_update() {
                    output::print_output("Logged out by another instance", global.quiet);
                    break;
                }
            }
            Some(update) = updates.next() => {
                if let Some(line) = render(&update, global.output, color) {
                    output::print_output(&line, global.quiet);
                }
            }
        }
    }

    engine.destroy().await;
    rescan_cancel.cancel();
    let _ = rescan.await;
    Ok(())
}
