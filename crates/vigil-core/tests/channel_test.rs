#![allow(clippy::unwrap_used)]
// Push channel reconnection policy, driven by a scripted push source on
// paused time.

mod common;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;

use common::{End, FakePush, Script, push, transient};
use vigil_api::TokenCell;
use vigil_core::{ChannelState, CoreError, StreamChannel, StreamConfig};

fn channel(push: &FakePush, token: Option<&str>) -> StreamChannel<FakePush> {
    let cell = match token {
        Some(t) => TokenCell::with_token(SecretString::from(t)),
        None => TokenCell::new(),
    };
    StreamChannel::new(
        Arc::new(push.clone()),
        Arc::new(cell),
        StreamConfig::default(),
        CancellationToken::new(),
    )
}

#[tokio::test(start_paused = true)]
async fn errors_back_off_exponentially_then_give_up() {
    let push = FakePush::default();
    let ch = channel(&push, Some("t"));

    ch.connect("dash");
    tokio::time::sleep(Duration::from_secs(300)).await;

    // Delays 2s, 4s, 8s, 16s between five attempts, then nothing.
    assert_eq!(push.opens().len(), 5);
    assert_eq!(push.gaps_secs(), vec![2, 4, 8, 16]);
    assert_eq!(ch.state(), ChannelState::Error);
    assert!(!ch.is_running());
}

#[tokio::test(start_paused = true)]
async fn missing_credential_is_an_error_without_attempting() {
    let push = FakePush::default();
    let ch = channel(&push, None);

    ch.connect("dash");
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert!(push.opens().is_empty());
    assert_eq!(ch.state(), ChannelState::Error);
}

#[tokio::test(start_paused = true)]
async fn rejected_credential_is_not_retried() {
    let push = FakePush::new(vec![Script::Fail(CoreError::AuthenticationFailed {
        message: "expired".into(),
    })]);
    let ch = channel(&push, Some("t"));

    ch.connect("dash");
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(push.opens().len(), 1);
    assert_eq!(ch.state(), ChannelState::Error);
}

#[tokio::test(start_paused = true)]
async fn clean_close_reconnects_after_fixed_delay() {
    let push = FakePush::new(vec![
        Script::Open(vec![push(1)], End::Close),
        Script::Open(Vec::new(), End::Hang),
    ]);
    let ch = channel(&push, Some("t"));
    let mut updates = ch.subscribe_updates();

    ch.connect("dash");
    assert_eq!(updates.recv().await.unwrap().alarm_count, 1);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(ch.state(), ChannelState::Disconnected);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(push.gaps_secs(), vec![5]);
    assert_eq!(ch.state(), ChannelState::Connected);
}

#[tokio::test(start_paused = true)]
async fn successful_connection_resets_the_failure_count() {
    let push = FakePush::new(vec![
        Script::Fail(transient()),
        Script::Fail(transient()),
        Script::Open(Vec::new(), End::Error),
        Script::Fail(transient()),
        Script::Open(Vec::new(), End::Hang),
    ]);
    let ch = channel(&push, Some("t"));

    ch.connect("dash");
    tokio::time::sleep(Duration::from_secs(60)).await;

    // fail(2s) fail(4s) open→stream error(2s) fail(4s) open
    assert_eq!(push.gaps_secs(), vec![2, 4, 2, 4]);
    assert_eq!(ch.state(), ChannelState::Connected);
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_pending_reconnect() {
    let push = FakePush::default();
    let ch = channel(&push, Some("t"));

    ch.connect("dash");
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(push.opens().len(), 1);

    ch.disconnect().await;
    tokio::time::sleep(Duration::from_secs(300)).await;

    assert_eq!(push.opens().len(), 1);
    assert_eq!(ch.state(), ChannelState::Idle);
    assert!(!ch.is_running());
}

#[tokio::test(start_paused = true)]
async fn reconnect_replaces_previous_loop() {
    let push = FakePush::new(vec![
        Script::Open(Vec::new(), End::Hang),
        Script::Open(vec![push(7)], End::Hang),
    ]);
    let ch = channel(&push, Some("t"));
    let mut updates = ch.subscribe_updates();

    ch.connect("dash");
    tokio::time::sleep(Duration::from_secs(1)).await;
    ch.connect("dash");

    assert_eq!(updates.recv().await.unwrap().alarm_count, 7);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(push.opens().len(), 2);
    assert_eq!(ch.state(), ChannelState::Connected);
}
