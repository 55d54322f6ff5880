//! Push-stream subscription over WebSocket.
//!
//! Opens the server's alarm-count stream, sends the `{ clientId }`
//! subscription request, and yields every [`PushFrame`] the server sends
//! until the transport closes. Reconnection is the caller's job: this
//! module models exactly one connection.
//!
//! # Example
//!
//! ```rust,ignore
//! use futures_util::StreamExt;
//! use vigil_api::push;
//!
//! let url = url::Url::parse("wss://scada.local/api/v1/alarms/stream")?;
//! let mut stream = push::subscribe(&url, "dashboard-1", &token, Duration::from_secs(30)).await?;
//! while let Some(frame) = stream.next().await {
//!     println!("server-wide count: {}", frame?.alarm_count);
//! }
//! ```

use std::pin::Pin;
use std::time::Duration;

use futures_core::Stream;
use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tracing::{debug, info, trace};
use url::Url;

use crate::error::Error;
use crate::models::{PushFrame, SubscribeRequest};

/// An open push subscription. Ends (`None`) when the server closes the
/// stream cleanly; yields `Err` once and ends on a transport failure.
pub type PushStream = Pin<Box<dyn Stream<Item = Result<PushFrame, Error>> + Send>>;

/// Connect to the push endpoint and start the subscription.
///
/// The bearer token rides on the upgrade request. A 401/403 handshake
/// response maps to [`Error::Authentication`]. A server that accepts the
/// TCP connection but does not finish the upgrade within
/// `handshake_timeout` yields [`Error::Timeout`].
pub async fn subscribe(
    url: &Url,
    client_id: &str,
    token: &SecretString,
    handshake_timeout: Duration,
) -> Result<PushStream, Error> {
    info!(url = %url, client_id, "opening push stream");

    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::StreamConnect(e.to_string()))?;

    let request = ClientRequestBuilder::new(uri).with_header(
        "Authorization",
        format!("Bearer {}", token.expose_secret()),
    );

    let (ws_stream, _response) =
        tokio::time::timeout(handshake_timeout, tokio_tungstenite::connect_async(request))
            .await
            .map_err(|_| Error::Timeout {
                timeout_secs: handshake_timeout.as_secs(),
            })?
            .map_err(map_connect_error)?;

    let (mut write, mut read) = ws_stream.split();

    let hello = serde_json::to_string(&SubscribeRequest { client_id }).map_err(|e| {
        Error::StreamConnect(format!("failed to encode subscription request: {e}"))
    })?;
    write
        .send(tungstenite::Message::Text(hello.into()))
        .await
        .map_err(|e| Error::StreamConnect(e.to_string()))?;

    info!("push stream subscribed");

    let stream = async_stream::stream! {
        // The write half stays alive for the lifetime of the stream so
        // tungstenite can answer pings.
        let _write = write;

        while let Some(frame) = read.next().await {
            match frame {
                Ok(tungstenite::Message::Text(text)) => match parse_frame(text.as_str()) {
                    Ok(update) => yield Ok(update),
                    Err(e) => debug!(error = %e, "skipping malformed push frame"),
                },
                Ok(tungstenite::Message::Ping(_)) => trace!("push stream ping"),
                Ok(tungstenite::Message::Close(frame)) => {
                    if let Some(cf) = frame {
                        info!(code = %cf.code, reason = %cf.reason, "push stream close frame received");
                    } else {
                        info!("push stream close frame received (no payload)");
                    }
                    break;
                }
                Ok(_) => {
                    // Binary, Pong, Frame -- ignore
                }
                Err(e) => {
                    yield Err(Error::StreamConnect(e.to_string()));
                    break;
                }
            }
        }
    };

    Ok(Box::pin(stream))
}

fn map_connect_error(err: tungstenite::Error) -> Error {
    match err {
        tungstenite::Error::Http(resp)
            if matches!(resp.status().as_u16(), 401 | 403) =>
        {
            Error::Authentication {
                message: format!("push stream handshake rejected ({})", resp.status()),
            }
        }
        other => Error::StreamConnect(other.to_string()),
    }
}

// ── Frame parsing ────────────────────────────────────────────────────

/// Streaming RPC gateways wrap each message as `{ "result": {...} }`;
/// plain WebSocket servers send the message itself.
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum FrameEnvelope {
    Wrapped { result: PushFrame },
    Bare(PushFrame),
}

/// Parse and shape-check one text frame. The count is never interpreted
/// beyond "is a non-negative integer".
pub fn parse_frame(text: &str) -> Result<PushFrame, Error> {
    let envelope: FrameEnvelope =
        serde_json::from_str(text).map_err(|e| Error::InvalidFrame(e.to_string()))?;
    let frame = match envelope {
        FrameEnvelope::Wrapped { result } => result,
        FrameEnvelope::Bare(frame) => frame,
    };
    if frame.alarm_count < 0 {
        return Err(Error::InvalidFrame(format!(
            "negative alarmCount {}",
            frame.alarm_count
        )));
    }
    Ok(frame)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parse_bare_frame() {
        let frame = parse_frame(r#"{"alarmCount": 12, "timestamp": 1760000000000}"#).unwrap();
        assert_eq!(frame.alarm_count, 12);
        assert_eq!(frame.timestamp, 1_760_000_000_000);
    }

    #[test]
    fn parse_wrapped_frame() {
        let frame =
            parse_frame(r#"{"result": {"alarmCount": 3, "timestamp": 5}}"#).unwrap();
        assert_eq!(frame.alarm_count, 3);
    }

    #[test]
    fn reject_negative_count() {
        let err = parse_frame(r#"{"alarmCount": -1, "timestamp": 5}"#).unwrap_err();
        assert!(matches!(err, Error::InvalidFrame(_)));
    }

    #[tokio::test]
    async fn stalled_upgrade_times_out() {
        // The kernel completes the TCP handshake; nobody answers the upgrade.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = Url::parse(&format!("ws://{}/stream", listener.local_addr().unwrap())).unwrap();
        let token = SecretString::from("t0ken");

        let result = subscribe(&url, "dashboard-1", &token, Duration::from_millis(200)).await;
        assert!(matches!(result, Err(Error::Timeout { timeout_secs: 0 })));
        drop(listener);
    }

    #[test]
    fn reject_wrong_shape() {
        assert!(parse_frame("not json at all").is_err());
        assert!(parse_frame(r#"{"count": 3}"#).is_err());
        assert!(parse_frame(r#"{"alarmCount": "3", "timestamp": 1}"#).is_err());
    }
}
