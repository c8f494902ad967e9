//! Tails a set of relay channels to stdout, one JSON line per event.
//!
//! ```text
//! RELAY_KEY=app-key RELAY_CHANNELS=updates,presence-lobby \
//! RELAY_SECRET=app-secret RELAY_USER_ID=me cargo run -p relay-tail
//! ```
//!
//! Set `RELAY_NAMESPACE=pusher` when pointing at the default hosted relay.

use std::time::Duration;

use relaycast::prelude::*;
use serde::Serialize;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct TailConfig {
    client: ClientConfig,
    channels: Vec<String>,
}

impl TailConfig {
    /// Reads `RELAY_*` settings through `var`.
    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let key = var("RELAY_KEY").ok_or("RELAY_KEY is required")?;
        let mut builder = ClientConfig::builder(key);

        if let Some(scheme) = var("RELAY_SCHEME") {
            builder = builder.scheme(&scheme);
        }
        if let Some(host) = var("RELAY_HOST") {
            builder = builder.host(&host);
        }
        if let Some(port) = var("RELAY_PORT") {
            let port = port
                .parse()
                .map_err(|_| format!("RELAY_PORT is not a port number: {port}"))?;
            builder = builder.port(port);
        }
        if let Some(namespace) = var("RELAY_NAMESPACE") {
            builder = builder.namespace(&namespace);
        }
        if let Some(secret) = var("RELAY_SECRET") {
            builder = builder.secret(&secret);
        }
        if let Some(user_id) = var("RELAY_USER_ID") {
            builder = builder.user_data(Member::new(user_id));
        }
        if let Some(ms) = var("RELAY_RECONNECT_MS") {
            let ms = ms
                .parse()
                .map_err(|_| format!("RELAY_RECONNECT_MS is not a number: {ms}"))?;
            builder = builder.reconnect_delay(Duration::from_millis(ms));
        }
        let debug = var("RELAY_DEBUG").is_some_and(|v| v == "1" || v == "true");
        builder = builder.debug(debug);

        let channels: Vec<String> = var("RELAY_CHANNELS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(String::from)
            .collect();
        if channels.is_empty() {
            return Err("RELAY_CHANNELS must name at least one channel".into());
        }

        Ok(Self {
            client: builder.build(),
            channels,
        })
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct Line<'a> {
    channel: &'a str,
    event: &'a str,
    data: serde_json::Value,
}

/// Renders one event as a JSON line. Raw payloads that are themselves JSON
/// are inlined rather than quoted.
fn render(channel: &str, event: &str, data: &EventData) -> String {
    let data = match data {
        EventData::Raw(raw) => serde_json::from_str(raw)
            .unwrap_or_else(|_| serde_json::Value::String(raw.clone())),
        EventData::Members(roster) => serde_json::json!({
            "count": roster.len(),
            "ids": roster.members.iter().map(|m| m.user_id.as_str()).collect::<Vec<_>>(),
            "me": roster.me.as_ref().map(|m| m.user_id.as_str()),
        }),
        EventData::Member(member) => serde_json::to_value(member).unwrap_or_default(),
        EventData::Error(reason) => serde_json::json!({ "error": reason }),
    };
    serde_json::to_string(&Line {
        channel,
        event,
        data,
    })
    .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = TailConfig::from_lookup(|name| std::env::var(name).ok())?;

    relaycast::init_tracing(config.client.debug);

    tracing::info!(url = %config.client.url(), channels = ?config.channels, "starting relay-tail");
    let client = RelayClient::new(config.client)?;

    client
        .bind_global(|channel, event, data| println!("{}", render(channel, event, data)))
        .await?;
    for channel in &config.channels {
        if let Err(e) = client.subscribe(channel).await {
            tracing::warn!(channel = %channel, error = %e, "subscribe failed");
        }
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    client.disconnect().await;
    Ok(())
}
