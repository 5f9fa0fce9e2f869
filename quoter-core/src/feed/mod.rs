//! Reference price feed
//!
//! External feeds disagree on payload shape; the extractor accepts the
//! three we see in practice and takes the last price found:
//!
//! - `{"p": <decimal>}` (futures aggTrade style)
//! - `{"data": {"p": <decimal>}}`
//! - `{"data": [{"price": <decimal>}, …]}` (trade batches)
//!
//! The subscriber reconnects forever with a flat one-second backoff. While
//! it is down the fair price freezes and the engine keeps servicing venue
//! events; quoting resumes with the first fresh sample.

use crate::engine::EngineEvent;
use futures::StreamExt;
use rust_decimal::Decimal;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{info, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Pull the reference price out of one feed frame, if it carries one.
pub fn extract_reference_price(data: &Value) -> Option<Decimal> {
    let mut price = data.get("p").and_then(decimal_from);
    match data.get("data") {
        Some(Value::Object(inner)) => {
            if let Some(p) = inner.get("p").and_then(decimal_from) {
                price = Some(p);
            }
        }
        Some(Value::Array(lines)) => {
            for line in lines {
                if let Some(p) = line.get("price").and_then(decimal_from) {
                    price = Some(p);
                }
            }
        }
        _ => {}
    }
    price
}

fn decimal_from(value: &Value) -> Option<Decimal> {
    serde_json::from_value(value.clone()).ok()
}

/// Stream URL for a futures aggTrade subscription.
pub fn agg_trade_url(ws_base: &str, symbol: &str) -> String {
    format!("{}/{}@aggTrade", ws_base, symbol.to_lowercase())
}

/// Spawn the reconnecting subscriber. Extracted prices land in the engine
/// channel; the task ends when the engine side goes away.
pub fn spawn_reference_feed(
    url: String,
    event_tx: mpsc::UnboundedSender<EngineEvent>,
) -> JoinHandle<()> {
    tokio::spawn(run(url, event_tx))
}

async fn run(url: String, event_tx: mpsc::UnboundedSender<EngineEvent>) {
    loop {
        match connect_async(url.as_str()).await {
            Ok((mut ws, _)) => {
                info!(%url, "reference feed connected");
                while let Some(frame) = ws.next().await {
                    match frame {
                        Ok(Message::Text(text)) => match serde_json::from_str::<Value>(&text) {
                            Ok(value) => {
                                if let Some(price) = extract_reference_price(&value) {
                                    if event_tx.send(EngineEvent::Reference(price)).is_err() {
                                        return;
                                    }
                                }
                            }
                            Err(err) => warn!(%err, "unparseable reference frame"),
                        },
                        Ok(Message::Close(_)) => break,
                        Ok(_) => {}
                        Err(err) => {
                            warn!(%err, "reference feed error");
                            break;
                        }
                    }
                }
                warn!("reference feed disconnected, fair price frozen until reconnect");
            }
            Err(err) => warn!(%err, "reference feed connect failed"),
        }
        if event_tx.is_closed() {
            return;
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}
