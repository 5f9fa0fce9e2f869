//! Venue REST/WebSocket client
//!
//! Production implementation of [`VenueAdapter`]:
//!
//! - REST for account login and order entry (`POST /v1/orders`,
//!   `DELETE /v1/orders/:id`), authenticated with the bearer token the
//!   login call returns.
//! - One WebSocket on `/realtime` carrying both subscribed topics; every
//!   inbound frame is pushed verbatim into the engine channel.
//! - Outbound requests queue locally and leave in one batch per
//!   reconciliation pass, handed to a single dispatcher task that owns the
//!   HTTP client. The core never waits on a send: acknowledgements come
//!   back through the stream like any other event.
//!
//! Transport failures are logged and absorbed here; the reconciler re-issues
//! whatever the venue never confirmed.

use crate::engine::EngineEvent;
use crate::venue::{VenueAdapter, VenueRequest};
use anyhow::{bail, Context, Result};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{error, info, warn};

/// Client ids are seconds-since-epoch times this, so restarts never collide
/// with a previous session's ids.
const ID_MULTIPLE: u64 = 1000;

const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct VenueEndpoints {
    pub http_host: String,
    pub ws_host: String,
}

impl VenueEndpoints {
    pub fn new(http_host: impl Into<String>, ws_host: impl Into<String>) -> Self {
        Self {
            http_host: http_host.into(),
            ws_host: ws_host.into(),
        }
    }

    /// Local development stack.
    pub fn local() -> Self {
        Self::new("http://localhost:4000", "ws://localhost:4000")
    }
}

#[derive(Debug, Clone)]
pub struct VenueCredentials {
    pub username: String,
    pub password: String,
}

/// Live venue adapter. Construct with [`VenueClient::connect`].
pub struct VenueClient {
    next_id: u64,
    batch: Vec<VenueRequest>,
    request_tx: mpsc::UnboundedSender<Vec<VenueRequest>>,
}

impl VenueClient {
    /// Log in, subscribe to both data topics, and spawn the stream reader
    /// and the request dispatcher.
    pub async fn connect(
        endpoints: VenueEndpoints,
        credentials: &VenueCredentials,
        market: &str,
        target_leverage: u32,
        event_tx: mpsc::UnboundedSender<EngineEvent>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("failed to build http client")?;

        let token = login(&http, &endpoints.http_host, credentials).await?;
        info!(username = %credentials.username, "venue login ok");

        let ws_url = format!("{}/realtime", endpoints.ws_host);
        let (mut ws, _) = connect_async(ws_url.as_str())
            .await
            .with_context(|| format!("venue websocket connect failed: {}", ws_url))?;
        for (topic, args) in [
            ("market_data", json!({ "symbol": market })),
            (
                "user_data",
                json!({ "symbol": market, "target_leverage": target_leverage }),
            ),
        ] {
            let frame = json!({
                "topic": topic,
                "event": "subscribe",
                "payload": args,
                "authorization": format!("Bearer {}", token),
            });
            ws.send(Message::Text(frame.to_string()))
                .await
                .with_context(|| format!("subscribe to {} failed", topic))?;
        }
        info!(market, "venue stream subscribed");
        tokio::spawn(read_loop(ws, event_tx));

        let (request_tx, request_rx) = mpsc::unbounded_channel();
        tokio::spawn(dispatch_loop(
            http,
            endpoints.http_host,
            token,
            market.to_string(),
            request_rx,
        ));

        let next_id = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
            * ID_MULTIPLE;

        Ok(Self {
            next_id,
            batch: Vec::new(),
            request_tx,
        })
    }
}

impl VenueAdapter for VenueClient {
    fn next_client_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn place(&mut self, order: crate::venue::PlaceOrder) {
        self.batch.push(VenueRequest::Place(order));
    }

    fn cancel(&mut self, client_order_id: u64) {
        self.batch.push(VenueRequest::Cancel { client_order_id });
    }

    fn flush_batch(&mut self) {
        if self.batch.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.batch);
        if self.request_tx.send(batch).is_err() {
            error!("request dispatcher is gone, dropping batch");
        }
    }
}

async fn login(
    http: &reqwest::Client,
    http_host: &str,
    credentials: &VenueCredentials,
) -> Result<String> {
    #[derive(serde::Deserialize)]
    struct LoginResponse {
        token: String,
    }

    let url = format!("{}/v1/accounts/login", http_host);
    let response = http
        .post(&url)
        .json(&json!({
            "username": credentials.username,
            "password_hash": credentials.password,
        }))
        .send()
        .await
        .context("login request failed")?;
    if !response.status().is_success() {
        bail!("login rejected: {}", response.status());
    }
    let body: LoginResponse = response.json().await.context("login response malformed")?;
    Ok(body.token)
}

/// Pump every venue frame into the engine channel, verbatim.
async fn read_loop(
    mut ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    event_tx: mpsc::UnboundedSender<EngineEvent>,
) {
    while let Some(frame) = ws.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                if event_tx.send(EngineEvent::Venue(text)).is_err() {
                    return;
                }
            }
            Ok(Message::Close(_)) => {
                error!("venue stream closed; restart to re-sync from the partial");
                return;
            }
            Ok(_) => {}
            Err(err) => {
                error!(%err, "venue stream error; restart to re-sync from the partial");
                return;
            }
        }
    }
}

/// Single consumer of outbound batches. Owns the HTTP client and the token;
/// requests are sent in batch order, one at a time.
async fn dispatch_loop(
    http: reqwest::Client,
    http_host: String,
    token: String,
    market: String,
    mut request_rx: mpsc::UnboundedReceiver<Vec<VenueRequest>>,
) {
    while let Some(batch) = request_rx.recv().await {
        for request in batch {
            if let Err(err) = dispatch_one(&http, &http_host, &token, &market, &request).await {
                // The venue never saw this request; the next reconciliation
                // pass re-issues whatever is still wanted.
                warn!(%err, ?request, "venue request failed");
            }
        }
    }
}

async fn dispatch_one(
    http: &reqwest::Client,
    http_host: &str,
    token: &str,
    market: &str,
    request: &VenueRequest,
) -> Result<()> {
    match request {
        VenueRequest::Place(order) => {
            let url = format!("{}/v1/orders", http_host);
            let body = json!({
                "client_order_id": order.client_order_id,
                "amount": order.amount,
                "price": order.price,
                "leverage": order.leverage,
                "symbol": market,
                "side": order.side,
                "type": "limit",
            });
            let response = http
                .post(&url)
                .bearer_auth(token)
                .json(&body)
                .send()
                .await
                .context("order create request failed")?;
            if !response.status().is_success() {
                bail!("order create rejected: {}", response.status());
            }
        }
        VenueRequest::Cancel { client_order_id } => {
            let url = format!("{}/v1/orders/{}", http_host, client_order_id);
            let response = http
                .delete(&url)
                .bearer_auth(token)
                .send()
                .await
                .context("order delete request failed")?;
            if !response.status().is_success() {
                bail!("order delete rejected: {}", response.status());
            }
        }
    }
    Ok(())
}
