//! REST client for the Interactive Brokers Client Portal gateway.
//!
//! Maps the gateway's JSON payloads onto the engine's snapshot types.
//! The gateway reports numbers both as JSON numbers and as strings, so
//! every field goes through the tolerant helpers at the bottom of this file.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use eqx_core::{
    parse_broker_decimal, Instrument, InstrumentId, OrderHandle, OrderId, OrderSide, OrderSpec,
    OrderStatus, OrderType, Position, Price, PriceSnapshot, Quantity, SessionCalendar,
    WorkingOrder,
};
use parking_lot::RwLock;
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::broker::{AccountSummary, BoxFuture, Broker};
use crate::error::{BrokerError, BrokerResult};

/// Snapshot field codes: last, bid, ask, prior close.
const SNAPSHOT_FIELDS: &str = "31,84,86,7741";

/// Gateway connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// API root, e.g. `https://127.0.0.1:5000/v1/api`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Account to trade. Unset selects the first managed account.
    #[serde(default)]
    pub account_id: Option<String>,
    /// The local gateway serves a self-signed certificate.
    #[serde(default = "default_accept_invalid_certs")]
    pub accept_invalid_certs: bool,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Upper bound on order-confirmation prompts answered per placement.
    #[serde(default = "default_max_confirmations")]
    pub max_confirmations: usize,
}

fn default_base_url() -> String {
    "https://127.0.0.1:5000/v1/api".to_string()
}

fn default_accept_invalid_certs() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_max_confirmations() -> usize {
    3
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            account_id: None,
            accept_invalid_certs: default_accept_invalid_certs(),
            timeout_ms: default_timeout_ms(),
            max_confirmations: default_max_confirmations(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AuthStatus {
    #[serde(default)]
    authenticated: bool,
    #[serde(default)]
    connected: bool,
}

/// Client Portal gateway broker.
pub struct GatewayBroker {
    client: Client,
    config: GatewayConfig,
    calendar: SessionCalendar,
    connected: AtomicBool,
    /// Resolved trading account.
    account: RwLock<Option<String>>,
}

impl GatewayBroker {
    /// Create a new gateway client.
    pub fn new(config: GatewayConfig, calendar: SessionCalendar) -> BrokerResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| BrokerError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        let account = RwLock::new(config.account_id.clone());
        Ok(Self {
            client,
            config,
            calendar,
            connected: AtomicBool::new(false),
            account,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn get_json(&self, path: &str) -> BrokerResult<Value> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| BrokerError::HttpClient(format!("GET {path} failed: {e}")))?;
        Self::read_json(path, response).await
    }

    async fn post_json(&self, path: &str, body: &Value) -> BrokerResult<Value> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| BrokerError::HttpClient(format!("POST {path} failed: {e}")))?;
        Self::read_json(path, response).await
    }

    async fn read_json(path: &str, response: reqwest::Response) -> BrokerResult<Value> {
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(BrokerError::NotAuthenticated);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BrokerError::HttpClient(format!("{path}: HTTP {status}: {body}")));
        }
        response
            .json()
            .await
            .map_err(|e| BrokerError::Decode(format!("{path}: {e}")))
    }

    fn ensure_connected(&self) -> BrokerResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BrokerError::NotConnected)
        }
    }

    async fn fetch_accounts(&self) -> BrokerResult<Vec<String>> {
        let body = self.get_json("/iserver/accounts").await?;
        let accounts = body
            .get("accounts")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        Ok(accounts)
    }

    async fn account(&self) -> BrokerResult<String> {
        let cached = self.account.read().clone();
        if let Some(account) = cached {
            return Ok(account);
        }
        let account = self
            .fetch_accounts()
            .await?
            .into_iter()
            .next()
            .ok_or(BrokerError::NoAccount)?;
        *self.account.write() = Some(account.clone());
        Ok(account)
    }

    async fn submit(&self, instrument: &Instrument, spec: &OrderSpec) -> BrokerResult<OrderHandle> {
        self.ensure_connected()?;
        let account = self.account().await?;
        let body = json!({ "orders": [order_payload(instrument, spec)] });
        let mut reply = self
            .post_json(&format!("/iserver/account/{account}/orders"), &body)
            .await?;

        // The gateway may answer with confirmation prompts before accepting.
        for _ in 0..self.config.max_confirmations {
            let Some(prompt_id) = confirmation_id(&reply) else {
                break;
            };
            debug!(prompt_id = %prompt_id, instrument = %instrument, "Confirming order prompt");
            reply = self
                .post_json(
                    &format!("/iserver/reply/{prompt_id}"),
                    &json!({ "confirmed": true }),
                )
                .await?;
        }

        parse_order_reply(&reply)
    }
}

impl Broker for GatewayBroker {
    fn connect(&self) -> BoxFuture<'_, BrokerResult<()>> {
        Box::pin(async move {
            if self.connected.load(Ordering::SeqCst) {
                return Ok(());
            }
            let status: AuthStatus = serde_json::from_value(self.get_json("/iserver/auth/status").await?)?;
            if !status.authenticated {
                return Err(BrokerError::NotAuthenticated);
            }
            // Order endpoints require the account list to be requested first.
            let accounts = self.fetch_accounts().await?;
            let account = {
                let mut guard = self.account.write();
                if guard.is_none() {
                    *guard = accounts.first().cloned();
                }
                guard.clone()
            };
            self.connected.store(true, Ordering::SeqCst);
            info!(
                base_url = %self.config.base_url,
                gateway_connected = status.connected,
                account = ?account,
                "Connected to broker gateway"
            );
            Ok(())
        })
    }

    fn disconnect(&self) -> BoxFuture<'_, BrokerResult<()>> {
        Box::pin(async move {
            // The gateway session is shared; only the local handle is released.
            self.connected.store(false, Ordering::SeqCst);
            Ok(())
        })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn managed_accounts(&self) -> BoxFuture<'_, BrokerResult<Vec<String>>> {
        Box::pin(async move {
            self.ensure_connected()?;
            let mut accounts = self.fetch_accounts().await?;
            let primary = self.account.read().clone();
            if let Some(primary) = primary {
                accounts.retain(|a| a != &primary);
                accounts.insert(0, primary);
            }
            Ok(accounts)
        })
    }

    fn positions(&self) -> BoxFuture<'_, BrokerResult<Vec<Position>>> {
        Box::pin(async move {
            self.ensure_connected()?;
            let account = self.account().await?;
            let body = self
                .get_json(&format!("/portfolio/{account}/positions/0"))
                .await?;
            let rows = body
                .as_array()
                .ok_or_else(|| BrokerError::Decode("positions response is not an array".to_string()))?;
            Ok(rows.iter().filter_map(parse_position).collect())
        })
    }

    fn working_orders(&self) -> BoxFuture<'_, BrokerResult<Vec<WorkingOrder>>> {
        Box::pin(async move {
            self.ensure_connected()?;
            let body = self.get_json("/iserver/account/orders").await?;
            let rows = body
                .get("orders")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            Ok(rows.iter().filter_map(parse_order).collect())
        })
    }

    fn account_summary(&self) -> BoxFuture<'_, BrokerResult<AccountSummary>> {
        Box::pin(async move {
            self.ensure_connected()?;
            let account = self.account().await?;
            let body = self
                .get_json(&format!("/portfolio/{account}/summary"))
                .await?;
            Ok(parse_summary(&body))
        })
    }

    fn place_order<'a>(
        &'a self,
        instrument: &'a Instrument,
        spec: &'a OrderSpec,
    ) -> BoxFuture<'a, BrokerResult<OrderHandle>> {
        Box::pin(self.submit(instrument, spec))
    }

    fn price_snapshot<'a>(
        &'a self,
        instrument: &'a Instrument,
        wait: Duration,
    ) -> BoxFuture<'a, BrokerResult<PriceSnapshot>> {
        Box::pin(async move {
            self.ensure_connected()?;
            let path = format!(
                "/iserver/marketdata/snapshot?conids={}&fields={SNAPSHOT_FIELDS}",
                instrument.id
            );
            // First request subscribes; fields arrive on a later read.
            self.get_json(&path).await?;
            tokio::time::sleep(wait).await;
            let body = self.get_json(&path).await?;
            let row = body
                .as_array()
                .and_then(|rows| rows.first())
                .cloned()
                .unwrap_or(Value::Null);
            Ok(parse_snapshot(&row))
        })
    }

    fn daily_pnl<'a>(&'a self, account: &'a str) -> BoxFuture<'a, BrokerResult<Option<Decimal>>> {
        Box::pin(async move {
            self.ensure_connected()?;
            let body = self.get_json("/iserver/account/pnl/partitioned").await?;
            Ok(parse_daily_pnl(&body, account))
        })
    }

    fn is_regular_session_open_now(&self) -> bool {
        self.calendar.is_regular_open_now()
    }
}

fn order_payload(instrument: &Instrument, spec: &OrderSpec) -> Value {
    let mut order = json!({
        "conid": instrument.id.0,
        "secType": format!("{}:{}", instrument.id.0, instrument.class),
        "orderType": spec.order_type.code(),
        "side": spec.side.to_string(),
        "quantity": spec.quantity.inner().to_f64().unwrap_or_default(),
        "tif": spec.tif.to_string(),
        "outsideRTH": spec.outside_rth,
    });
    if let Some(map) = order.as_object_mut() {
        if let Some(symbol) = &instrument.symbol {
            map.insert("ticker".to_string(), json!(symbol));
        }
        if let Some(px) = spec.limit_price {
            map.insert("price".to_string(), json!(px.inner().to_f64()));
        }
        if let Some(px) = spec.stop_price {
            map.insert("price".to_string(), json!(px.inner().to_f64()));
        }
        if let Some(pct) = spec.trailing_percent {
            map.insert("trailingAmt".to_string(), json!(pct.to_f64()));
            map.insert("trailingType".to_string(), json!("%"));
        }
    }
    order
}

/// Extract a pending confirmation prompt id from an order reply.
fn confirmation_id(reply: &Value) -> Option<String> {
    let first = reply.as_array()?.first()?;
    if first.get("order_id").is_some() {
        return None;
    }
    first.get("message")?;
    value_string(first.get("id")?)
}

fn parse_order_reply(reply: &Value) -> BrokerResult<OrderHandle> {
    if let Some(err) = reply.get("error").and_then(Value::as_str) {
        return Err(BrokerError::OrderRejected(err.to_string()));
    }
    let Some(first) = reply.as_array().and_then(|rows| rows.first()) else {
        warn!("Order reply carried no order rows");
        return Ok(OrderHandle {
            order_id: None,
            status: None,
        });
    };
    if let Some(err) = first.get("error").and_then(Value::as_str) {
        return Err(BrokerError::OrderRejected(err.to_string()));
    }
    let order_id = first
        .get("order_id")
        .and_then(value_i64)
        .map(OrderId);
    let status = first
        .get("order_status")
        .and_then(Value::as_str)
        .map(map_status);
    Ok(OrderHandle { order_id, status })
}

/// Map a gateway order status onto the engine's lifecycle.
pub fn map_status(raw: &str) -> OrderStatus {
    match raw {
        "Submitted" | "PreSubmitted" => OrderStatus::Working,
        "ApiPending" | "PendingSubmit" => OrderStatus::New,
        "Filled" => OrderStatus::Filled,
        "Inactive" | "Rejected" => OrderStatus::Rejected,
        _ => OrderStatus::Cancelled,
    }
}

fn parse_position(row: &Value) -> Option<Position> {
    let asset_class = row.get("assetClass").and_then(Value::as_str).unwrap_or("STK");
    if asset_class != "STK" {
        return None;
    }
    let id = row.get("conid").and_then(value_i64)?;
    let quantity = row.get("position").and_then(value_decimal)?;
    let symbol = row
        .get("ticker")
        .or_else(|| row.get("contractDesc"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let avg_cost = row
        .get("avgCost")
        .or_else(|| row.get("avgPrice"))
        .and_then(value_decimal)
        .map(Price::new);
    Some(Position {
        instrument: Instrument::equity(InstrumentId(id), symbol),
        quantity: Quantity::new(quantity),
        avg_cost,
    })
}

fn parse_order(row: &Value) -> Option<WorkingOrder> {
    let order_id = row.get("orderId").and_then(value_i64)?;
    let instrument_id = row.get("conid").and_then(value_i64)?;
    let side = match row.get("side").and_then(Value::as_str)? {
        "BUY" | "B" => OrderSide::Buy,
        "SELL" | "S" => OrderSide::Sell,
        _ => return None,
    };
    let order_type = row
        .get("orderType")
        .and_then(Value::as_str)
        .and_then(OrderType::from_code)?;
    let quantity = row
        .get("totalSize")
        .or_else(|| row.get("remainingQuantity"))
        .and_then(value_decimal)
        .unwrap_or_default();
    let status = row
        .get("status")
        .and_then(Value::as_str)
        .map(map_status)
        .unwrap_or(OrderStatus::Cancelled);
    Some(WorkingOrder {
        order_id: OrderId(order_id),
        instrument_id: InstrumentId(instrument_id),
        symbol: row.get("ticker").and_then(Value::as_str).map(str::to_string),
        side,
        order_type,
        quantity: Quantity::new(quantity),
        status,
    })
}

/// Gateway summary keys mapped to account-summary tags.
const SUMMARY_TAGS: &[(&str, &str)] = &[
    ("buyingpower", "BuyingPower"),
    ("availablefunds", "AvailableFunds"),
    ("netliquidation", "NetLiquidation"),
    ("excessliquidity", "ExcessLiquidity"),
    ("totalcashvalue", "TotalCashValue"),
];

fn parse_summary(body: &Value) -> AccountSummary {
    let tags: HashMap<&str, &str> = SUMMARY_TAGS.iter().copied().collect();
    let mut summary = AccountSummary::new();
    let Some(map) = body.as_object() else {
        return summary;
    };
    for (key, entry) in map {
        let raw = entry
            .get("amount")
            .or_else(|| entry.get("value"))
            .and_then(value_string);
        let Some(raw) = raw else { continue };
        let tag = tags
            .get(key.as_str())
            .map(|t| (*t).to_string())
            .unwrap_or_else(|| key.clone());
        summary.insert(tag, raw);
    }
    summary
}

fn parse_snapshot(row: &Value) -> PriceSnapshot {
    let field = |code: &str| {
        row.get(code)
            .and_then(value_string)
            .and_then(|raw| parse_quote(&raw))
            .and_then(Price::positive)
    };
    PriceSnapshot {
        last: field("31"),
        bid: field("84"),
        ask: field("86"),
        close: field("7741"),
    }
}

/// Parse a snapshot quote; values may carry a one-letter prefix such as
/// `C` (prior close) or `H` (halted).
fn parse_quote(raw: &str) -> Option<Price> {
    let trimmed = raw.trim().trim_start_matches(|c: char| c.is_ascii_alphabetic());
    parse_broker_decimal(trimmed).map(Price::new)
}

fn parse_daily_pnl(body: &Value, account: &str) -> Option<Decimal> {
    let partitions = body.get("upnl")?.as_object()?;
    partitions
        .iter()
        .find(|(key, _)| key.starts_with(account))
        .or_else(|| partitions.iter().next())
        .and_then(|(_, entry)| entry.get("dpl"))
        .and_then(value_decimal)
}

fn value_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_decimal(v: &Value) -> Option<Decimal> {
    value_string(v).and_then(|s| parse_broker_decimal(&s))
}

fn value_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
