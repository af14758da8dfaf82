use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// Direction of a position or trade, as reported by the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

/// Net direction of the combined exposure in one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NetDirection {
    Buy,
    Sell,
    Neutral,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// The persisted login record, one flat JSON object on disk.
///
/// A session with `is_authenticated == false` must never be used to issue
/// data requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub account_number: String,
    pub server: String,
    /// Opaque bearer token issued by the login endpoint.
    pub token: String,
    pub is_authenticated: bool,
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// Snapshot of the account's monetary state. Replaced wholesale on every
/// successful poll, never patched field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSnapshot {
    pub balance: Decimal,
    pub equity: Decimal,
    pub margin: Decimal,
    pub free_margin: Decimal,
    /// Equity as a percentage of used margin.
    pub margin_level: Decimal,
    pub profit: Decimal,
    pub currency: String,
}

impl AccountSnapshot {
    /// Margin level above which the account is considered out of the
    /// danger zone (the terminal flags anything at or below 200%).
    pub fn margin_level_is_safe(&self) -> bool {
        self.margin_level > Decimal::from(200)
    }
}

/// The richer account record returned by the login endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    pub account_number: String,
    pub name: String,
    pub server: String,
    pub balance: Decimal,
    pub equity: Decimal,
    pub margin: Decimal,
    pub free_margin: Decimal,
    pub margin_level: Decimal,
    pub profit: Decimal,
    pub currency: String,
    pub leverage: u32,
    pub company: String,
}

// ---------------------------------------------------------------------------
// Positions
// ---------------------------------------------------------------------------

/// A currently open position. The broker ticket is the natural key;
/// `current_price`, `profit`, and `swap` move between polls, everything
/// else is fixed at open time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub ticket: u64,
    pub symbol: String,
    #[serde(rename = "type")]
    pub side: Side,
    /// Size in lots, always positive; direction lives in `side`.
    pub volume: Decimal,
    pub open_price: Decimal,
    pub current_price: Decimal,
    pub profit: Decimal,
    pub swap: Decimal,
    pub commission: Decimal,
    pub open_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Position {
    /// Volume with the sign convention used for net exposure:
    /// BUY contributes +volume, SELL contributes -volume.
    pub fn signed_volume(&self) -> Decimal {
        match self.side {
            Side::Buy => self.volume,
            Side::Sell => -self.volume,
        }
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// A closed trade. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryTrade {
    pub ticket: u64,
    pub symbol: String,
    #[serde(rename = "type")]
    pub side: Side,
    pub volume: Decimal,
    pub open_price: Decimal,
    pub close_price: Decimal,
    pub profit: Decimal,
    #[serde(default)]
    pub swap: Decimal,
    #[serde(default)]
    pub commission: Decimal,
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl HistoryTrade {
    /// Realized result including swap and commission (both broker-signed,
    /// so costs arrive as negative amounts).
    pub fn net_profit(&self) -> Decimal {
        self.profit + self.swap + self.commission
    }
}

// ---------------------------------------------------------------------------
// Symbol summary (derived)
// ---------------------------------------------------------------------------

/// Per-symbol net exposure derived from the open position set.
///
/// Never persisted or cached; recomputed in full from the current
/// positions on every poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolSummary {
    pub symbol: String,
    /// |sum of signed volumes|, never negative.
    pub net_volume: Decimal,
    pub net_type: NetDirection,
    pub total_profit: Decimal,
    pub total_swap: Decimal,
    pub total_commission: Decimal,
    pub position_count: usize,
}

// ---------------------------------------------------------------------------
// Login contract
// ---------------------------------------------------------------------------

/// Credentials submitted to the login endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub account_number: String,
    pub password: String,
    pub server: String,
}

/// Successful login payload: the bearer token plus the account record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginOk {
    pub token: String,
    pub account_info: AccountInfo,
}
