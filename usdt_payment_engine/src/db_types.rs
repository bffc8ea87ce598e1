use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;
use upg_common::MicroUsdt;

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(pub String);

//--------------------------------------        OrderId        -------------------------------------------------------
/// The human-readable order number handed to users and cited by the gateway as `out_trade_no`.
#[derive(Debug, Clone, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------       Currency        -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum Currency {
    Usdt,
    Fiat,
}

impl Currency {
    /// The amount-matching tolerance for this currency, in micro-units.
    /// 1e-6 USDT for crypto, 0.01 for fiat.
    pub fn tolerance(&self) -> MicroUsdt {
        match self {
            Currency::Usdt => MicroUsdt::from(1),
            Currency::Fiat => MicroUsdt::from(10_000),
        }
    }
}

impl Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Currency::Usdt => write!(f, "USDT"),
            Currency::Fiat => write!(f, "Fiat"),
        }
    }
}

impl FromStr for Currency {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "usdt" => Ok(Self::Usdt),
            "fiat" => Ok(Self::Fiat),
            s => Err(ConversionError(format!("Invalid currency: {s}"))),
        }
    }
}

//--------------------------------------   OrderStatusType     -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderStatusType {
    /// The order has been created and no payment has been matched to it yet.
    Pending,
    /// A payment has been matched and the user balance credited.
    Completed,
    /// The order passed its expiry deadline without a matching payment.
    Expired,
    /// The order was cancelled by the user or an admin.
    Cancelled,
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatusType::Pending => write!(f, "Pending"),
            OrderStatusType::Completed => write!(f, "Completed"),
            OrderStatusType::Expired => write!(f, "Expired"),
            OrderStatusType::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Completed" => Ok(Self::Completed),
            "Expired" => Ok(Self::Expired),
            "Cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

//--------------------------------------        Order        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub user_id: i64,
    /// The amount the user asked to top up.
    pub base_amount: MicroUsdt,
    /// `base_amount` plus the random disambiguation tail. This is the amount the user is told to
    /// pay, and the amount incoming payments are matched against.
    pub amount: MicroUsdt,
    pub currency: Currency,
    pub status: OrderStatusType,
    /// Set when the order was placed through an agent (reseller) bot.
    pub agent_id: Option<String>,
    /// Quantity sold, used for per-unit commission accrual.
    pub units: i64,
    /// The external reference (txid or gateway trade number) that credited this order. Set once.
    pub credited_ref: Option<String>,
    pub credited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------       NewOrder       --------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: i64,
    pub base_amount: MicroUsdt,
    pub currency: Currency,
    pub agent_id: Option<String>,
    pub units: i64,
}

impl NewOrder {
    pub fn new(user_id: i64, base_amount: MicroUsdt, currency: Currency) -> Self {
        Self { user_id, base_amount, currency, agent_id: None, units: 1 }
    }

    pub fn for_agent<S: Into<String>>(mut self, agent_id: S, units: i64) -> Self {
        self.agent_id = Some(agent_id.into());
        self.units = units;
        self
    }
}

//--------------------------------------  ChainTransferEvent  --------------------------------------------------------
/// A TRC20 transfer as reported by the feed. `value_sun` is the raw integer amount in the token's
/// smallest unit (1 USDT = 10^6 sun).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainTransferEvent {
    pub txid: String,
    pub to_address: String,
    pub value_sun: i64,
    pub block_number: i64,
    pub confirmations: i64,
    pub event_time: DateTime<Utc>,
}

impl ChainTransferEvent {
    pub fn amount(&self) -> MicroUsdt {
        MicroUsdt::from(self.value_sun)
    }
}

//--------------------------------------    TransferStatus    --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum TransferStatus {
    /// Mirrored from the feed, not yet matched to an order.
    Received,
    /// Matched and credited through the order flow.
    Credited,
    /// Matching ran and found no candidate order. Kept for admin rescan.
    Unmatched,
}

impl Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferStatus::Received => write!(f, "Received"),
            TransferStatus::Credited => write!(f, "Credited"),
            TransferStatus::Unmatched => write!(f, "Unmatched"),
        }
    }
}

impl FromStr for TransferStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Received" => Ok(Self::Received),
            "Credited" => Ok(Self::Credited),
            "Unmatched" => Ok(Self::Unmatched),
            s => Err(ConversionError(format!("Invalid transfer status: {s}"))),
        }
    }
}

//--------------------------------------     ChainTransfer    --------------------------------------------------------
/// A mirrored transfer record. The `transfers` table is append-only by txid; records are never
/// deleted, so unmatched payments stay visible to the rescan tools.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct ChainTransfer {
    pub txid: String,
    pub to_address: String,
    pub amount: MicroUsdt,
    pub block_number: i64,
    pub event_time: DateTime<Utc>,
    pub status: TransferStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------      UserAccount     --------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct UserAccount {
    pub user_id: i64,
    pub balance: MicroUsdt,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------        Agent         --------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: String,
    /// Commission added on top of the base price, per unit sold.
    pub markup_per_unit: MicroUsdt,
    pub profit_available: MicroUsdt,
    pub profit_frozen: MicroUsdt,
    pub total_paid: MicroUsdt,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    /// Cumulative accrued commission. Never decreases.
    pub fn total_earned(&self) -> MicroUsdt {
        self.profit_available + self.profit_frozen + self.total_paid
    }
}

//--------------------------------------   WithdrawalStatus   --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Rejected,
    Paid,
}

impl Display for WithdrawalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WithdrawalStatus::Pending => write!(f, "Pending"),
            WithdrawalStatus::Approved => write!(f, "Approved"),
            WithdrawalStatus::Rejected => write!(f, "Rejected"),
            WithdrawalStatus::Paid => write!(f, "Paid"),
        }
    }
}

impl FromStr for WithdrawalStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Approved" => Ok(Self::Approved),
            "Rejected" => Ok(Self::Rejected),
            "Paid" => Ok(Self::Paid),
            s => Err(ConversionError(format!("Invalid withdrawal status: {s}"))),
        }
    }
}

//-------------------------------------- WithdrawalRequest ----------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: i64,
    pub agent_id: String,
    /// The frozen amount. The fee is carved out of the payout, not out of the ledger.
    pub amount: MicroUsdt,
    pub fee: MicroUsdt,
    pub payout_address: String,
    pub status: WithdrawalStatus,
    /// Transaction id of the payout, set by `mark_paid`.
    pub payout_ref: Option<String>,
    /// Rejection note, set by `reject`.
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<String>,
}

impl WithdrawalRequest {
    /// The amount actually transferred to the agent when the request is paid out.
    pub fn net_payout(&self) -> MicroUsdt {
        self.amount - self.fee
    }
}
