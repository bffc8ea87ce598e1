use serde::{Deserialize, Serialize};
use upg_common::MicroUsdt;

use crate::db_types::{Order, WithdrawalRequest, WithdrawalStatus};

/// Published after a credit transaction commits. Notification layers use this to tell the user
/// (and admins) that the top-up arrived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreditedEvent {
    pub order: Order,
}

impl OrderCreditedEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }

    pub fn user_id(&self) -> i64 {
        self.order.user_id
    }

    pub fn amount(&self) -> MicroUsdt {
        self.order.amount
    }
}

/// Published for each order the expiry sweep transitions to Expired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderExpiredEvent {
    pub order: Order,
}

impl OrderExpiredEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// Published on every withdrawal state transition (created, approved, rejected, paid).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalStateChangedEvent {
    pub request: WithdrawalRequest,
}

impl WithdrawalStateChangedEvent {
    pub fn new(request: WithdrawalRequest) -> Self {
        Self { request }
    }

    pub fn agent_id(&self) -> &str {
        &self.request.agent_id
    }

    pub fn new_status(&self) -> WithdrawalStatus {
        self.request.status
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventType {
    OrderCredited(OrderCreditedEvent),
    OrderExpired(OrderExpiredEvent),
    WithdrawalStateChanged(WithdrawalStateChangedEvent),
}
