use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

/// Query parameters for the admin withdrawal listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WithdrawalListQuery {
    pub agent_id: Option<String>,
    pub status: Option<String>,
}

/// Body for approving a withdrawal. The reviewer defaults to "admin" when omitted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApproveRequest {
    pub reviewer: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RejectRequest {
    pub reason: String,
    pub reviewer: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarkPaidRequest {
    pub payout_ref: String,
    pub reviewer: Option<String>,
}
