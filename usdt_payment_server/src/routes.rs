//! Health probe and the `/admin` surface: rescan tools, order statistics and the withdrawal
//! review workflow. The admin scope is guarded by a bearer token at the scope level (see
//! [`crate::server`]); handlers here assume the caller is authorised.
use std::str::FromStr;

use actix_web::{get, post, web, HttpResponse, Responder};
use log::*;
use usdt_payment_engine::{
    db_types::{OrderId, WithdrawalStatus},
    AgentApi,
    MatchOutcome,
    OrderFlowApi,
    RescanApi,
    SqliteLedger,
    WithdrawalFilter,
};

use crate::{
    config::ServerConfig,
    data_objects::{ApproveRequest, JsonResponse, MarkPaidRequest, RejectRequest, WithdrawalListQuery},
    errors::ServerError,
};

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

// ----------------------------------------------   Rescan  ----------------------------------------------------
#[post("/rescan/txid/{txid}")]
pub async fn rescan_txid(
    path: web::Path<String>,
    api: web::Data<RescanApi<SqliteLedger>>,
    config: web::Data<ServerConfig>,
) -> Result<HttpResponse, ServerError> {
    let txid = path.into_inner();
    debug!("💻️ POST rescan by txid {txid}");
    let outcome = api.rescan_by_txid(&txid, config.watcher.match_window).await?;
    Ok(HttpResponse::Ok().json(match_outcome_response(outcome)))
}

#[post("/rescan/order/{order_id}")]
pub async fn rescan_order(
    path: web::Path<String>,
    api: web::Data<RescanApi<SqliteLedger>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId(path.into_inner());
    debug!("💻️ POST rescan by order {order_id}");
    let outcome = api.rescan_by_order(&order_id).await?;
    Ok(HttpResponse::Ok().json(match_outcome_response(outcome)))
}

fn match_outcome_response(outcome: MatchOutcome) -> JsonResponse {
    match outcome {
        MatchOutcome::Credited(order) => {
            JsonResponse::success(format!("Credited order {} with {}", order.order_id, order.amount))
        },
        MatchOutcome::AlreadyCredited(order) => {
            JsonResponse::success(format!("Order {} was already credited", order.order_id))
        },
        MatchOutcome::NoMatch => JsonResponse::failure("No matching order found. The payment remains available for \
            rescan."),
    }
}

// ----------------------------------------------   Orders  ----------------------------------------------------
#[get("/orders/stats")]
pub async fn order_stats(api: web::Data<OrderFlowApi<SqliteLedger>>) -> Result<HttpResponse, ServerError> {
    trace!("💻️ GET order stats");
    let stats = api.order_stats().await?;
    Ok(HttpResponse::Ok().json(stats))
}

// --------------------------------------------   Withdrawals  --------------------------------------------------
#[get("/withdrawals")]
pub async fn list_withdrawals(
    query: web::Query<WithdrawalListQuery>,
    api: web::Data<AgentApi<SqliteLedger>>,
) -> Result<HttpResponse, ServerError> {
    let query = query.into_inner();
    let mut filter = WithdrawalFilter::default();
    if let Some(agent_id) = query.agent_id {
        filter = filter.for_agent(agent_id);
    }
    if let Some(status) = query.status {
        let status = WithdrawalStatus::from_str(&status)
            .map_err(|e| ServerError::InvalidRequestPath(e.to_string()))?;
        filter = filter.with_status(status);
    }
    let requests = api.withdrawals(filter).await?;
    Ok(HttpResponse::Ok().json(requests))
}

#[post("/withdrawals/{id}/approve")]
pub async fn approve_withdrawal(
    path: web::Path<i64>,
    body: Option<web::Json<ApproveRequest>>,
    api: web::Data<AgentApi<SqliteLedger>>,
) -> Result<HttpResponse, ServerError> {
    let request_id = path.into_inner();
    let reviewer = body.and_then(|b| b.into_inner().reviewer).unwrap_or_else(|| "admin".to_string());
    debug!("💻️ POST approve withdrawal #{request_id} by {reviewer}");
    let request = api.approve_withdrawal(request_id, &reviewer).await?;
    Ok(HttpResponse::Ok().json(request))
}

#[post("/withdrawals/{id}/reject")]
pub async fn reject_withdrawal(
    path: web::Path<i64>,
    body: web::Json<RejectRequest>,
    api: web::Data<AgentApi<SqliteLedger>>,
) -> Result<HttpResponse, ServerError> {
    let request_id = path.into_inner();
    let body = body.into_inner();
    let reviewer = body.reviewer.unwrap_or_else(|| "admin".to_string());
    debug!("💻️ POST reject withdrawal #{request_id} by {reviewer}");
    let request = api.reject_withdrawal(request_id, &reviewer, &body.reason).await?;
    Ok(HttpResponse::Ok().json(request))
}

#[post("/withdrawals/{id}/paid")]
pub async fn mark_withdrawal_paid(
    path: web::Path<i64>,
    body: web::Json<MarkPaidRequest>,
    api: web::Data<AgentApi<SqliteLedger>>,
) -> Result<HttpResponse, ServerError> {
    let request_id = path.into_inner();
    let body = body.into_inner();
    let reviewer = body.reviewer.unwrap_or_else(|| "admin".to_string());
    debug!("💻️ POST mark withdrawal #{request_id} paid by {reviewer}");
    let request = api.mark_withdrawal_paid(request_id, &reviewer, &body.payout_ref).await?;
    Ok(HttpResponse::Ok().json(request))
}
