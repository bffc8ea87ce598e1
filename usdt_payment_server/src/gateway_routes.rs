//! The fiat gateway callback endpoint.
//!
//! The gateway retries a callback until it receives a plain `success` body, so the handler only
//! answers `success` once the system is in a terminal-correct state: the order was credited by
//! this callback, or had already been credited by the same trade. Every other case answers with
//! a non-success status and leaves no state behind.
use std::collections::HashMap;

use actix_web::{get, post, web, HttpResponse};
use log::*;
use upg_common::MicroUsdt;
use usdt_payment_engine::{db_types::OrderId, MatchOutcome, OrderFlowApi, SqliteLedger};

use crate::{config::ServerConfig, helpers::verify_gateway_signature};

#[get("/callback")]
pub async fn gateway_callback_get(
    query: web::Query<HashMap<String, String>>,
    api: web::Data<OrderFlowApi<SqliteLedger>>,
    config: web::Data<ServerConfig>,
) -> HttpResponse {
    handle_gateway_callback(query.into_inner(), api.as_ref(), &config).await
}

#[post("/callback")]
pub async fn gateway_callback_post(
    form: web::Form<HashMap<String, String>>,
    api: web::Data<OrderFlowApi<SqliteLedger>>,
    config: web::Data<ServerConfig>,
) -> HttpResponse {
    handle_gateway_callback(form.into_inner(), api.as_ref(), &config).await
}

async fn handle_gateway_callback(
    params: HashMap<String, String>,
    api: &OrderFlowApi<SqliteLedger>,
    config: &ServerConfig,
) -> HttpResponse {
    trace!("🌐️ Received gateway callback with {} parameters", params.len());
    if !verify_gateway_signature(&params, config.gateway_key.reveal()) {
        warn!("🌐️ Gateway callback failed signature verification");
        return HttpResponse::Forbidden().body("invalid signature");
    }

    let order_id = params
        .get("out_trade_no")
        .or_else(|| params.get("orderid"))
        .filter(|s| !s.is_empty())
        .map(|s| OrderId(s.clone()));
    let amount = params.get("money").and_then(|s| MicroUsdt::from_decimal_str(s).ok());
    let (Some(order_id), Some(amount)) = (order_id, amount) else {
        warn!("🌐️ Gateway callback is missing the order number or a parsable amount");
        return HttpResponse::BadRequest().body("invalid data");
    };
    if amount.value() <= 0 {
        warn!("🌐️ Gateway callback for {order_id} reports a non-positive amount");
        return HttpResponse::BadRequest().body("invalid data");
    }

    let trade_status = params.get("trade_status").map(|s| s.to_ascii_uppercase()).unwrap_or_default();
    if trade_status != "TRADE_SUCCESS" {
        warn!("🌐️ Gateway callback for {order_id} has trade status {trade_status:?}. Not crediting");
        return HttpResponse::BadRequest().body("trade status error");
    }

    // The gateway's own trade number is the idempotency reference; fall back to a value derived
    // from our order number for gateways that omit it.
    let gateway_ref = params
        .get("trade_no")
        .filter(|s| !s.is_empty())
        .cloned()
        .unwrap_or_else(|| format!("fiat-{}", order_id.as_str()));

    match api.process_gateway_payment(&order_id, &gateway_ref, amount).await {
        Ok(MatchOutcome::Credited(order)) => {
            info!("🌐️ Gateway payment {gateway_ref} credited order {}", order.order_id);
            HttpResponse::Ok().body("success")
        },
        Ok(MatchOutcome::AlreadyCredited(order)) => {
            info!("🌐️ Gateway payment {gateway_ref} was already credited to order {}", order.order_id);
            HttpResponse::Ok().body("success")
        },
        Ok(MatchOutcome::NoMatch) => {
            warn!("🌐️ No pending order matches gateway callback for {order_id}");
            HttpResponse::NotFound().body("order not found")
        },
        Err(e) => {
            error!("🌐️ Error while processing gateway callback for {order_id}: {e}");
            HttpResponse::InternalServerError().body("internal error")
        },
    }
}
