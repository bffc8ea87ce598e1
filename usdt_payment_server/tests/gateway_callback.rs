//! HTTP-level tests for the fiat gateway callback endpoint.
use std::collections::HashMap;

use actix_web::{test, web, App};
use upg_common::MicroUsdt;
use usdt_payment_engine::db_types::{Currency, NewOrder, Order, OrderStatusType};
use usdt_payment_server::{
    gateway_routes::{gateway_callback_get, gateway_callback_post},
    helpers::gateway_sign,
};

mod support;
use support::{new_ledger, order_api, test_config, GATEWAY_KEY};

fn callback_params(order: &Order, key: &str) -> HashMap<String, String> {
    let mut params: HashMap<String, String> = [
        ("out_trade_no".to_string(), order.order_id.as_str().to_string()),
        ("trade_no".to_string(), format!("gw-{}", order.order_id.as_str())),
        ("money".to_string(), order.amount.to_string()),
        ("trade_status".to_string(), "TRADE_SUCCESS".to_string()),
        ("type".to_string(), "alipay".to_string()),
        ("sign_type".to_string(), "MD5".to_string()),
    ]
    .into_iter()
    .collect();
    let sign = gateway_sign(&params, key);
    params.insert("sign".to_string(), sign);
    params
}

macro_rules! callback_app {
    ($db:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new(test_config()))
                .app_data(web::Data::new(order_api($db.clone())))
                .service(gateway_callback_get)
                .service(gateway_callback_post),
        )
        .await
    };
}

#[tokio::test]
async fn valid_callback_credits_and_acks_success() {
    let db = new_ledger().await;
    let api = order_api(db.clone());
    let order = api
        .create_order(NewOrder::new(21, MicroUsdt::from_usdt(50), Currency::Fiat), chrono::Duration::minutes(10))
        .await
        .unwrap();
    let app = callback_app!(db);

    let params = callback_params(&order, GATEWAY_KEY);
    let req = test::TestRequest::post().uri("/callback").set_form(&params).to_request();
    let body = test::call_and_read_body(&app, req).await;
    assert_eq!(&body[..], b"success");

    assert_eq!(api.fetch_order(&order.order_id).await.unwrap().unwrap().status, OrderStatusType::Completed);
    assert_eq!(api.user_balance(21).await.unwrap().unwrap().balance, order.amount);

    // The gateway retries until it sees success; a retry must ack without double-crediting.
    let params = callback_params(&order, GATEWAY_KEY);
    let req = test::TestRequest::post().uri("/callback").set_form(&params).to_request();
    let body = test::call_and_read_body(&app, req).await;
    assert_eq!(&body[..], b"success");
    assert_eq!(api.user_balance(21).await.unwrap().unwrap().balance, order.amount);
}

#[tokio::test]
async fn get_and_post_are_equivalent() {
    let db = new_ledger().await;
    let api = order_api(db.clone());
    let order = api
        .create_order(NewOrder::new(22, MicroUsdt::from_usdt(15), Currency::Fiat), chrono::Duration::minutes(10))
        .await
        .unwrap();
    let app = callback_app!(db);

    let params = callback_params(&order, GATEWAY_KEY);
    let query = params.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("&");
    let req = test::TestRequest::get().uri(&format!("/callback?{query}")).to_request();
    let body = test::call_and_read_body(&app, req).await;
    assert_eq!(&body[..], b"success");
}

#[tokio::test]
async fn bad_signature_is_rejected_without_state_change() {
    let db = new_ledger().await;
    let api = order_api(db.clone());
    let order = api
        .create_order(NewOrder::new(23, MicroUsdt::from_usdt(30), Currency::Fiat), chrono::Duration::minutes(10))
        .await
        .unwrap();
    let app = callback_app!(db);

    let mut params = callback_params(&order, GATEWAY_KEY);
    params.insert("money".to_string(), "0.01".to_string());
    let req = test::TestRequest::post().uri("/callback").set_form(&params).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
    assert_eq!(api.fetch_order(&order.order_id).await.unwrap().unwrap().status, OrderStatusType::Pending);
    assert!(api.user_balance(23).await.unwrap().is_none());
}

#[tokio::test]
async fn non_success_trade_status_is_not_credited() {
    let db = new_ledger().await;
    let api = order_api(db.clone());
    let order = api
        .create_order(NewOrder::new(24, MicroUsdt::from_usdt(30), Currency::Fiat), chrono::Duration::minutes(10))
        .await
        .unwrap();
    let app = callback_app!(db);

    let mut params: HashMap<String, String> = callback_params(&order, GATEWAY_KEY)
        .into_iter()
        .filter(|(k, _)| k != "sign" && k != "trade_status")
        .collect();
    params.insert("trade_status".to_string(), "WAIT_BUYER_PAY".to_string());
    let sign = gateway_sign(&params, GATEWAY_KEY);
    params.insert("sign".to_string(), sign);

    let req = test::TestRequest::post().uri("/callback").set_form(&params).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    assert_eq!(api.fetch_order(&order.order_id).await.unwrap().unwrap().status, OrderStatusType::Pending);
}

#[tokio::test]
async fn unknown_order_gets_a_retryable_failure() {
    let db = new_ledger().await;
    let app = callback_app!(db);

    let mut params: HashMap<String, String> = [
        ("out_trade_no".to_string(), "19990101000000000000".to_string()),
        ("money".to_string(), "10.00".to_string()),
        ("trade_status".to_string(), "TRADE_SUCCESS".to_string()),
    ]
    .into_iter()
    .collect();
    let sign = gateway_sign(&params, GATEWAY_KEY);
    params.insert("sign".to_string(), sign);

    let req = test::TestRequest::post().uri("/callback").set_form(&params).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}
