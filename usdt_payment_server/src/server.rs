use std::time::Duration;

use actix_web::{dev::Service, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use futures::future::{ok, FutureExt};
use log::*;
use tokio::sync::watch;
use usdt_payment_engine::{
    events::{EventHandlers, EventHooks, EventProducers},
    AgentApi,
    OrderFlowApi,
    RescanApi,
    SqliteLedger,
};

use crate::{
    chain_watcher::start_chain_watcher,
    config::ServerConfig,
    errors::ServerError,
    expiry_worker::start_expiry_worker,
    gateway_routes::{gateway_callback_get, gateway_callback_post},
    integrations::TronGridFeed,
    routes::{
        approve_withdrawal,
        health,
        list_withdrawals,
        mark_withdrawal_paid,
        order_stats,
        reject_withdrawal,
        rescan_order,
        rescan_txid,
    },
};

const EVENT_BUFFER_SIZE: usize = 100;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    run_server_with_hooks(config, EventHooks::default()).await
}

/// Constructs the ledger, wires the event hooks, starts the background workers and runs the
/// HTTP server until it exits. On exit the workers are signalled and allowed to finish their
/// current iteration before this function returns.
pub async fn run_server_with_hooks(config: ServerConfig, hooks: EventHooks) -> Result<(), ServerError> {
    let db = SqliteLedger::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.migrate().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;

    let handlers = EventHandlers::new(EVENT_BUFFER_SIZE, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let watcher_handle = if config.watcher.deposit_address.is_empty() {
        warn!("🚀️ No deposit address configured. The chain watcher will not be started.");
        None
    } else {
        let feed = TronGridFeed::new(config.watcher.clone())
            .map_err(|e| ServerError::InitializeError(e.to_string()))?;
        Some(start_chain_watcher(
            db.clone(),
            producers.clone(),
            feed,
            config.watcher.clone(),
            shutdown_rx.clone(),
        ))
    };
    let reaper_handle = start_expiry_worker(db.clone(), producers.clone(), config.reaper_interval, shutdown_rx);

    let result = match create_server_instance(config, db, producers) {
        Ok(srv) => srv.await.map_err(|e| ServerError::Unspecified(e.to_string())),
        Err(e) => Err(e),
    };
    info!("🚀️ Server loop ended. Stopping background workers");
    let _ = shutdown_tx.send(true);
    if let Some(handle) = watcher_handle {
        let _ = handle.await;
    }
    let _ = reaper_handle.await;
    result
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteLedger,
    producers: EventProducers,
) -> Result<actix_web::dev::Server, ServerError> {
    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        let orders_api = OrderFlowApi::new(db.clone(), producers.clone());
        let agent_api = AgentApi::new(db.clone(), producers.clone());
        let rescan_api = RescanApi::new(OrderFlowApi::new(db.clone(), producers.clone()));
        let admin_token = config.admin_token.reveal().clone();
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("upg::access_log"))
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(orders_api))
            .app_data(web::Data::new(agent_api))
            .app_data(web::Data::new(rescan_api));
        let admin_scope = web::scope("/admin")
            .wrap_fn(move |req, srv| {
                let authorized = !admin_token.is_empty()
                    && req
                        .headers()
                        .get("Authorization")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.strip_prefix("Bearer "))
                        .map(|t| t == admin_token)
                        .unwrap_or(false);
                if authorized {
                    srv.call(req).left_future()
                } else {
                    warn!("💻️ Rejecting unauthorised admin request to {}", req.path());
                    ok(req.error_response(ServerError::Unauthorized)).right_future()
                }
            })
            .service(rescan_txid)
            .service(rescan_order)
            .service(order_stats)
            .service(list_withdrawals)
            .service(approve_withdrawal)
            .service(reject_withdrawal)
            .service(mark_withdrawal_paid);
        app.service(health).service(gateway_callback_get).service(gateway_callback_post).service(admin_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}
