use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    EventHandler,
    EventProducer,
    Handler,
    OrderCreditedEvent,
    OrderExpiredEvent,
    WithdrawalStateChangedEvent,
};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_credited_producer: Vec<EventProducer<OrderCreditedEvent>>,
    pub order_expired_producer: Vec<EventProducer<OrderExpiredEvent>>,
    pub withdrawal_producer: Vec<EventProducer<WithdrawalStateChangedEvent>>,
}

pub struct EventHandlers {
    pub on_order_credited: Option<EventHandler<OrderCreditedEvent>>,
    pub on_order_expired: Option<EventHandler<OrderExpiredEvent>>,
    pub on_withdrawal_state_changed: Option<EventHandler<WithdrawalStateChangedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_order_credited = hooks.on_order_credited.map(|f| EventHandler::new(buffer_size, f));
        let on_order_expired = hooks.on_order_expired.map(|f| EventHandler::new(buffer_size, f));
        let on_withdrawal_state_changed =
            hooks.on_withdrawal_state_changed.map(|f| EventHandler::new(buffer_size, f));
        Self { on_order_credited, on_order_expired, on_withdrawal_state_changed }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_credited {
            result.order_credited_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_expired {
            result.order_expired_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_withdrawal_state_changed {
            result.withdrawal_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_order_credited {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_order_expired {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_withdrawal_state_changed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_credited: Option<Handler<OrderCreditedEvent>>,
    pub on_order_expired: Option<Handler<OrderExpiredEvent>>,
    pub on_withdrawal_state_changed: Option<Handler<WithdrawalStateChangedEvent>>,
}

impl EventHooks {
    pub fn on_order_credited<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderCreditedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_credited = Some(Arc::new(f));
        self
    }

    pub fn on_order_expired<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderExpiredEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_expired = Some(Arc::new(f));
        self
    }

    pub fn on_withdrawal_state_changed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(WithdrawalStateChangedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_withdrawal_state_changed = Some(Arc::new(f));
        self
    }
}
