use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{EventHandler, EventProducer, Handler, OrderExpiredEvent, OrderPaidEvent, PaymentUnmatchedEvent};

type BoxedFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_paid_producer: Vec<EventProducer<OrderPaidEvent>>,
    pub order_expired_producer: Vec<EventProducer<OrderExpiredEvent>>,
    pub payment_unmatched_producer: Vec<EventProducer<PaymentUnmatchedEvent>>,
}

pub struct EventHandlers {
    pub on_order_paid: Option<EventHandler<OrderPaidEvent>>,
    pub on_order_expired: Option<EventHandler<OrderExpiredEvent>>,
    pub on_payment_unmatched: Option<EventHandler<PaymentUnmatchedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_order_paid = hooks.on_order_paid.map(|f| EventHandler::new(buffer_size, f));
        let on_order_expired = hooks.on_order_expired.map(|f| EventHandler::new(buffer_size, f));
        let on_payment_unmatched = hooks.on_payment_unmatched.map(|f| EventHandler::new(buffer_size, f));
        Self { on_order_paid, on_order_expired, on_payment_unmatched }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_paid {
            result.order_paid_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_expired {
            result.order_expired_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_payment_unmatched {
            result.payment_unmatched_producer.push(handler.subscribe());
        }
        result
    }

    pub fn start_handlers(self) {
        if let Some(handler) = self.on_order_paid {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_order_expired {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_payment_unmatched {
            tokio::spawn(handler.start_handler());
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_paid: Option<Handler<OrderPaidEvent>>,
    pub on_order_expired: Option<Handler<OrderExpiredEvent>>,
    pub on_payment_unmatched: Option<Handler<PaymentUnmatchedEvent>>,
}

impl EventHooks {
    pub fn on_order_paid<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderPaidEvent) -> BoxedFuture) + Send + Sync + 'static {
        self.on_order_paid = Some(Arc::new(f));
        self
    }

    pub fn on_order_expired<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderExpiredEvent) -> BoxedFuture) + Send + Sync + 'static {
        self.on_order_expired = Some(Arc::new(f));
        self
    }

    pub fn on_payment_unmatched<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PaymentUnmatchedEvent) -> BoxedFuture) + Send + Sync + 'static {
        self.on_payment_unmatched = Some(Arc::new(f));
        self
    }
}
