use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{ClaimEvent, EventHandler, EventProducer, Handler, SettlementEvent, StatusChangedEvent};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub claim_producer: Vec<EventProducer<ClaimEvent>>,
    pub status_changed_producer: Vec<EventProducer<StatusChangedEvent>>,
    pub settlement_producer: Vec<EventProducer<SettlementEvent>>,
}

pub struct EventHandlers {
    pub on_claim: Option<EventHandler<ClaimEvent>>,
    pub on_status_changed: Option<EventHandler<StatusChangedEvent>>,
    pub on_settlement: Option<EventHandler<SettlementEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_claim = hooks.on_claim.map(|f| EventHandler::new("claim", buffer_size, f));
        let on_status_changed = hooks.on_status_changed.map(|f| EventHandler::new("status change", buffer_size, f));
        let on_settlement = hooks.on_settlement.map(|f| EventHandler::new("settlement", buffer_size, f));
        Self { on_claim, on_status_changed, on_settlement }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_claim {
            result.claim_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_status_changed {
            result.status_changed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_settlement {
            result.settlement_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_claim {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_status_changed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_settlement {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_claim: Option<Handler<ClaimEvent>>,
    pub on_status_changed: Option<Handler<StatusChangedEvent>>,
    pub on_settlement: Option<Handler<SettlementEvent>>,
}

impl EventHooks {
    pub fn on_claim<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(ClaimEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_claim = Some(Arc::new(f));
        self
    }

    pub fn on_status_changed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(StatusChangedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_status_changed = Some(Arc::new(f));
        self
    }

    pub fn on_settlement<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(SettlementEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_settlement = Some(Arc::new(f));
        self
    }
}
