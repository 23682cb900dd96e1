//! Stateless pub-sub plumbing for lifecycle events.
//!
//! The flow APIs publish claim, status-change and settlement events; subscribers (the
//! notification fan-out, host-supplied hooks) react to them. Handlers receive only the event
//! itself and run on spawned tasks, so a slow or failing handler can never delay or roll back the
//! transition that produced it. Each handler carries a label naming its event stream, so log
//! lines read "claim handler" rather than an anonymous channel.
use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::{sync::mpsc, task::JoinSet};

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    label: &'static str,
    listener: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(label: &'static str, buffer_size: usize, handler: Handler<E>) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size);
        Self { label, listener: receiver, sender, handler }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    /// Runs until every producer is dropped, then waits for the in-flight handler tasks.
    pub async fn start_handler(mut self) {
        debug!("📬️ {} handler listening", self.label);
        // Drop the internal sender so the channel closes once the last producer is gone.
        drop(self.sender);
        let mut in_flight = JoinSet::new();
        loop {
            tokio::select! {
                event = self.listener.recv() => match event {
                    Some(ev) => {
                        trace!("📬️ {} event received", self.label);
                        let handler = Arc::clone(&self.handler);
                        in_flight.spawn(async move { (handler)(ev).await });
                    },
                    None => break,
                },
                Some(finished) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = finished {
                        warn!("📬️ A {} handler task panicked: {e}", self.label);
                    }
                },
            }
        }
        while let Some(finished) = in_flight.join_next().await {
            if let Err(e) = finished {
                warn!("📬️ A {} handler task panicked: {e}", self.label);
            }
        }
        debug!("📬️ {} handler has shut down", self.label);
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    pub async fn publish_event(&self, event: E) {
        if let Err(e) = self.sender.send(event).await {
            error!("📬️ Failed to send event: {e}");
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;

    #[tokio::test]
    async fn event_handler_fans_in_from_multiple_producers() {
        let _ = env_logger::try_init();
        let count = Arc::new(AtomicU64::new(0));
        let c2 = count.clone();
        let handler = Arc::new(move |v| {
            let count = count.clone();
            Box::pin(async move {
                debug!("Handler received {v}");
                let _ = count.fetch_add(v, Ordering::SeqCst);
                tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        let event_handler = EventHandler::new("fan-in", 1, handler);
        let producer_1 = event_handler.subscribe();
        let producer_2 = event_handler.subscribe();
        tokio::spawn(async move {
            for i in 0..5 {
                producer_1.publish_event(i * 2 + 1).await;
            }
        });
        tokio::spawn(async move {
            for i in 0..5 {
                producer_2.publish_event(i * 2).await;
            }
        });

        event_handler.start_handler().await;
        assert_eq!(c2.load(Ordering::SeqCst), 45);
    }

    #[tokio::test]
    async fn shutdown_waits_for_slow_handlers() {
        let done = Arc::new(AtomicU64::new(0));
        let d2 = done.clone();
        let handler = Arc::new(move |_v: u64| {
            let done = done.clone();
            Box::pin(async move {
                tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;
                done.fetch_add(1, Ordering::SeqCst);
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        let event_handler = EventHandler::new("slow", 4, handler);
        let producer = event_handler.subscribe();
        tokio::spawn(async move {
            for i in 0..3 {
                producer.publish_event(i).await;
            }
        });

        // start_handler must not return until every spawned handler has finished.
        event_handler.start_handler().await;
        assert_eq!(d2.load(Ordering::SeqCst), 3);
    }
}
