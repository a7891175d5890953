//! Bus consumer task
//!
//! Drains the event bus and dispatches inbound events to the sync client.
//! Handler failures are logged and counted, and the message is skipped;
//! a single bad event never takes the consumer down.

use std::sync::Arc;

use metrics::counter;
use tracing::{info, warn};

use super::event_bus::SharedEventBus;
use crate::application::sync::SyncService;
use crate::domain::Event;
use crate::shared::shutdown::ShutdownSignal;

pub struct EventConsumer {
    bus: SharedEventBus,
    sync: Arc<SyncService>,
}

impl EventConsumer {
    pub fn new(bus: SharedEventBus, sync: Arc<SyncService>) -> Self {
        Self { bus, sync }
    }

    /// Spawn the consumer loop. Runs until shutdown or bus closure.
    pub fn start(self, shutdown: ShutdownSignal) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut subscriber = self.bus.subscribe();
            info!("Event consumer started");

            loop {
                tokio::select! {
                    received = subscriber.recv() => {
                        match received {
                            Some(event) => self.dispatch(event).await,
                            None => {
                                info!("Event bus closed, consumer stopping");
                                break;
                            }
                        }
                    }
                    _ = shutdown.notified().wait() => {
                        info!("Event consumer shutting down");
                        break;
                    }
                }
            }
        })
    }

    async fn dispatch(&self, event: Event) {
        let event_type = event.event_type();
        let result = match &event {
            Event::EntityCreated(payload) | Event::EntityUpdated(payload) => {
                self.sync.handle_entity_event(payload).await
            }
            Event::EntitySyncResponse(response) => self.sync.handle_sync_response(response).await,
            // Sync requests are answered by the owning service; the
            // remaining families are outward-bound notifications.
            _ => Ok(()),
        };

        if let Err(err) = result {
            warn!(event_type, error = %err, "Event handler failed, message skipped");
            counter!("event_consumer_errors_total", "event_type" => event_type).increment(1);
        }
    }
}
