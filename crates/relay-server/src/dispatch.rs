//! The single dispatch loop. Every transport event from every connection is
//! funnelled through one channel and applied to the [`Dispatcher`] in arrival
//! order, so the registry never sees concurrent mutation.

use std::sync::Arc;

use relay_core::{ConnectionId, Dispatcher, InboundEvent};
use relay_telemetry::MetricsRecorder;
use tokio::sync::{mpsc, watch};

use crate::client::ClientRegistry;

/// What the transport layer reports about a connection.
#[derive(Debug)]
pub enum TransportEvent {
    Connected(ConnectionId),
    Frame(ConnectionId, String),
    Disconnected(ConnectionId),
}

/// Run until every sender of `rx` is gone.
pub async fn run_dispatch_loop(
    mut rx: mpsc::Receiver<TransportEvent>,
    mut dispatcher: Dispatcher,
    clients: Arc<ClientRegistry>,
    roster: watch::Sender<Vec<String>>,
    metrics: Arc<MetricsRecorder>,
) {
    while let Some(event) = rx.recv().await {
        let (from, inbound) = match event {
            TransportEvent::Connected(id) => {
                metrics.increment_counter("connections_opened", &[], 1);
                metrics.increment_gauge("connections_active", &[], 1);
                (id, InboundEvent::Connect)
            }
            TransportEvent::Frame(id, text) => match InboundEvent::parse(&text) {
                Ok(inbound) => (id, inbound),
                Err(e) => {
                    tracing::warn!(connection_id = %id, error = %e, "Dropping malformed frame");
                    metrics.increment_counter("frames_rejected", &[("kind", e.error_kind())], 1);
                    continue;
                }
            },
            TransportEvent::Disconnected(id) => {
                metrics.increment_counter("connections_closed", &[], 1);
                metrics.increment_gauge("connections_active", &[], -1);
                (id, InboundEvent::Disconnect)
            }
        };

        metrics.increment_counter("events_received", &[("event", inbound.name())], 1);
        let changes_roster = matches!(
            inbound,
            InboundEvent::Join { .. } | InboundEvent::Disconnect
        );

        let deliveries = dispatcher.dispatch(&from, inbound);

        // Publish the roster before fan-out so observers never lag the clients.
        if changes_roster {
            let names = dispatcher.registry().values();
            roster.send_if_modified(|current| {
                if *current == names {
                    false
                } else {
                    *current = names;
                    true
                }
            });
        }

        for delivery in &deliveries {
            let report = clients.deliver(delivery);
            metrics.observe("fanout_recipients", &[], report.sent as f64);
            if report.dropped > 0 {
                metrics.increment_counter("frames_dropped", &[], report.dropped as u64);
            }
        }
    }
    tracing::info!("Dispatch loop stopped");
}
