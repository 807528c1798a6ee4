//! # Broker event fan-out.
//!
//! The broker's listener forwards every bus [`Event`] (connects, rejects,
//! reclamations, sound pool transitions) to a [`SubscriberSet`], which hands
//! it to each subscriber's own lane and returns at once. Broker threads never
//! wait for an audit log or a UI feed.
//!
//! Each lane is a bounded queue drained by one tokio worker, so a subscriber
//! sees events in publish order. A full lane drops the event for that lane
//! only and reports a `SubscriberOverflow` event. A panicking subscriber is
//! caught and reported as `SubscriberPanicked`; its worker keeps draining.
//!
//! ```text
//! Broker listener ─► emit(&Event) ─┬─► [lane: LogWriter] ─► worker ─► on_event()
//!                                  └─► [lane: audit]     ─► worker ─► on_event()
//! ```

use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;

use crate::events::{Bus, Event, EventKind};

use super::Subscribe;

struct Lane {
    name: &'static str,
    tx: mpsc::Sender<Arc<Event>>,
}

/// Delivers broker events to every registered subscriber.
///
/// Workers stop once the set is dropped and their lanes drain.
pub struct SubscriberSet {
    lanes: Vec<Lane>,
    bus: Bus,
}

impl SubscriberSet {
    /// Opens one lane per subscriber and spawns its worker.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let lanes = subs
            .into_iter()
            .map(|sub| Self::open_lane(sub, bus.clone()))
            .collect();
        Self { lanes, bus }
    }

    fn open_lane(sub: Arc<dyn Subscribe>, bus: Bus) -> Lane {
        let name = sub.name();
        let (tx, mut rx) = mpsc::channel::<Arc<Event>>(sub.queue_capacity().max(1));

        tokio::spawn(async move {
            while let Some(ev) = rx.recv().await {
                let delivery = std::panic::AssertUnwindSafe(sub.on_event(&ev)).catch_unwind();
                if let Err(payload) = delivery.await {
                    let info = panic_message(payload.as_ref());
                    tracing::error!(subscriber = name, %info, "subscriber panicked");
                    bus.publish(Event::subscriber_panicked(name, info));
                }
            }
        });

        Lane { name, tx }
    }

    /// Queues `event` on every lane without waiting.
    ///
    /// Overflow of a lane is reported on the bus, except when the dropped event
    /// is itself a subscriber report.
    pub fn emit(&self, event: &Event) {
        let shared = Arc::new(event.clone());
        let report = !matches!(
            event.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        );

        for lane in &self.lanes {
            let reason = match lane.tx.try_send(Arc::clone(&shared)) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            tracing::warn!(
                subscriber = lane.name,
                reason,
                kind = ?event.kind,
                "broker event dropped for subscriber"
            );
            if report {
                self.bus.publish(Event::subscriber_overflow(lane.name, reason));
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
