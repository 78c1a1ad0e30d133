use psmon_core::event::{EventSink, MonitorEvent};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// An [`EventSink`] that records every notification.
#[derive(Clone, Debug, Default)]
pub struct RecordingEventSink {
    events: Arc<Mutex<Vec<MonitorEvent>>>,
}

impl RecordingEventSink {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded events, in emission order.
    pub fn events(&self) -> Vec<MonitorEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The names of all recorded events, in emission order.
    pub fn names(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(MonitorEvent::name)
            .collect()
    }

    /// How many recorded events have the given name.
    pub fn count(&self, name: &str) -> usize {
        self.names().into_iter().filter(|n| *n == name).count()
    }

    /// Forgets every recorded event.
    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Polls until `predicate` holds for the recorded events or `timeout` elapses.
    ///
    /// Returns whether the predicate was satisfied.
    pub async fn wait_for<F>(&self, timeout: Duration, predicate: F) -> bool
    where
        F: Fn(&[MonitorEvent]) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if predicate(&self.events()) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Waits until at least `count` events named `name` were recorded.
    pub async fn wait_for_count(&self, name: &str, count: usize, timeout: Duration) -> bool {
        self.wait_for(timeout, |events| {
            events.iter().filter(|e| e.name() == name).count() >= count
        })
        .await
    }
}

impl EventSink for RecordingEventSink {
    fn notify(&self, event: MonitorEvent) {
        log::debug!("Recorded '{}' notification", event.name());
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
