//! Observer that records every lifecycle event it sees.

use std::sync::{Arc, Mutex, PoisonError};

use httpframe::{Connection, ConnectionObserver, ConnectionState, Exchange, LifecycleEvent};

/// Records the states and configured exchanges reported to it.
pub struct RecordingObserver<C: Connection> {
    states: Mutex<Vec<ConnectionState>>,
    exchanges: Mutex<Vec<Arc<Exchange<C>>>>,
}

impl<C: Connection> RecordingObserver<C> {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            states: Mutex::new(Vec::new()),
            exchanges: Mutex::new(Vec::new()),
        })
    }

    /// States in the order they were reported.
    pub fn states(&self) -> Vec<ConnectionState> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Exchanges reported as configured, oldest first.
    pub fn exchanges(&self) -> Vec<Arc<Exchange<C>>> {
        self.exchanges.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// The most recently configured exchange.
    pub fn last_exchange(&self) -> Option<Arc<Exchange<C>>> {
        self.exchanges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

impl<C: Connection> ConnectionObserver<C> for RecordingObserver<C> {
    fn on_state_change(&self, event: LifecycleEvent<C>) {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.state());
        if let LifecycleEvent::Configured(exchange) = event {
            self.exchanges
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(exchange);
        }
    }
}
