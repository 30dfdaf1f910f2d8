//! Isolated in-process listener dispatch
//!
//! Stores and the party registry notify listeners synchronously after a
//! mutation has been committed and the store lock released. A listener that
//! fails or panics is logged and skipped; it never fails the mutation and
//! never prevents later listeners from running.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{error, warn};

/// Failure reported by a listener
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ListenerError(pub String);

impl ListenerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub type ListenerResult = Result<(), ListenerError>;

/// Receiver of change notifications of type `E`
pub trait Listener<E>: Send + Sync {
    fn on_event(&self, event: &E) -> ListenerResult;
}

impl<E, F> Listener<E> for F
where
    F: Fn(&E) -> ListenerResult + Send + Sync,
{
    fn on_event(&self, event: &E) -> ListenerResult {
        self(event)
    }
}

/// Subscriber list for one event type
pub struct Listeners<E> {
    inner: RwLock<Vec<Arc<dyn Listener<E>>>>,
}

impl<E> Listeners<E> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, listener: impl Listener<E> + 'static) {
        self.inner.write().push(Arc::new(listener));
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `event` to every listener, best effort
    pub fn dispatch(&self, source: &'static str, event: &E) {
        // Snapshot so a listener may subscribe others without deadlocking
        let listeners: Vec<_> = self.inner.read().iter().cloned().collect();

        for (index, listener) in listeners.iter().enumerate() {
            match panic::catch_unwind(AssertUnwindSafe(|| listener.on_event(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(source, listener = index, error = %e, "Listener failed");
                }
                Err(payload) => {
                    let message = payload
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "non-string panic payload".to_string());
                    error!(source, listener = index, panic = %message, "Listener panicked");
                }
            }
        }
    }
}

impl<E> Default for Listeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn failing_listener_does_not_stop_dispatch() {
        let listeners: Listeners<u32> = Listeners::new();
        let seen = Arc::new(AtomicUsize::new(0));

        listeners.subscribe(|_: &u32| -> ListenerResult { Err(ListenerError::new("boom")) });
        listeners.subscribe(|_: &u32| -> ListenerResult { panic!("listener panic") });
        let counter = seen.clone();
        listeners.subscribe(move |value: &u32| -> ListenerResult {
            counter.fetch_add(*value as usize, Ordering::SeqCst);
            Ok(())
        });

        listeners.dispatch("test", &5);
        assert_eq!(seen.load(Ordering::SeqCst), 5);
        assert_eq!(listeners.len(), 3);
    }

    #[test]
    fn no_listeners_is_a_no_op() {
        let listeners: Listeners<String> = Listeners::default();
        assert!(listeners.is_empty());
        listeners.dispatch("test", &"event".to_string());
    }
}
