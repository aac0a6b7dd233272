//! Graceful shutdown handling
//!
//! Broadcast-based stop signal shared between a prefetch consumer and its
//! producer.

use std::sync::Arc;
use tokio::sync::broadcast;

/// Shutdown signal broadcaster
///
/// Receivers only observe signals sent after they subscribed.
pub struct ShutdownSignal {
    sender: Arc<broadcast::Sender<()>>,
}

impl ShutdownSignal {
    /// Create a new shutdown signal
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Trigger shutdown
    pub fn shutdown(&self) {
        let _ = self.sender.send(());
    }

    /// Create a new receiver for this signal
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }

    /// Number of producers still listening
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Clone for ShutdownSignal {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    #[test]
    fn test_polled_between_batches() {
        let signal = ShutdownSignal::new();
        let mut receiver = signal.subscribe();
        assert!(matches!(receiver.try_recv(), Err(TryRecvError::Empty)));

        signal.clone().shutdown();
        assert!(receiver.try_recv().is_ok());
    }

    #[test]
    fn test_receiver_count() {
        let signal = ShutdownSignal::default();
        assert_eq!(signal.receiver_count(), 0);
        let receiver = signal.subscribe();
        assert_eq!(signal.receiver_count(), 1);
        drop(receiver);
        assert_eq!(signal.receiver_count(), 0);
    }
}
