// events/change_bus.rs
//
// Record change signal.
//
// DESIGN PRINCIPLES:
// 1. No payload - subscribers re-query, they never trust event content
// 2. Publish never blocks and never fails
// 3. No replay - late subscribers only see later changes
// 4. Observable - every publish is logged at debug level

use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// Signals buffered per subscriber before the oldest are dropped
///
/// A lagging subscriber only learns that it missed signals, which is all a
/// payload-free signal can tell it anyway.
const CHANNEL_CAPACITY: usize = 64;

/// "Something changed, re-query"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Change;

/// Multicast change signal
///
/// Cloning shares the underlying channel.
#[derive(Debug, Clone)]
pub struct ChangeBus {
    sender: broadcast::Sender<Change>,
}

impl ChangeBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Emit a change to every current subscriber
    ///
    /// With zero subscribers the signal is dropped silently.
    pub fn publish(&self) {
        match self.sender.send(Change) {
            Ok(receivers) => log::debug!("[CHANGE] published to {} subscribers", receivers),
            Err(_) => log::debug!("[CHANGE] published with no subscribers"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Change> {
        self.sender.subscribe()
    }

    /// Subscription as a `Stream`
    ///
    /// Items are `Err(Lagged)` when the subscriber fell behind; treat that
    /// like any other change.
    pub fn changes(&self) -> BroadcastStream<Change> {
        BroadcastStream::new(self.subscribe())
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}
