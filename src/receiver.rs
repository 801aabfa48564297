//! Receiver interface and the built-in receivers.
//!
//! A [`FrameReceiver`] is called inline from the client's receive loop, so it
//! must return quickly. Receivers are registered into an ordered
//! [`ReceiverSet`]; every receiver sees every event, in registration order.
//!
//! [`WatchReceiver`] bridges the callback interface to async consumers: it
//! publishes into `tokio::sync::watch` channels and hands out a cloneable
//! [`FrameSubscription`] with `Stream`s of frames and model definitions.

use std::fmt;
use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::trace;

use crate::stream::ThrottleExt;
use crate::transport::{Channel, ChannelState};
use crate::types::{FrameSnapshot, ModelDefinition, UpdateRate};

/// Consumer of decoded data.
pub trait FrameReceiver: Send {
    /// A new model definition replaced the previous one.
    fn on_model_definition(&mut self, model: &ModelDefinition);

    /// A frame was decoded.
    fn on_frame_snapshot(&mut self, frame: &FrameSnapshot);

    /// A channel changed state (server identified, channel closed).
    fn on_connection_status(&mut self, _channel: Channel, _state: ChannelState) {}
}

/// Registered receivers, notified in registration order.
#[derive(Default)]
pub struct ReceiverSet {
    receivers: Vec<Box<dyn FrameReceiver>>,
}

impl ReceiverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, receiver: Box<dyn FrameReceiver>) {
        self.receivers.push(receiver);
    }

    pub fn len(&self) -> usize {
        self.receivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receivers.is_empty()
    }

    pub fn model_definition(&mut self, model: &ModelDefinition) {
        for receiver in &mut self.receivers {
            receiver.on_model_definition(model);
        }
    }

    pub fn frame_snapshot(&mut self, frame: &FrameSnapshot) {
        for receiver in &mut self.receivers {
            receiver.on_frame_snapshot(frame);
        }
    }

    pub fn connection_status(&mut self, channel: Channel, state: ChannelState) {
        for receiver in &mut self.receivers {
            receiver.on_connection_status(channel, state);
        }
    }
}

impl fmt::Debug for ReceiverSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceiverSet").field("receivers", &self.receivers.len()).finish()
    }
}

/// Receiver that publishes the latest values into watch channels.
///
/// Dropping it (for example with the client that owns it) ends every stream
/// obtained from its subscriptions.
#[derive(Debug)]
pub struct WatchReceiver {
    frames: watch::Sender<Option<Arc<FrameSnapshot>>>,
    models: watch::Sender<Option<Arc<ModelDefinition>>>,
    status: watch::Sender<(ChannelState, ChannelState)>,
}

impl WatchReceiver {
    /// Create the receiver and its first subscription handle.
    pub fn new() -> (Self, FrameSubscription) {
        let (frames, frame_rx) = watch::channel(None);
        let (models, model_rx) = watch::channel(None);
        let (status, status_rx) =
            watch::channel((ChannelState::Disconnected, ChannelState::Disconnected));
        let subscription = FrameSubscription { frames: frame_rx, models: model_rx, status: status_rx };
        (Self { frames, models, status }, subscription)
    }
}

impl FrameReceiver for WatchReceiver {
    fn on_model_definition(&mut self, model: &ModelDefinition) {
        self.models.send_replace(Some(Arc::new(model.clone())));
    }

    fn on_frame_snapshot(&mut self, frame: &FrameSnapshot) {
        // No subscribers left: skip the copy.
        if self.frames.receiver_count() == 0 {
            trace!(frame = frame.frame_number, "No frame subscribers");
            return;
        }
        self.frames.send_replace(Some(Arc::new(frame.clone())));
    }

    fn on_connection_status(&mut self, channel: Channel, state: ChannelState) {
        self.status.send_modify(|(command, data)| match channel {
            Channel::Command => *command = state,
            Channel::Data => *data = state,
        });
    }
}

/// Cloneable handle onto a [`WatchReceiver`].
#[derive(Debug, Clone)]
pub struct FrameSubscription {
    frames: watch::Receiver<Option<Arc<FrameSnapshot>>>,
    models: watch::Receiver<Option<Arc<ModelDefinition>>>,
    status: watch::Receiver<(ChannelState, ChannelState)>,
}

impl FrameSubscription {
    /// Stream of frames at most at `rate`.
    ///
    /// Slow consumers skip frames rather than queueing them: the stream always
    /// yields the newest frame available.
    pub fn frames(&self, rate: UpdateRate) -> BoxStream<'static, Arc<FrameSnapshot>> {
        let frames = WatchStream::new(self.frames.clone()).filter_map(|opt| async move { opt });

        match rate.throttle_interval() {
            None => frames.boxed(),
            Some(period) => frames.throttle(period).boxed(),
        }
    }

    /// Stream of model definitions, starting with the current one if any.
    pub fn model_definitions(&self) -> BoxStream<'static, Arc<ModelDefinition>> {
        WatchStream::new(self.models.clone()).filter_map(|opt| async move { opt }).boxed()
    }

    pub fn current_frame(&self) -> Option<Arc<FrameSnapshot>> {
        self.frames.borrow().clone()
    }

    pub fn current_model(&self) -> Option<Arc<ModelDefinition>> {
        self.models.borrow().clone()
    }

    /// Last reported `(command, data)` channel states.
    pub fn channel_states(&self) -> (ChannelState, ChannelState) {
        *self.status.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Model(usize),
        Frame(&'static str, i32),
        Status(Channel, ChannelState),
    }

    struct Tagged {
        tag: &'static str,
        log: Arc<Mutex<Vec<Event>>>,
    }

    impl FrameReceiver for Tagged {
        fn on_model_definition(&mut self, model: &ModelDefinition) {
            self.log.lock().unwrap().push(Event::Model(model.rigid_bodies.len()));
        }

        fn on_frame_snapshot(&mut self, frame: &FrameSnapshot) {
            self.log.lock().unwrap().push(Event::Frame(self.tag, frame.frame_number));
        }

        fn on_connection_status(&mut self, channel: Channel, state: ChannelState) {
            self.log.lock().unwrap().push(Event::Status(channel, state));
        }
    }

    struct FramesOnly(usize);

    impl FrameReceiver for FramesOnly {
        fn on_model_definition(&mut self, _model: &ModelDefinition) {}

        fn on_frame_snapshot(&mut self, _frame: &FrameSnapshot) {
            self.0 += 1;
        }
    }

    fn frame(frame_number: i32) -> FrameSnapshot {
        FrameSnapshot { frame_number, ..Default::default() }
    }

    #[test]
    fn receivers_are_notified_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut set = ReceiverSet::new();
        set.push(Box::new(Tagged { tag: "first", log: Arc::clone(&log) }));
        set.push(Box::new(Tagged { tag: "second", log: Arc::clone(&log) }));
        assert_eq!(set.len(), 2);

        set.frame_snapshot(&frame(1));
        set.frame_snapshot(&frame(2));

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                Event::Frame("first", 1),
                Event::Frame("second", 1),
                Event::Frame("first", 2),
                Event::Frame("second", 2),
            ]
        );
    }

    #[test]
    fn status_callback_defaults_to_nothing() {
        let mut set = ReceiverSet::new();
        set.push(Box::new(FramesOnly(0)));
        set.connection_status(Channel::Data, ChannelState::Closed);
        set.model_definition(&ModelDefinition::default());
        set.frame_snapshot(&frame(1));
        assert!(!set.is_empty());
    }

    #[test]
    fn status_and_models_reach_every_receiver() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut set = ReceiverSet::new();
        set.push(Box::new(Tagged { tag: "a", log: Arc::clone(&log) }));
        set.push(Box::new(Tagged { tag: "b", log: Arc::clone(&log) }));

        set.model_definition(&ModelDefinition::default());
        set.connection_status(Channel::Command, ChannelState::Closed);

        let log = log.lock().unwrap();
        assert_eq!(log.iter().filter(|e| **e == Event::Model(0)).count(), 2);
        assert_eq!(
            log.iter()
                .filter(|e| **e == Event::Status(Channel::Command, ChannelState::Closed))
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn watch_receiver_streams_latest_values() {
        let (mut receiver, subscription) = WatchReceiver::new();
        let mut frames = subscription.frames(UpdateRate::Native);
        let mut models = subscription.model_definitions();

        receiver.on_model_definition(&ModelDefinition::default());
        assert!(models.next().await.is_some_and(|model| model.is_empty()));

        receiver.on_frame_snapshot(&frame(7));
        assert_eq!(frames.next().await.map(|f| f.frame_number), Some(7));
        assert_eq!(subscription.current_frame().map(|f| f.frame_number), Some(7));

        receiver.on_connection_status(Channel::Data, ChannelState::Closed);
        assert_eq!(
            subscription.channel_states(),
            (ChannelState::Disconnected, ChannelState::Closed)
        );

        drop(receiver);
        assert!(frames.next().await.is_none());
    }

    #[tokio::test]
    async fn throttled_subscription_skips_to_newest_frame() {
        let (mut receiver, subscription) = WatchReceiver::new();
        let mut frames = subscription.frames(UpdateRate::Max(50));

        for n in 1..=10 {
            receiver.on_frame_snapshot(&frame(n));
        }
        assert_eq!(frames.next().await.map(|f| f.frame_number), Some(10));
        assert_eq!(subscription.current_model(), None);
    }
}
