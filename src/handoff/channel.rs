//! Bounded queues between connection contexts and consumer workers.
//!
//! # Responsibilities
//! - Own the physical queues ("lanes") completed messages are published into
//! - Bind each connection to one lane for its whole lifetime
//! - Apply the backpressure policy when a lane is full
//!
//! # Design Decisions
//! - Shared mode: a single lane for every connection
//! - Dedicated mode: the lane with the fewest bound connections is picked at bind time
//! - A connection publishes into exactly one lane, so its messages stay in order
//! - A failed publish hands the message back so it can still be answered

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};

use crate::config::{BackpressurePolicy, ChannelConfig};
use crate::ingress::message::{InboundMessage, LaneTag};
use crate::observability::metrics;

/// A message that could not be enqueued, with the reason.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("handoff lane {lane} is full")]
    Full {
        lane: usize,
        message: Box<InboundMessage>,
    },
    #[error("handoff lane {lane} stayed full for {waited:?}")]
    Timeout {
        lane: usize,
        waited: Duration,
        message: Box<InboundMessage>,
    },
    #[error("handoff lane {lane} is closed")]
    Closed {
        lane: usize,
        message: Box<InboundMessage>,
    },
}

impl PublishError {
    /// Short label for logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            PublishError::Full { .. } => "full",
            PublishError::Timeout { .. } => "timeout",
            PublishError::Closed { .. } => "closed",
        }
    }

    /// Take back the message that was not published.
    pub fn into_message(self) -> InboundMessage {
        match self {
            PublishError::Full { message, .. }
            | PublishError::Timeout { message, .. }
            | PublishError::Closed { message, .. } => *message,
        }
    }
}

#[derive(Debug)]
struct Lane {
    index: usize,
    tx: mpsc::Sender<InboundMessage>,
    /// Connections currently publishing into this lane.
    bound: AtomicUsize,
}

/// Process-wide set of handoff lanes.
#[derive(Debug)]
pub struct HandoffChannel {
    lanes: Vec<Arc<Lane>>,
    shared: bool,
    policy: BackpressurePolicy,
    publish_timeout: Duration,
}

impl HandoffChannel {
    /// Build the lanes and return their consuming ends, indexed by lane.
    pub fn new(config: &ChannelConfig) -> (Self, Vec<LaneReceiver>) {
        let lane_count = if config.shared { 1 } else { config.lanes.max(1) };
        let mut lanes = Vec::with_capacity(lane_count);
        let mut receivers = Vec::with_capacity(lane_count);

        for index in 0..lane_count {
            let (tx, rx) = mpsc::channel(config.capacity.max(1));
            lanes.push(Arc::new(Lane {
                index,
                tx,
                bound: AtomicUsize::new(0),
            }));
            receivers.push(LaneReceiver {
                index,
                shared: config.shared,
                rx,
            });
        }

        tracing::info!(
            shared = config.shared,
            lanes = lane_count,
            capacity = config.capacity,
            policy = ?config.backpressure,
            "Handoff channel ready"
        );

        let channel = Self {
            lanes,
            shared: config.shared,
            policy: config.backpressure,
            publish_timeout: Duration::from_millis(config.publish_timeout_ms),
        };
        (channel, receivers)
    }

    /// Bind a connection to a lane. The binding ends when the publisher drops.
    pub fn bind(&self) -> Publisher {
        // In case of tie, the first lane is selected (stability)
        let lane = self
            .lanes
            .iter()
            .min_by_key(|lane| lane.bound.load(Ordering::Relaxed))
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.lanes[0]));
        lane.bound.fetch_add(1, Ordering::Relaxed);

        Publisher {
            lane,
            shared: self.shared,
            policy: self.policy,
            publish_timeout: self.publish_timeout,
        }
    }

    pub fn is_shared(&self) -> bool {
        self.shared
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// Connections currently bound to `lane`.
    pub fn bound_connections(&self, lane: usize) -> usize {
        self.lanes
            .get(lane)
            .map(|lane| lane.bound.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Messages waiting in `lane`.
    pub fn depth(&self, lane: usize) -> usize {
        self.lanes
            .get(lane)
            .map(|lane| lane.tx.max_capacity() - lane.tx.capacity())
            .unwrap_or(0)
    }
}

/// Producer side of one lane, owned by one connection.
#[derive(Debug)]
pub struct Publisher {
    lane: Arc<Lane>,
    shared: bool,
    policy: BackpressurePolicy,
    publish_timeout: Duration,
}

impl Publisher {
    pub fn lane(&self) -> usize {
        self.lane.index
    }

    /// Publish according to the configured policy.
    ///
    /// `block` waits for room at most `publish_timeout_ms`; `reject` never waits.
    pub async fn publish(&self, message: InboundMessage) -> Result<(), PublishError> {
        match self.policy {
            BackpressurePolicy::Reject => self.try_publish(message),
            BackpressurePolicy::Block => {
                let message = self.tag(message);
                let lane = self.lane.index;
                match self.lane.tx.send_timeout(message, self.publish_timeout).await {
                    Ok(()) => {
                        metrics::record_published(self.shared);
                        Ok(())
                    }
                    Err(SendTimeoutError::Timeout(message)) => Err(PublishError::Timeout {
                        lane,
                        waited: self.publish_timeout,
                        message: Box::new(message),
                    }),
                    Err(SendTimeoutError::Closed(message)) => Err(PublishError::Closed {
                        lane,
                        message: Box::new(message),
                    }),
                }
            }
        }
    }

    /// Publish without waiting, whatever the configured policy.
    pub fn try_publish(&self, message: InboundMessage) -> Result<(), PublishError> {
        let message = self.tag(message);
        let lane = self.lane.index;
        match self.lane.tx.try_send(message) {
            Ok(()) => {
                metrics::record_published(self.shared);
                Ok(())
            }
            Err(TrySendError::Full(message)) => Err(PublishError::Full {
                lane,
                message: Box::new(message),
            }),
            Err(TrySendError::Closed(message)) => Err(PublishError::Closed {
                lane,
                message: Box::new(message),
            }),
        }
    }

    fn tag(&self, mut message: InboundMessage) -> InboundMessage {
        message.set_lane(LaneTag {
            index: self.lane.index,
            shared: self.shared,
        });
        message
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        self.lane.bound.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Consumer side of one lane.
#[derive(Debug)]
pub struct LaneReceiver {
    index: usize,
    shared: bool,
    rx: mpsc::Receiver<InboundMessage>,
}

impl LaneReceiver {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_shared(&self) -> bool {
        self.shared
    }

    /// Next message, or `None` once every publisher and the channel are gone.
    pub async fn recv(&mut self) -> Option<InboundMessage> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<InboundMessage> {
        self.rx.try_recv().ok()
    }
}
