//! Consumer workers draining the handoff lanes.
//!
//! Each lane is drained by `workers_per_lane` tasks that take turns on its
//! receiver, so messages leave a lane in the order they entered it. What a
//! worker does with a message is up to the [`MessageProcessor`]. Each message
//! is processed in its own task; a panicking processor loses that message
//! (answered with 500 when its handle drops) but never the worker.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::handoff::channel::LaneReceiver;
use crate::ingress::message::InboundMessage;

/// Downstream processing stage.
pub trait MessageProcessor: Send + Sync + 'static {
    /// Handle one message. Answering the client is the processor's job.
    fn process(&self, message: InboundMessage) -> impl Future<Output = ()> + Send;
}

/// Running consumer tasks.
#[derive(Debug)]
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn<P: MessageProcessor>(
        receivers: Vec<LaneReceiver>,
        workers_per_lane: usize,
        processor: Arc<P>,
    ) -> Self {
        let mut handles = Vec::new();
        for receiver in receivers {
            let lane = receiver.index();
            let receiver = Arc::new(Mutex::new(receiver));
            for worker in 0..workers_per_lane.max(1) {
                let receiver = Arc::clone(&receiver);
                let processor = Arc::clone(&processor);
                handles.push(tokio::spawn(async move {
                    tracing::debug!(lane, worker, "Worker started");
                    loop {
                        // Hold the lock only while dequeuing.
                        let next = receiver.lock().await.recv().await;
                        let Some(message) = next else { break };
                        let request_id = message.id();
                        let processor = Arc::clone(&processor);
                        let processing =
                            tokio::spawn(async move { processor.process(message).await });
                        if let Err(e) = processing.await {
                            tracing::error!(lane, worker, request_id = %request_id, error = %e, "Processor failed");
                        }
                    }
                    tracing::debug!(lane, worker, "Worker stopped, lane closed");
                }));
            }
        }
        Self { handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every worker to finish. Workers stop once their lane is closed
    /// and empty, i.e. after the channel and every publisher are dropped.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Worker task failed");
            }
        }
    }
}
