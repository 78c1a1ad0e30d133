//! This module defines the `StreamWorker`, a supervised background task that pulls messages
//! from one subscription into its [`MessageBuffer`].
//!
//! A worker is either stopped (no task) or running (exactly one task). [`StreamWorker::stop`]
//! cancels the task and waits for it to exit, so once it returns nothing else is appended to
//! the buffer and the subscription can be deleted safely.

use crate::buffer::MessageBuffer;
use crate::client::{MessagingClient, PullSession};
use crate::error::MonitorError;
use crate::event::{EventSink, MonitorEvent};
use crate::message::{AckMode, Message, ReceivedMessage};
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Called when a worker's pull session fails and its task exits on its own.
///
/// The `generation` identifies the worker instance, so a handler can tell a failed worker
/// apart from a newer one started for the same subscription.
#[async_trait]
pub trait WorkerExitHandler: Send + Sync {
    /// Reacts to a worker that stopped because of a stream failure.
    async fn on_worker_failed(&self, subscription_id: &str, generation: Uuid);
}

/// The spawned task and the token that cancels it.
struct RunningTask {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Everything the background task needs, shared with the owning worker.
#[derive(Clone)]
struct WorkerContext {
    subscription_id: String,
    generation: Uuid,
    buffer: Arc<MessageBuffer>,
    auto_ack: Arc<AtomicBool>,
    client: Arc<dyn MessagingClient>,
    sink: Arc<dyn EventSink>,
    exit_handler: Option<Arc<dyn WorkerExitHandler>>,
}

/// Pulls messages from one subscription and buffers them.
pub struct StreamWorker {
    context: WorkerContext,
    state: Mutex<Option<RunningTask>>,
}

impl StreamWorker {
    /// Creates a stopped worker.
    pub fn new(
        subscription_id: impl Into<String>,
        buffer: MessageBuffer,
        ack_mode: AckMode,
        client: Arc<dyn MessagingClient>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            context: WorkerContext {
                subscription_id: subscription_id.into(),
                generation: Uuid::new_v4(),
                buffer: Arc::new(buffer),
                auto_ack: Arc::new(AtomicBool::new(ack_mode.is_auto())),
                client,
                sink,
                exit_handler: None,
            },
            state: Mutex::new(None),
        }
    }

    /// Registers the handler notified when the pull session fails.
    pub fn with_exit_handler(mut self, handler: Arc<dyn WorkerExitHandler>) -> Self {
        self.context.exit_handler = Some(handler);
        self
    }

    /// The subscription this worker pulls from.
    pub fn subscription_id(&self) -> &str {
        &self.context.subscription_id
    }

    /// Unique id of this worker instance.
    pub fn generation(&self) -> Uuid {
        self.context.generation
    }

    /// The buffer this worker appends to.
    pub fn buffer(&self) -> &MessageBuffer {
        &self.context.buffer
    }

    /// The current acknowledgment mode.
    pub fn ack_mode(&self) -> AckMode {
        if self.context.auto_ack.load(Ordering::Acquire) {
            AckMode::Auto
        } else {
            AckMode::Manual
        }
    }

    /// Changes the acknowledgment mode. Applies to the next received message.
    pub fn set_ack_mode(&self, mode: AckMode) {
        self.context
            .auto_ack
            .store(mode.is_auto(), Ordering::Release);
        debug!(
            "Ack mode for '{}' set to {}",
            self.context.subscription_id, mode
        );
    }

    /// Whether the background task is alive.
    pub async fn is_running(&self) -> bool {
        let state = self.state.lock().await;
        state
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// Spawns the pull task and returns immediately.
    ///
    /// The pull session is opened by the task itself; failures to open it are reported as a
    /// monitor error notification, like any other stream failure.
    pub async fn start(&self) -> Result<(), MonitorError> {
        let mut state = self.state.lock().await;
        if state.is_some() {
            return Err(MonitorError::WorkerAlreadyRunning(
                self.context.subscription_id.clone(),
            ));
        }

        let cancel = CancellationToken::new();
        let context = self.context.clone();
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            pull_loop(context, task_cancel).await;
        });

        *state = Some(RunningTask { handle, cancel });
        debug!(
            "Started stream worker {} for '{}'",
            self.context.generation, self.context.subscription_id
        );
        Ok(())
    }

    /// Cancels the pull task and waits for it to exit.
    ///
    /// Fails if the worker was never started or was already stopped.
    pub async fn stop(&self) -> Result<(), MonitorError> {
        let running = {
            let mut state = self.state.lock().await;
            state.take()
        };

        let Some(RunningTask { handle, cancel }) = running else {
            return Err(MonitorError::WorkerNotRunning(
                self.context.subscription_id.clone(),
            ));
        };

        cancel.cancel();
        handle.await.map_err(|e| {
            MonitorError::WorkerPanicked(self.context.subscription_id.clone(), e.to_string())
        })?;

        debug!(
            "Stream worker {} for '{}' exited",
            self.context.generation, self.context.subscription_id
        );
        Ok(())
    }
}

impl std::fmt::Debug for StreamWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamWorker")
            .field("subscription_id", &self.context.subscription_id)
            .field("generation", &self.context.generation)
            .field("ack_mode", &self.ack_mode())
            .finish()
    }
}

impl Drop for StreamWorker {
    fn drop(&mut self) {
        // A discarded worker must not keep pulling.
        if let Some(running) = self.state.get_mut().take() {
            running.cancel.cancel();
        }
    }
}

async fn pull_loop(context: WorkerContext, cancel: CancellationToken) {
    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        opened = context.client.open_pull(&context.subscription_id) => opened,
    };

    let mut session: PullSession = match opened {
        Ok(session) => session,
        Err(e) => {
            context
                .fail(format!("Failed to open pull session: {e}"))
                .await;
            return;
        }
    };
    info!("Pull session open for '{}'", context.subscription_id);

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Cancellation observed for '{}'", context.subscription_id);
                return;
            }
            next = session.next() => next,
        };

        match next {
            Some(Ok(received)) => context.handle_message(received).await,
            Some(Err(e)) => {
                context.fail(format!("Pull session failed: {e}")).await;
                return;
            }
            None => {
                context
                    .fail("Pull session closed by the service".to_string())
                    .await;
                return;
            }
        }
    }
}

impl WorkerContext {
    async fn handle_message(&self, received: ReceivedMessage) {
        let message = Message::from_received(&received, Utc::now());
        debug!(
            "Received message {} on '{}'",
            message.id, self.subscription_id
        );

        self.buffer.append(message.clone()).await;
        self.sink.notify(MonitorEvent::MessageReceived {
            subscription_id: self.subscription_id.clone(),
            message,
        });

        if self.auto_ack.load(Ordering::Acquire) {
            if let Err(e) = self
                .client
                .acknowledge(&self.subscription_id, &received.ack_id)
                .await
            {
                // The message will be redelivered after its deadline; keep pulling.
                warn!(
                    "Failed to acknowledge message {} on '{}': {}",
                    received.id, self.subscription_id, e
                );
            }
        }
    }

    async fn fail(&self, reason: String) {
        error!("Monitor for '{}' stopped: {}", self.subscription_id, reason);
        self.sink.notify(MonitorEvent::MonitorError {
            subscription_id: self.subscription_id.clone(),
            error: reason,
        });
        if let Some(handler) = &self.exit_handler {
            handler
                .on_worker_failed(&self.subscription_id, self.generation)
                .await;
        }
    }
}
