//! Dispatch transports for analysis jobs

use async_trait::async_trait;
use redis::Client;
use redis::aio::ConnectionManager;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::domain::{DispatchMessage, JobQueue, JobQueueError};

/// Bounded in-process queue. The receiving half is handed to whatever drains it.
#[derive(Clone)]
pub struct InMemoryJobQueue {
    sender: mpsc::Sender<DispatchMessage>,
}

impl InMemoryJobQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<DispatchMessage>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, message: DispatchMessage) -> Result<(), JobQueueError> {
        // Never block a request on a saturated channel
        self.sender.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => JobQueueError::Full,
            mpsc::error::TrySendError::Closed(_) => JobQueueError::Closed,
        })
    }
}

/// Drain an in-process queue until `shutdown` fires, logging each message.
///
/// Deployments without external analysis workers use this so the channel
/// never fills up. On shutdown the channel is closed and whatever is still
/// buffered is logged before the task exits.
pub fn spawn_dispatch_logger(
    mut receiver: mpsc::Receiver<DispatchMessage>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!("Dispatch logger started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                message = receiver.recv() => match message {
                    Some(message) => log_dispatched(&message),
                    None => break,
                },
            }
        }

        receiver.close();
        let mut drained = 0usize;
        while let Some(message) = receiver.recv().await {
            log_dispatched(&message);
            drained += 1;
        }
        info!(drained, "Dispatch logger stopped");
    })
}

fn log_dispatched(message: &DispatchMessage) {
    info!(
        scan_id = %message.scan_id(),
        message_kind = message.kind(),
        "Dispatched analysis job"
    );
}

/// Dragonfly/Redis list shared with external workers. Messages are pushed
/// as JSON with `LPUSH`; workers pop from the tail.
#[derive(Clone)]
pub struct DragonflyJobQueue {
    connection_manager: ConnectionManager,
    queue_key: String,
}

impl DragonflyJobQueue {
    pub async fn connect(url: &str, queue_key: impl Into<String>) -> Result<Self, JobQueueError> {
        let client = Client::open(url).map_err(|e| {
            error!("Failed to create Redis client: {}", e);
            JobQueueError::Backend(format!("invalid Dragonfly URL: {}", e))
        })?;

        let connection_manager = ConnectionManager::new(client).await.map_err(|e| {
            error!("Failed to create connection manager: {}", e);
            JobQueueError::Backend(format!(
                "Failed to establish connection to the Dragonfly database: {}",
                e
            ))
        })?;

        let mut conn = connection_manager.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| {
                error!("Failed to ping the Dragonfly database: {}", e);
                JobQueueError::Backend(format!("Failed to ping the Dragonfly database: {}", e))
            })?;

        debug!("Successfully connected to the Dragonfly database at {}", url);

        Ok(Self {
            connection_manager,
            queue_key: queue_key.into(),
        })
    }
}

#[async_trait]
impl JobQueue for DragonflyJobQueue {
    async fn enqueue(&self, message: DispatchMessage) -> Result<(), JobQueueError> {
        let mut conn = self.connection_manager.clone();
        let payload = serde_json::to_string(&message)?;

        redis::cmd("LPUSH")
            .arg(&self.queue_key)
            .arg(payload)
            .query_async::<i64>(&mut conn)
            .await
            .map_err(|e| {
                error!("Failed to LPUSH to key {}: {}", self.queue_key, e);
                JobQueueError::Backend(format!("Redis LPUSH error: {}", e))
            })?;

        Ok(())
    }
}
