use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use super::Command;
use crate::errors::{LauncherError, Result};

#[derive(Debug)]
pub struct QueuedCommand {
    pub id: Uuid,
    pub command: Command,
}

/// Whatever the worker hands dequeued commands to.
#[async_trait]
pub trait CommandTarget: Send + Sync {
    async fn execute(&self, command: Command) -> Result<()>;
}

#[derive(Clone)]
pub struct CommandQueue {
    sender: mpsc::Sender<QueuedCommand>,
}

impl CommandQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<QueuedCommand>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Never waits: a full queue is reported back to the caller.
    pub fn enqueue(&self, command: Command) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let name = command.name();
        match self.sender.try_send(QueuedCommand { id, command }) {
            Ok(()) => {
                tracing::debug!("queued command {} ({})", name, id);
                Ok(id)
            }
            Err(TrySendError::Full(_)) => {
                tracing::warn!("command queue full, dropping {}", name);
                Err(LauncherError::Queue(format!("queue full, {name} not accepted")))
            }
            Err(TrySendError::Closed(_)) => {
                Err(LauncherError::Queue("command worker has stopped".to_string()))
            }
        }
    }

    pub async fn enqueue_wait(&self, command: Command) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.sender
            .send(QueuedCommand { id, command })
            .await
            .map_err(|_| LauncherError::Queue("command worker has stopped".to_string()))?;
        Ok(id)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn run_one<T: CommandTarget + ?Sized>(target: &T, queued: QueuedCommand) {
    let QueuedCommand { id, command } = queued;
    let name = command.name();
    match AssertUnwindSafe(target.execute(command)).catch_unwind().await {
        Ok(Ok(())) => tracing::debug!("command {} ({}) done", name, id),
        Ok(Err(err)) => tracing::error!("command {} ({}) failed: {}", name, id, err),
        Err(panic) => tracing::error!(
            "command {} ({}) panicked: {}",
            name,
            id,
            panic_message(panic.as_ref())
        ),
    }
}

/// Drains `receiver` one command at a time until cancelled.
pub async fn run_worker<T: CommandTarget + ?Sized>(
    target: Arc<T>,
    mut receiver: mpsc::Receiver<QueuedCommand>,
    mut cancel: watch::Receiver<bool>,
) {
    loop {
        if *cancel.borrow() {
            break;
        }
        let next = tokio::select! {
            biased;
            _ = cancel.changed() => break,
            next = receiver.recv() => next,
        };
        let Some(queued) = next else { break };
        run_one(target.as_ref(), queued).await;
    }

    receiver.close();
    let mut discarded = 0usize;
    while let Ok(queued) = receiver.try_recv() {
        tracing::debug!("discarding {} ({}) on shutdown", queued.command.name(), queued.id);
        discarded += 1;
    }
    if discarded > 0 {
        tracing::warn!("command worker stopped with {} pending commands", discarded);
    }
    tracing::info!("command worker stopped");
}
