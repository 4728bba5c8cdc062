//! Per-workflow FIFO command queue. Single producer
//! (external caller), single consumer (the scheduler loop). Commands are
//! buffered in a `Vec` as they're drained so they can be replayed in
//! strict arrival order even when several arrive between two consumption
//! points.

use hypergate_core::Command;
use tokio::sync::mpsc;

pub fn channel() -> (CommandSender, CommandQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (CommandSender(tx), CommandQueue { rx })
}

#[derive(Clone)]
pub struct CommandSender(mpsc::UnboundedSender<Command>);

#[derive(Debug)]
pub struct QueueClosed;

impl CommandSender {
    pub fn send(&self, command: Command) -> Result<(), QueueClosed> {
        self.0.send(command).map_err(|_| QueueClosed)
    }
}

pub struct CommandQueue {
    rx: mpsc::UnboundedReceiver<Command>,
}

impl CommandQueue {
    /// Drains every command currently buffered without blocking, in
    /// arrival order. Called at every layer boundary, before the next
    /// layer starts.
    pub fn drain_available(&mut self) -> Vec<Command> {
        let mut commands = Vec::new();
        while let Ok(command) = self.rx.try_recv() {
            commands.push(command);
        }
        commands
    }

    /// Blocks for the next command (used while `PAUSED_AT_CHECKPOINT` or
    /// `AWAITING_APPROVAL`). Returns `None` once the sender is dropped.
    pub async fn recv(&mut self) -> Option<Command> {
        self.rx.recv().await
    }
}
