//! Event stream plumbing. Each workflow gets its own unbounded channel; the
//! sequence is a lazy, finite sequence and not restartable.

use hypergate_core::ExecutionEvent;
use tokio::sync::mpsc;

pub fn channel() -> (EventSender, mpsc::UnboundedReceiver<ExecutionEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender(tx), rx)
}

#[derive(Clone)]
pub struct EventSender(mpsc::UnboundedSender<ExecutionEvent>);

impl EventSender {
    /// Silently drops the event if the receiver has gone away — an
    /// abandoned event stream must never fail execution.
    pub fn emit(&self, event: ExecutionEvent) {
        let _ = self.0.send(event);
    }
}
