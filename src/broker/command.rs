//! Administrative commands queued for the poll loop.

use std::collections::VecDeque;

use tokio::sync::oneshot;

/// A `LISTEN`/`UNLISTEN` request that only the poll loop may execute.
#[derive(Debug)]
pub(crate) enum Command {
    /// Start listening; `done` fires once the statement has executed.
    Listen {
        channel: String,
        done: oneshot::Sender<()>,
    },
    /// Stop listening.
    Unlisten { channel: String },
}

/// FIFO of pending commands, drained in full on every wake.
///
/// Once closed, pushes are discarded and the queue stays empty, which
/// fails the registration signal of every discarded `Listen`.
#[derive(Debug)]
pub(crate) struct CommandQueue {
    pending: VecDeque<Command>,
    open: bool,
}

impl CommandQueue {
    pub(crate) fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            open: true,
        }
    }

    /// Enqueues `command`. Returns `false` if the queue is closed.
    pub(crate) fn push(&mut self, command: Command) -> bool {
        if !self.open {
            return false;
        }
        self.pending.push_back(command);
        true
    }

    /// Removes every pending command and reports whether the queue is
    /// still open.
    pub(crate) fn take(&mut self) -> (VecDeque<Command>, bool) {
        (std::mem::take(&mut self.pending), self.open)
    }

    /// Closes the queue. Returns the number of commands discarded.
    pub(crate) fn close(&mut self) -> usize {
        self.open = false;
        let discarded = self.pending.len();
        self.pending.clear();
        discarded
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open
    }
}
