//! # Change Coalescer
//!
//! Bounds the rate of live-mode emissions. The first value of a burst opens
//! a window; values arriving inside it replace the buffered one; when the
//! window closes the latest value is delivered (trailing edge only, never
//! leading). Errors are not buffered and pass straight through.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, Instant};

/// Trailing-edge throttle between the resolver and the caller's stream
#[derive(Debug, Clone, Copy)]
pub struct Coalescer {
    window: Duration,
}

impl Coalescer {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Runs until `input` closes or `output` is dropped. A value still
    /// buffered when `input` closes is flushed immediately.
    ///
    /// An error for which `terminal` returns true is forwarded and ends the
    /// run; any buffered value is discarded so the error is the last item.
    pub async fn run<T, E>(
        self,
        mut input: mpsc::UnboundedReceiver<Result<T, E>>,
        output: mpsc::UnboundedSender<Result<T, E>>,
        terminal: impl Fn(&E) -> bool,
    ) {
        loop {
            let mut latest = match input.recv().await {
                Some(Ok(value)) => value,
                Some(Err(err)) => {
                    let stop = terminal(&err);
                    if output.send(Err(err)).is_err() || stop {
                        return;
                    }
                    continue;
                }
                None => return,
            };

            let deadline = Instant::now() + self.window;
            let mut closed = false;
            loop {
                tokio::select! {
                    _ = time::sleep_until(deadline) => break,
                    next = input.recv() => match next {
                        Some(Ok(value)) => latest = value,
                        Some(Err(err)) => {
                            let stop = terminal(&err);
                            if output.send(Err(err)).is_err() || stop {
                                return;
                            }
                        }
                        None => {
                            closed = true;
                            break;
                        }
                    },
                }
            }

            if output.send(Ok(latest)).is_err() || closed {
                return;
            }
        }
    }
}
