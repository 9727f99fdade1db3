//! Text spinner shown while a long operation runs.
//!
//! The spinner is a background task that redraws one status line until it is
//! cancelled. [`supervise`] wraps a future with a spinner and always stops and
//! joins the spinner before handing back the future's output.
//!
//! [`ThreadSpinner`] and [`supervise_blocking`] are the same contract for
//! callers that block their own thread: the spinner draws from a dedicated OS
//! thread, which is signalled and joined on stop.

use std::future::Future;
use std::io::Write;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Delay between frames
pub const FRAME_INTERVAL: Duration = Duration::from_millis(100);

const FRAMES: [char; 4] = ['|', '/', '-', '\\'];

/// Handle to a running spinner
pub struct Spinner {
    cancel: CancellationToken,
    handle: JoinHandle<usize>,
}

impl Spinner {
    /// Start drawing `<frame> <message>` on `out`
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(message: impl Into<String>, out: Box<dyn Write + Send>) -> Self {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(spin(message.into(), out, cancel.clone()));
        Self { cancel, handle }
    }

    /// Stop the spinner, clear its line and wait for the task to exit
    ///
    /// Returns the number of frames drawn.
    pub async fn stop(self) -> usize {
        self.cancel.cancel();
        match self.handle.await {
            Ok(frames) => frames,
            Err(e) => {
                tracing::warn!(error = %e, "Spinner task failed");
                0
            }
        }
    }
}

async fn spin(
    message: String,
    mut out: Box<dyn Write + Send>,
    cancel: CancellationToken,
) -> usize {
    let mut frames = 0;
    for frame in FRAMES.iter().cycle() {
        if draw(&mut out, *frame, &message).is_err() {
            break;
        }
        frames += 1;

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(FRAME_INTERVAL) => {}
        }
    }

    clear_line(&mut out, &message);
    frames
}

fn draw(out: &mut dyn Write, frame: char, message: &str) -> std::io::Result<()> {
    write!(out, "\r{frame} {message}")?;
    out.flush()
}

fn clear_line(out: &mut dyn Write, message: &str) {
    // Width of "<frame> <message>"
    let blank = " ".repeat(message.chars().count() + 2);
    write!(out, "\r{blank}\r").and_then(|()| out.flush()).ok();
}

/// Run `fut` with a spinner on `out`
///
/// The spinner is stopped and joined before the output is returned, so
/// nothing else is written to `out` afterwards.
pub async fn supervise<F>(
    message: impl Into<String>,
    out: Box<dyn Write + Send>,
    fut: F,
) -> F::Output
where
    F: Future,
{
    let spinner = Spinner::start(message, out);
    let output = fut.await;
    let frames = spinner.stop().await;
    tracing::debug!(frames, "Spinner stopped");
    output
}

/// Spinner drawn from its own OS thread
///
/// Dropping the handle without calling [`ThreadSpinner::stop`] also ends the
/// thread, but leaves it unjoined.
pub struct ThreadSpinner {
    stop_tx: mpsc::Sender<()>,
    handle: thread::JoinHandle<usize>,
}

impl ThreadSpinner {
    /// Spawn a thread drawing `<frame> <message>` on `out`
    pub fn start(
        message: impl Into<String>,
        out: Box<dyn Write + Send>,
    ) -> std::io::Result<Self> {
        let message = message.into();
        let (stop_tx, stop_rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("spinner".into())
            .spawn(move || spin_blocking(message, out, stop_rx))?;
        Ok(Self { stop_tx, handle })
    }

    /// Signal the thread, wait for it to clear its line and exit
    ///
    /// Returns the number of frames drawn.
    pub fn stop(self) -> usize {
        // A thread that already exited has dropped the receiver
        self.stop_tx.send(()).ok();
        match self.handle.join() {
            Ok(frames) => frames,
            Err(_) => {
                tracing::warn!("Spinner thread panicked");
                0
            }
        }
    }
}

fn spin_blocking(
    message: String,
    mut out: Box<dyn Write + Send>,
    stop: mpsc::Receiver<()>,
) -> usize {
    let mut frames = 0;
    for frame in FRAMES.iter().cycle() {
        if draw(&mut out, *frame, &message).is_err() {
            break;
        }
        frames += 1;

        match stop.recv_timeout(FRAME_INTERVAL) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    clear_line(&mut out, &message);
    frames
}

/// Run the blocking `f` on the calling thread with a spinner on `out`
///
/// The spinner thread is stopped and joined before the result is returned.
/// If the thread cannot be spawned `f` still runs, without a spinner.
pub fn supervise_blocking<R>(
    message: impl Into<String>,
    out: Box<dyn Write + Send>,
    f: impl FnOnce() -> R,
) -> R {
    let spinner = match ThreadSpinner::start(message, out) {
        Ok(spinner) => Some(spinner),
        Err(e) => {
            tracing::warn!(error = %e, "Could not start spinner thread");
            None
        }
    };
    let output = f();
    if let Some(spinner) = spinner {
        let frames = spinner.stop();
        tracing::debug!(frames, "Spinner thread joined");
    }
    output
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::SharedBuf;

    #[tokio::test]
    async fn supervise_returns_output_and_clears_the_line() {
        let buf = SharedBuf::default();

        let answer = supervise("thinking!", Box::new(buf.clone()), async {
            tokio::time::sleep(Duration::from_millis(250)).await;
            42
        })
        .await;

        assert_eq!(answer, 42);
        let text = buf.contents();
        assert!(text.starts_with("\r| thinking!"), "got {text:?}");
        assert!(text.contains("\r/ thinking!"));
        assert!(text.ends_with(&format!("\r{}\r", " ".repeat(11))));
    }

    #[tokio::test]
    async fn nothing_is_written_after_stop() {
        let buf = SharedBuf::default();
        let spinner = Spinner::start("waiting", Box::new(buf.clone()));
        tokio::time::sleep(Duration::from_millis(120)).await;

        let frames = spinner.stop().await;
        let after_stop = buf.contents();
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(frames >= 1);
        assert_eq!(buf.contents(), after_stop);
    }

    #[tokio::test]
    async fn immediate_stop_draws_at_most_one_frame() {
        let buf = SharedBuf::default();
        let spinner = Spinner::start("x", Box::new(buf.clone()));
        assert!(spinner.stop().await <= 1);
    }

    #[test]
    fn blocking_supervise_joins_the_spinner_thread() {
        let buf = SharedBuf::default();

        let answer = supervise_blocking("thinking!", Box::new(buf.clone()), || {
            std::thread::sleep(Duration::from_millis(250));
            42
        });

        assert_eq!(answer, 42);
        let text = buf.contents();
        assert!(text.starts_with("\r| thinking!"), "got {text:?}");
        assert!(text.contains("\r/ thinking!"));
        assert!(text.ends_with(&format!("\r{}\r", " ".repeat(11))));
    }

    #[test]
    fn thread_spinner_is_silent_after_stop() {
        let buf = SharedBuf::default();
        let spinner = ThreadSpinner::start("waiting", Box::new(buf.clone())).unwrap();
        std::thread::sleep(Duration::from_millis(120));

        let frames = spinner.stop();
        let after_stop = buf.contents();
        std::thread::sleep(Duration::from_millis(150));

        assert!(frames >= 1);
        assert_eq!(buf.contents(), after_stop);
    }

    #[test]
    fn stop_wakes_the_thread_without_waiting_a_frame() {
        let spinner = ThreadSpinner::start("x", Box::new(SharedBuf::default())).unwrap();
        let started = std::time::Instant::now();
        spinner.stop();
        assert!(started.elapsed() < FRAME_INTERVAL);
    }
}
