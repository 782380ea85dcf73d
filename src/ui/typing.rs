//! Animated "Typing..." bubble shown while a turn runs

use super::{bubble_width, clear_last_lines, colorize, format_box_lines, pad_visible, term_width};
use super::{Align, BoxOptions, ACCENT_ASSISTANT, CONTENT_ASSISTANT};
use crossterm::{cursor, queue, style::Print};
use std::io::{self, IsTerminal, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;

const FRAME_INTERVAL: Duration = Duration::from_millis(400);
const STOP_TIMEOUT: Duration = Duration::from_millis(500);
const FRAMES: [&str; 4] = ["Typing", "Typing.", "Typing..", "Typing..."];

/// Background thread calling `on_tick` every `interval` until stopped
struct Ticker {
    /// Dropping the sender wakes the thread and ends it
    stop: Option<Sender<()>>,
    done: Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    fn spawn<F>(interval: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            while let Err(RecvTimeoutError::Timeout) = stop_rx.recv_timeout(interval) {
                on_tick();
            }
            let _ = done_tx.send(());
        });

        Self {
            stop: Some(stop_tx),
            done: done_rx,
            handle: Some(handle),
        }
    }

    fn halt(&mut self) {
        self.stop.take();
        let Some(handle) = self.handle.take() else {
            return;
        };

        match self.done.recv_timeout(STOP_TIMEOUT) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = handle.join();
            }
            Err(RecvTimeoutError::Timeout) => debug!("Typing indicator did not stop in time"),
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.halt();
    }
}

pub struct TypingIndicator {
    ticker: Option<Ticker>,
    line_count: usize,
}

impl TypingIndicator {
    /// Draw the bubble and start animating it; a no-op off a terminal
    pub fn start() -> Self {
        if !io::stdout().is_terminal() {
            return Self {
                ticker: None,
                line_count: 0,
            };
        }

        let width = term_width();
        let options = BoxOptions {
            align: Align::Left,
            accent: ACCENT_ASSISTANT,
            content_color: Some(CONTENT_ASSISTANT),
            box_width: Some(bubble_width(0.2, Some(FRAMES[3].len()), width)),
            pre_wrapped: false,
        };
        let layout = format_box_lines("ASSISTANT", FRAMES[0], &options, width);
        {
            let mut stdout = io::stdout().lock();
            for line in &layout.lines {
                let _ = writeln!(stdout, "{}", line);
            }
            let _ = stdout.flush();
        }

        let line_count = layout.lines.len();
        let move_up = layout.move_up as u16;
        let mut frame = 0;
        let ticker = Ticker::spawn(FRAME_INTERVAL, move || {
            frame = (frame + 1) % FRAMES.len();
            let text = colorize(&pad_visible(FRAMES[frame], layout.inner_width), CONTENT_ASSISTANT);
            let line = format!("{}│ {} │", layout.pad, text);

            let mut stdout = io::stdout().lock();
            let _ = queue!(
                stdout,
                cursor::MoveUp(move_up),
                cursor::MoveToColumn(0),
                Print(line),
                cursor::MoveDown(move_up),
                cursor::MoveToColumn(0)
            );
            let _ = stdout.flush();
        });

        Self {
            ticker: Some(ticker),
            line_count,
        }
    }

    /// Stop the animation and erase the bubble
    pub fn stop(mut self) {
        if let Some(mut ticker) = self.ticker.take() {
            ticker.halt();
        }
        clear_last_lines(self.line_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn test_stop_is_prompt() {
        let started = Instant::now();
        let indicator = TypingIndicator::start();
        indicator.stop();
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_ticker_wakes_on_halt() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let mut ticker = Ticker::spawn(Duration::from_secs(60), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let started = Instant::now();
        ticker.halt();
        assert!(started.elapsed() < STOP_TIMEOUT);
        assert!(ticker.handle.is_none());
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_ticker_ticks_until_halted() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let mut ticker = Ticker::spawn(Duration::from_millis(5), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        thread::sleep(Duration::from_millis(100));
        ticker.halt();
        let seen = ticks.load(Ordering::SeqCst);
        assert!(seen > 0);

        thread::sleep(Duration::from_millis(30));
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
    }
}
