use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, anyhow};
use tracing::{debug, info, warn};

use crate::datastore::{DataStore, SaveOutcome};
use crate::documents::Documents;

pub const DEFAULT_DELAY: Duration = Duration::from_millis(1500);

/// Trailing-edge debounce deadline.
///
/// Every `touch` pushes the deadline out to `now + delay`; the write fires
/// once the deadline passes without another touch.
#[derive(Debug, Clone, Copy)]
pub struct Debounce {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debounce {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub fn touch(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Time left before the deadline, `None` when nothing is scheduled.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Clears and reports a deadline that has passed.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

enum Message {
    Schedule(Box<Documents>),
    Flush(Sender<Option<SaveOutcome>>),
}

/// Background writer that persists the most recent full-state snapshot
/// after a quiet period.
///
/// Only the last scheduled snapshot is written; earlier ones are replaced.
/// Dropping the writer flushes whatever is pending and joins the thread.
#[derive(Debug)]
pub struct Autosave {
    tx: Option<Sender<Message>>,
    worker: Option<JoinHandle<()>>,
}

impl Autosave {
    pub fn spawn(store: DataStore, delay: Duration) -> anyhow::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("grit-autosave".to_string())
            .spawn(move || run_worker(store, rx, delay))
            .context("failed to spawn autosave thread")?;
        info!(delay_ms = delay.as_millis() as u64, "autosave started");
        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
        })
    }

    /// Replaces the pending snapshot and restarts the quiet period.
    pub fn schedule(&self, docs: Documents) {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.send(Message::Schedule(Box::new(docs))).is_err() {
            warn!("autosave thread is gone; change not scheduled");
        }
    }

    /// Writes the pending snapshot now and waits for the write. Returns
    /// `None` when nothing was pending.
    pub fn flush_now(&self) -> anyhow::Result<Option<SaveOutcome>> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| anyhow!("autosave already shut down"))?;
        let (ack_tx, ack_rx) = mpsc::channel();
        tx.send(Message::Flush(ack_tx))
            .map_err(|_| anyhow!("autosave thread is gone"))?;
        ack_rx
            .recv()
            .map_err(|_| anyhow!("autosave thread exited during flush"))
    }

    /// Flushes pending work and stops the thread.
    pub fn shutdown(mut self) -> anyhow::Result<()> {
        self.stop()
    }

    fn stop(&mut self) -> anyhow::Result<()> {
        drop(self.tx.take());
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| anyhow!("autosave thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for Autosave {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!(error = %err, "autosave did not stop cleanly");
        }
    }
}

fn run_worker(store: DataStore, rx: Receiver<Message>, delay: Duration) {
    let mut debounce = Debounce::new(delay);
    let mut pending: Option<Documents> = None;

    loop {
        let received = match debounce.remaining(Instant::now()) {
            Some(wait) => rx.recv_timeout(wait),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(Message::Schedule(docs)) => {
                pending = Some(*docs);
                debounce.touch(Instant::now());
            }
            Ok(Message::Flush(ack)) => {
                debounce.cancel();
                let outcome = pending.take().map(|docs| write(&store, &docs));
                let _ = ack.send(outcome);
            }
            Err(RecvTimeoutError::Timeout) => {
                if debounce.fire(Instant::now())
                    && let Some(docs) = pending.take()
                {
                    write(&store, &docs);
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                if let Some(docs) = pending.take() {
                    debug!("flushing pending snapshot on shutdown");
                    write(&store, &docs);
                }
                break;
            }
        }
    }
}

fn write(store: &DataStore, docs: &Documents) -> SaveOutcome {
    let outcome = store.save(docs);
    if outcome.is_complete() {
        debug!(day = docs.current_day, "autosaved");
    } else {
        warn!(
            failed = outcome.failed.len(),
            "autosave wrote a partial snapshot"
        );
    }
    outcome
}
