//! Asynchronous rotating file sink
//!
//! Producers enqueue serialized records into a bounded queue and never
//! block; a single consumer thread owns the file descriptor and writes
//! records in enqueue order. On each aligned clock tick the consumer swaps
//! to a fresh timestamped file, repoints the logical path, and sweeps old
//! backups.

use crate::clock::RotationClock;
use crate::config::SinkConfig;
use crate::pointer::{self, CurrentPointer};
use crate::retention::{RetentionSweeper, BACKUP_TIMESTAMP_FORMAT};
use crate::{Error, Result};
use chrono::Local;
use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tracing_subscriber::fmt::MakeWriter;

const STATE_STOPPED: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_STOPPING: u8 = 2;

enum Command {
    Record(Vec<u8>),
    Flush(Sender<io::Result<()>>),
}

struct Shared {
    file_path: PathBuf,
    rotate_hours: u32,
    max_backups: usize,
    state: AtomicU8,
    /// Writers inside the accept window; `stop` waits for this to reach zero
    /// so every accepted record is in the queue before the final drain.
    in_flight: AtomicUsize,
    queue_tx: Sender<Command>,
    stop_tx: Sender<()>,
}

/// Asynchronous rotating file sink.
///
/// Cheap to clone; all clones share one queue and one consumer thread.
pub struct RotatingSink {
    shared: Arc<Shared>,
    queue_rx: Arc<Mutex<Option<Receiver<Command>>>>,
    stop_rx: Receiver<()>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl RotatingSink {
    /// Build a sink for the configured logical path. The consumer does not
    /// run until [`start`](Self::start) is called.
    pub fn new(config: &SinkConfig) -> Result<Self> {
        let file_path = absolute_path(&config.output)?;
        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let (queue_tx, queue_rx) = bounded(config.effective_queue_capacity());
        let (stop_tx, stop_rx) = bounded(1);

        Ok(Self {
            shared: Arc::new(Shared {
                file_path,
                rotate_hours: config.rotate_hours,
                max_backups: config.max_backups,
                state: AtomicU8::new(STATE_STOPPED),
                in_flight: AtomicUsize::new(0),
                queue_tx,
                stop_tx,
            }),
            queue_rx: Arc::new(Mutex::new(Some(queue_rx))),
            stop_rx,
            worker: Arc::new(Mutex::new(None)),
        })
    }

    /// The absolute logical path clients read from.
    pub fn file_path(&self) -> &Path {
        &self.shared.file_path
    }

    /// Open the backing file and launch the consumer thread.
    ///
    /// Returns [`Error::AlreadyStarted`] if the sink is running or has
    /// already completed its lifecycle; a sink starts at most once.
    pub fn start(&self) -> Result<()> {
        if self
            .shared
            .state
            .compare_exchange(
                STATE_STOPPED,
                STATE_RUNNING,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return Err(Error::AlreadyStarted);
        }

        let Some(queue_rx) = self.queue_rx.lock().unwrap().take() else {
            // Ran once before; stop() left the state STOPPED but the queue
            // receiver is gone.
            self.shared.state.store(STATE_STOPPED, Ordering::SeqCst);
            return Err(Error::AlreadyStarted);
        };

        let mut consumer = Consumer::new(&self.shared.file_path, self.shared.max_backups);
        if let Err(e) = consumer.open_backup() {
            self.shared.state.store(STATE_STOPPED, Ordering::SeqCst);
            // Put the receiver back so the error is retryable.
            *self.queue_rx.lock().unwrap() = Some(queue_rx);
            return Err(e);
        }

        let clock = RotationClock::new(self.shared.rotate_hours);
        let stop_rx = self.stop_rx.clone();
        let handle = thread::Builder::new()
            .name("logspool-sink".to_string())
            .spawn(move || consumer.run(queue_rx, stop_rx, clock))
            .expect("failed to spawn sink consumer thread");

        *self.worker.lock().unwrap() = Some(handle);
        Ok(())
    }

    /// Enqueue one serialized record. Never blocks.
    ///
    /// One call carries one logical, newline-terminated record; partial
    /// records are not reassembled downstream.
    ///
    /// The input is copied; the caller keeps ownership of its buffer. Fails
    /// with [`Error::NotStarted`] unless the consumer is running and with
    /// [`Error::QueueFull`] when the bounded queue is at capacity.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        if self.shared.state.load(Ordering::SeqCst) != STATE_RUNNING {
            return Err(Error::NotStarted);
        }
        self.shared.in_flight.fetch_add(1, Ordering::SeqCst);
        // Re-check after announcing: stop() waits on in_flight, so a writer
        // that passes this second gate is guaranteed to be drained.
        if self.shared.state.load(Ordering::SeqCst) != STATE_RUNNING {
            self.shared.in_flight.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::NotStarted);
        }

        let result = match self.shared.queue_tx.try_send(Command::Record(buf.to_vec())) {
            Ok(()) => Ok(buf.len()),
            Err(TrySendError::Full(_)) => Err(Error::QueueFull),
            Err(TrySendError::Disconnected(_)) => Err(Error::NotStarted),
        };
        self.shared.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    /// Force an fsync of the current file without rotating or closing.
    ///
    /// Routed through the queue so the consumer remains the sole owner of
    /// the file descriptor; blocks until the sync has happened.
    pub fn flush(&self) -> Result<()> {
        if self.shared.state.load(Ordering::SeqCst) != STATE_RUNNING {
            return Err(Error::NotStarted);
        }
        let (ack_tx, ack_rx) = bounded(1);
        match self.shared.queue_tx.try_send(Command::Flush(ack_tx)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => return Err(Error::QueueFull),
            Err(TrySendError::Disconnected(_)) => return Err(Error::NotStarted),
        }
        match ack_rx.recv() {
            Ok(result) => result.map_err(Error::Io),
            // Consumer exited while draining; it syncs on close.
            Err(_) => Ok(()),
        }
    }

    /// Stop the consumer and block until every queued record is on disk and
    /// the file is synced and closed. Idempotent.
    pub fn stop(&self) {
        if self
            .shared
            .state
            .compare_exchange(
                STATE_RUNNING,
                STATE_STOPPING,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return;
        }

        // Let writers that already passed the state gate finish enqueueing.
        while self.shared.in_flight.load(Ordering::SeqCst) != 0 {
            thread::yield_now();
        }

        let _ = self.shared.stop_tx.try_send(());
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
        self.shared.state.store(STATE_STOPPED, Ordering::SeqCst);
    }
}

impl Clone for RotatingSink {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            queue_rx: Arc::clone(&self.queue_rx),
            stop_rx: self.stop_rx.clone(),
            worker: Arc::clone(&self.worker),
        }
    }
}

impl Write for RotatingSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        RotatingSink::write(self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        RotatingSink::flush(self).map_err(io::Error::from)
    }
}

impl<'a> MakeWriter<'a> for RotatingSink {
    type Writer = RotatingSink;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// The consumer side: sole owner of the open file.
struct Consumer {
    file_path: PathBuf,
    file: Option<File>,
    pointer: Box<dyn CurrentPointer>,
    sweeper: RetentionSweeper,
}

impl Consumer {
    fn new(file_path: &Path, max_backups: usize) -> Self {
        Self {
            file_path: file_path.to_path_buf(),
            file: None,
            pointer: pointer::platform_default(),
            sweeper: RetentionSweeper::new(file_path, max_backups),
        }
    }

    fn run(mut self, queue_rx: Receiver<Command>, stop_rx: Receiver<()>, clock: RotationClock) {
        loop {
            select! {
                recv(queue_rx) -> cmd => match cmd {
                    Ok(cmd) => self.handle(cmd, &clock),
                    Err(_) => break,
                },
                recv(stop_rx) -> _ => break,
            }
        }

        // Drain everything accepted before the stop signal, then make it
        // durable. No record that was acknowledged to a producer is dropped.
        while let Ok(cmd) = queue_rx.try_recv() {
            self.handle(cmd, &clock);
        }
        if let Err(e) = self.sync_and_close() {
            eprintln!("logspool: flush and close failed: {e}");
        }
        clock.stop();
    }

    fn handle(&mut self, cmd: Command, clock: &RotationClock) {
        match cmd {
            Command::Record(buf) => {
                if clock.try_tick().is_some() {
                    self.rotate();
                }
                if let Some(file) = self.file.as_mut() {
                    if let Err(e) = file.write_all(&buf) {
                        eprintln!("logspool: write failed: {e}");
                    }
                }
            }
            Command::Flush(ack) => {
                let result = match self.file.as_ref() {
                    Some(file) => file.sync_all(),
                    None => Ok(()),
                };
                let _ = ack.try_send(result);
            }
        }
    }

    /// Open a fresh timestamped backup and repoint the logical path at it.
    fn open_backup(&mut self) -> Result<()> {
        let backup_path = backup_file_path(&self.file_path);
        if let Some(parent) = backup_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&backup_path)?;

        if let Err(e) = self.pointer.repoint(&self.file_path, &backup_path) {
            return Err(Error::Rotation {
                message: format!("repointing {}: {}", self.file_path.display(), e),
            });
        }
        self.file = Some(file);
        Ok(())
    }

    /// Swap to a new backup on a clock tick. Best-effort: if the new file
    /// cannot be opened the previous file stays open and writing continues
    /// there; sweep failures never stop the consumer.
    fn rotate(&mut self) {
        let previous = self.file.take();
        if let Err(e) = self.open_backup() {
            eprintln!("logspool: rotation failed: {e}");
            self.file = previous;
            return;
        }
        if let Some(old) = previous {
            if let Err(e) = old.sync_all() {
                eprintln!("logspool: sync of rotated file failed: {e}");
            }
        }
        if let Err(e) = self.sweeper.sweep() {
            eprintln!("logspool: retention sweep failed: {e}");
        }
    }

    fn sync_and_close(&mut self) -> io::Result<()> {
        if let Some(file) = self.file.take() {
            file.sync_all()?;
        }
        Ok(())
    }
}

fn backup_file_path(file_path: &Path) -> PathBuf {
    let timestamp = Local::now().format(BACKUP_TIMESTAMP_FORMAT);
    let mut name = file_path.as_os_str().to_os_string();
    name.push(format!(".{timestamp}"));
    PathBuf::from(name)
}

fn absolute_path(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SinkConfig;
    use tempfile::TempDir;

    fn config(dir: &TempDir, capacity: usize) -> SinkConfig {
        SinkConfig {
            output: dir.path().join("app.log"),
            queue_capacity: capacity,
            max_backups: 3,
            rotate_hours: 24,
        }
    }

    #[test]
    fn test_write_before_start_is_rejected() {
        let dir = TempDir::new().unwrap();
        let sink = RotatingSink::new(&config(&dir, 8)).unwrap();
        assert!(matches!(sink.write(b"x\n"), Err(Error::NotStarted)));
    }

    #[test]
    fn test_double_start_is_rejected() {
        let dir = TempDir::new().unwrap();
        let sink = RotatingSink::new(&config(&dir, 8)).unwrap();
        sink.start().unwrap();
        assert!(matches!(sink.start(), Err(Error::AlreadyStarted)));
        sink.stop();
        assert!(matches!(sink.start(), Err(Error::AlreadyStarted)));
    }

    #[test]
    fn test_queue_full_without_consumer() {
        let dir = TempDir::new().unwrap();
        let sink = RotatingSink::new(&config(&dir, 2)).unwrap();
        // Simulate a stalled disk: mark the sink running without launching
        // the consumer, so nothing drains the queue.
        sink.shared.state.store(STATE_RUNNING, Ordering::SeqCst);

        assert_eq!(sink.write(b"one\n").unwrap(), 4);
        assert_eq!(sink.write(b"two\n").unwrap(), 4);
        assert!(matches!(sink.write(b"three\n"), Err(Error::QueueFull)));
    }

    #[test]
    fn test_backup_file_path_suffix_parses() {
        let path = backup_file_path(Path::new("/tmp/app.log"));
        let name = path.file_name().unwrap().to_str().unwrap();
        let suffix = name.strip_prefix("app.log.").unwrap();
        assert!(chrono::NaiveDateTime::parse_from_str(suffix, BACKUP_TIMESTAMP_FORMAT).is_ok());
    }

    #[test]
    fn test_rotation_splits_but_preserves_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let mut consumer = Consumer::new(&path, 5);
        consumer.open_backup().unwrap();

        consumer.file.as_mut().unwrap().write_all(b"before\n").unwrap();
        // Within one second the rotated file shares its timestamp suffix
        // with the old one, so sleep past the boundary to force a new file.
        thread::sleep(std::time::Duration::from_millis(1100));
        consumer.rotate();
        consumer.file.as_mut().unwrap().write_all(b"after\n").unwrap();
        consumer.sync_and_close().unwrap();

        let mut backups: Vec<PathBuf> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("app.log."))
            })
            .collect();
        backups.sort();
        assert_eq!(backups.len(), 2);
        assert_eq!(std::fs::read_to_string(&backups[0]).unwrap(), "before\n");
        assert_eq!(std::fs::read_to_string(&backups[1]).unwrap(), "after\n");

        // The logical path tracks the newest backup.
        let pointer = pointer::platform_default();
        assert_eq!(pointer.resolve(&path).unwrap(), backups[1]);
    }

    #[test]
    fn test_rotation_sweeps_excess_backups() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(dir.path().join("app.log.20200101000000"), "ancient").unwrap();
        std::fs::write(dir.path().join("app.log.20200102000000"), "old").unwrap();

        let mut consumer = Consumer::new(&path, 1);
        consumer.open_backup().unwrap();
        thread::sleep(std::time::Duration::from_millis(1100));
        consumer.rotate();
        consumer.sync_and_close().unwrap();

        // Only the freshly rotated file survives a max_backups of one.
        assert!(!dir.path().join("app.log.20200101000000").exists());
        assert!(!dir.path().join("app.log.20200102000000").exists());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let sink = RotatingSink::new(&config(&dir, 8)).unwrap();
        sink.start().unwrap();
        sink.write(b"line\n").unwrap();
        sink.stop();
        sink.stop();
        assert!(matches!(sink.write(b"late\n"), Err(Error::NotStarted)));
    }
}
