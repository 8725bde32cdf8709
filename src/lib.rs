//! # logspool
//!
//! Asynchronous rotating log sink with a threshold-based alerting pipeline.
//!
//! ## Features
//!
//! - **Non-blocking writes**: producers enqueue into a bounded queue and are
//!   never stalled by a slow disk; a full queue rejects instead of blocking
//! - **Single-consumer file ownership**: one dedicated thread owns the file
//!   descriptor, so records land on disk in enqueue order
//! - **Boundary-aligned rotation**: files rotate at wall-clock multiples of a
//!   configured hour interval, with a symlink (or pointer-file) tracking the
//!   current backup
//! - **Retention**: old backups beyond a configured count are swept after
//!   each rotation
//! - **Alerting**: a sliding-window counter over error-level records fires a
//!   cooldown-gated notification when a burst exceeds a threshold
//!
//! ## Quick Start
//!
//! ```no_run
//! use logspool::{RotatingSink, SinkConfig};
//!
//! fn main() -> logspool::Result<()> {
//!     let config = SinkConfig {
//!         output: "/var/log/app/app.log".into(),
//!         ..SinkConfig::default()
//!     };
//!     let sink = RotatingSink::new(&config)?;
//!     sink.start()?;
//!
//!     sink.write(b"INFO [2026-01-01 00:00:00] service started\n")?;
//!
//!     sink.stop();
//!     Ok(())
//! }
//! ```

pub mod alert;
pub mod clock;
pub mod config;
pub mod pointer;
pub mod record;
pub mod retention;
pub mod sink;


pub use alert::{AlertAggregator, NotifySink};
pub use clock::RotationClock;
pub use config::{AlertConfig, SinkConfig, SpoolConfig};
pub use record::{Level, LogRecord};
pub use retention::{RetentionSweeper, SweepReport};
pub use sink::RotatingSink;

/// Result type for sink operations
pub type Result<T> = std::result::Result<T, Error>;

/// Sink-specific errors
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A write arrived before `start` or after `stop`.
    #[error("sink has not been started")]
    NotStarted,

    /// `start` was called on a sink that is already running (or already ran).
    #[error("sink has already been started")]
    AlreadyStarted,

    /// The bounded queue is at capacity; the record was rejected, not queued.
    #[error("write queue is full")]
    QueueFull,

    #[error("rotation error: {message}")]
    Rotation { message: String },

    #[error("retention sweep error: {message}")]
    Retention { message: String },

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("unknown log level: {0}")]
    UnknownLevel(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        use std::io::ErrorKind;
        match err {
            Error::QueueFull => std::io::Error::new(ErrorKind::WouldBlock, err),
            Error::NotStarted => std::io::Error::new(ErrorKind::NotConnected, err),
            Error::Io(inner) => inner,
            other => std::io::Error::other(other),
        }
    }
}
