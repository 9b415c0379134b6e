//! Domain error taxonomy.
//!
//! Per-cycle errors (transport, decode, storage) are contained within the
//! cycle that produced them and logged; only configuration errors are fatal,
//! and only at startup.

use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Serial link failures. A transport error skips the current acquisition
/// cycle; no row is written.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to open serial port {port}: {source}")]
    PortOpen {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("failed to write request frame to {port}: {source}")]
    Write {
        port: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no response from {port} within {timeout_ms} ms")]
    ReadTimeout { port: String, timeout_ms: u64 },

    #[error("failed to read response from {port}: {source}")]
    Read {
        port: String,
        #[source]
        source: std::io::Error,
    },
}

/// Malformed response frame. A decode error never yields a partially
/// populated reading.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("response frame too short: got {got} bytes, need at least {want}")]
    FrameTooShort { got: usize, want: usize },
}

/// Failure to pause or resume one named external service. Reported per
/// service; never aborts the remaining orchestration steps.
#[derive(Debug, Error)]
pub enum ServiceControlError {
    #[error("systemctl {action} {service} exited with {status}")]
    Failed {
        service: String,
        action: String,
        status: ExitStatus,
    },

    #[error("failed to spawn systemctl {action} {service}: {source}")]
    Spawn {
        service: String,
        action: String,
        #[source]
        source: std::io::Error,
    },
}

/// Startup configuration failures. These are the only fatal errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {path}")]
    Missing { path: PathBuf },

    #[error("failed to read configuration {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {reason}")]
    Invalid { reason: String },
}
