//! Typed error taxonomy for the synchronization engine.
//!
//! `SyncError` is the precise, matchable error returned by the layers that
//! need to make a decision based on *which* failure occurred (escalate to a
//! full transfer, close the session, exit at startup). Call sites further up
//! the stack collapse it into `anyhow::Result` with `.context(...)`, the same
//! split the rest of this crate's ambient error handling uses.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("protocol framing error: {0}")]
    Protocol(String),

    #[error("corrupted delta stream: {0}")]
    DeltaCorrupt(String),

    #[error("invalid sync mode: {0} (must be 0..=3)")]
    InvalidSyncMode(i64),

    #[error("connection closed by peer")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, SyncError>;
