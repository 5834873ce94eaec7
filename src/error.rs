//! Error types untuk transport dan RPC

use std::io;

use thiserror::Error;

use crate::core::ArchiveError;

#[derive(Error, Debug)]
pub enum Error {
    /// Socket-level error; menutup session yang bersangkutan.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialize gagal (`BufferOverflow`) atau payload tidak cocok dengan
    /// tipe yang diharapkan (deserialization mismatch).
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("payload too large: {size} bytes (max {})", crate::protocol::MAX_PAYLOAD_SIZE)]
    PayloadTooLarge { size: usize },

    #[error("frame body length mismatch: header says {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("unknown function {function_id} on interface {instance_id}")]
    UnknownFunction { instance_id: u16, function_id: u16 },

    #[error("packet addressed to interface {instance_id}, local interface is {local}")]
    UnknownInstance { instance_id: u16, local: u16 },

    #[error("unknown message id {0}")]
    UnknownMessage(u16),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("call timed out")]
    Timeout,

    #[error("address resolved to nothing: {0}")]
    InvalidAddress(String),
}

impl Error {
    /// Payload tidak sesuai dengan bentuk yang diharapkan (bukan overflow).
    pub fn is_deserialization_mismatch(&self) -> bool {
        matches!(self, Self::Archive(e) if !e.is_overflow())
    }

    pub fn is_buffer_overflow(&self) -> bool {
        matches!(self, Self::Archive(e) if e.is_overflow())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
