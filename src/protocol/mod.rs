//! Protocol Layer: Framed Message di atas stream socket
//!
//! Prinsip desain:
//! - Fixed-size header (4 bytes): id dan panjang payload diketahui dulu
//! - Little-endian eksplisit, tanpa cast dari raw bytes
//! - Tidak ada message parsial yang sampai ke consumer

mod encoder;
mod message;

pub use encoder::{FrameReader, FrameWriter, ReadEvent, ReadState, WriteReport};
pub use message::{
    Message, MessageHeader, MessageId, PendingMessage, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
