//! Framed Message
//!
//! Layout:
//! ┌──────────────────────────────────────────────┐
//! │ id: u16 LE │ payload_len: u16 LE │ (4 bytes)  │
//! ├──────────────────────────────────────────────┤
//! │ Payload (variable, max 65535 bytes)          │
//! └──────────────────────────────────────────────┘
//!
//! Header dibaca lewat accessor yang bounds-checked di atas buffer milik
//! message sendiri, tidak ada cast dari raw pointer.

use crate::core::{ArchiveError, Writer};
use crate::error::{Error, Result};

pub const HEADER_SIZE: usize = 4;
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

/// Id message yang dikenal oleh layer RPC.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageId {
    /// Teks bebas (NUL-terminated dari client interaktif)
    PlainText = 0,
    /// Payload berisi satu RPC packet
    RpcCall = 1,
}

impl MessageId {
    #[inline(always)]
    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            0 => Some(Self::PlainText),
            1 => Some(Self::RpcCall),
            _ => None,
        }
    }
}

impl From<MessageId> for u16 {
    fn from(id: MessageId) -> Self {
        id as u16
    }
}

/// Message Header - fixed 4 bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub id: u16,
    pub payload_len: u16,
}

impl MessageHeader {
    pub fn new(id: u16, payload_len: u16) -> Self {
        Self { id, payload_len }
    }

    /// Parse dari awal buffer; `None` jika kurang dari `HEADER_SIZE`.
    #[inline(always)]
    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        let header = buf.get(..HEADER_SIZE)?;
        Some(Self {
            id: u16::from_le_bytes([header[0], header[1]]),
            payload_len: u16::from_le_bytes([header[2], header[3]]),
        })
    }

    #[inline(always)]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..2].copy_from_slice(&self.id.to_le_bytes());
        buf[2..4].copy_from_slice(&self.payload_len.to_le_bytes());
        buf
    }

    /// Total message size (header + payload)
    #[inline(always)]
    pub fn total_size(&self) -> usize {
        HEADER_SIZE + self.payload_len as usize
    }
}

/// Message lengkap: header dan payload dalam satu buffer.
///
/// Hanya bisa dibuat dari payload utuh atau dari [`PendingMessage`] yang
/// body-nya sudah terisi, jadi consumer tidak pernah melihat message parsial.
#[derive(Clone, PartialEq, Eq)]
pub struct Message {
    data: Vec<u8>,
}

impl Message {
    /// Mulai message inbound dari header yang sudah diterima.
    pub fn from_header(header: [u8; HEADER_SIZE]) -> PendingMessage {
        let parsed = MessageHeader::new(
            u16::from_le_bytes([header[0], header[1]]),
            u16::from_le_bytes([header[2], header[3]]),
        );
        let mut data = vec![0u8; parsed.total_size()];
        data[..HEADER_SIZE].copy_from_slice(&header);
        PendingMessage { data, filled: 0 }
    }

    /// Bangun message outbound: tulis id dan panjang, copy payload.
    pub fn from_payload(id: u16, payload: &[u8]) -> Result<Self> {
        let payload_len = checked_len(payload.len())?;
        let header = MessageHeader::new(id, payload_len);

        let mut data = Vec::with_capacity(header.total_size());
        data.extend_from_slice(&header.to_bytes());
        data.extend_from_slice(payload);
        Ok(Self { data })
    }

    /// Serialize payload langsung ke buffer message.
    ///
    /// `capacity` membatasi payload (maks `MAX_PAYLOAD_SIZE`); write yang
    /// melebihi batas gagal dengan `BufferOverflow`.
    pub fn build<F>(id: u16, capacity: usize, fill: F) -> Result<Self>
    where
        F: FnOnce(&mut Writer<'_>) -> std::result::Result<usize, ArchiveError>,
    {
        let capacity = capacity.min(MAX_PAYLOAD_SIZE);
        let mut data = vec![0u8; HEADER_SIZE + capacity];

        let written = {
            let mut writer = Writer::new(&mut data[HEADER_SIZE..]);
            fill(&mut writer)?;
            writer.total_size()
        };

        let header = MessageHeader::new(id, checked_len(written)?);
        data[..HEADER_SIZE].copy_from_slice(&header.to_bytes());
        data.truncate(header.total_size());
        Ok(Self { data })
    }

    #[inline(always)]
    pub fn header(&self) -> MessageHeader {
        MessageHeader::new(
            u16::from_le_bytes([self.data[0], self.data[1]]),
            u16::from_le_bytes([self.data[2], self.data[3]]),
        )
    }

    #[inline(always)]
    pub fn id(&self) -> u16 {
        self.header().id
    }

    #[inline(always)]
    pub fn payload(&self) -> &[u8] {
        &self.data[HEADER_SIZE..]
    }

    #[inline(always)]
    pub fn payload_size(&self) -> usize {
        self.data.len() - HEADER_SIZE
    }

    #[inline(always)]
    pub fn total_size(&self) -> usize {
        self.data.len()
    }

    /// Bytes siap kirim (header + payload).
    #[inline(always)]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("id", &self.id())
            .field("payload_size", &self.payload_size())
            .finish()
    }
}

/// Message yang header-nya sudah diterima, body belum lengkap.
#[derive(Debug)]
pub struct PendingMessage {
    data: Vec<u8>,
    filled: usize,
}

impl PendingMessage {
    pub fn id(&self) -> u16 {
        u16::from_le_bytes([self.data[0], self.data[1]])
    }

    pub fn payload_size(&self) -> usize {
        self.data.len() - HEADER_SIZE
    }

    /// Sisa body yang belum terisi (target read berikutnya).
    pub fn unfilled_mut(&mut self) -> &mut [u8] {
        let start = HEADER_SIZE + self.filled;
        &mut self.data[start..]
    }

    /// Catat `n` bytes body yang baru dibaca ke `unfilled_mut()`.
    pub fn advance(&mut self, n: usize) {
        self.filled = (self.filled + n).min(self.payload_size());
    }

    pub fn is_complete(&self) -> bool {
        self.filled == self.payload_size()
    }

    /// Selesaikan message; `None` jika body belum lengkap.
    pub fn finish(self) -> Option<Message> {
        self.is_complete().then_some(Message { data: self.data })
    }

    /// Lengkapi message dengan body utuh sekaligus.
    pub fn read_body(mut self, payload: &[u8]) -> Result<Message> {
        if payload.len() != self.payload_size() {
            return Err(Error::LengthMismatch {
                expected: self.payload_size(),
                actual: payload.len(),
            });
        }
        self.data[HEADER_SIZE..].copy_from_slice(payload);
        Ok(Message { data: self.data })
    }
}

fn checked_len(len: usize) -> Result<u16> {
    u16::try_from(len).map_err(|_| Error::PayloadTooLarge { size: len })
}
