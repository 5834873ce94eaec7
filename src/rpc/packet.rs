//! RPC Packet: isi payload frame dengan id `RpcCall`
//!
//! Layout (little-endian):
//! ┌────────────────────────────────────────────────────────────┐
//! │ instance_id: u16 │ function_id: u16 │ call_id: u32          │
//! │ call_kind: u8    │ payload_len: u64 │ payload (max 1024)    │
//! └────────────────────────────────────────────────────────────┘

use crate::core::{Archive, ArchiveError, ArchiveStream, PayloadBuffer, Reader, Writer, PAYLOAD_CAPACITY};
use crate::error::Result;
use crate::protocol::{Message, MessageId};

/// Ukuran field tetap sebelum bytes payload.
pub const PACKET_HEADER_SIZE: usize = 2 + 2 + 4 + 1 + 8;
pub const MAX_PACKET_SIZE: usize = PACKET_HEADER_SIZE + PAYLOAD_CAPACITY;

/// Permintaan eksekusi atau hasilnya.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallKind {
    #[default]
    Call = 0,
    Return = 1,
}

impl CallKind {
    #[inline(always)]
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Call),
            1 => Some(Self::Return),
            _ => None,
        }
    }
}

impl Archive for CallKind {
    fn serialize(&self, ar: &mut Writer<'_>) -> std::result::Result<usize, ArchiveError> {
        ar.serialize(&(*self as u8))
    }

    fn deserialize(ar: &mut Reader<'_>) -> std::result::Result<Self, ArchiveError> {
        let tag: u8 = ar.deserialize()?;
        Self::from_u8(tag).ok_or(ArchiveError::InvalidTag {
            what: "call kind",
            tag,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RpcPacket {
    /// Interface pengirim
    pub instance_id: u16,
    pub function_id: u16,
    /// Korelasi Call dengan Return-nya
    pub call_id: u32,
    pub call_kind: CallKind,
    /// Argumen (Call) atau hasil (Return)
    pub payload: PayloadBuffer,
}

crate::archive_struct!(RpcPacket {
    instance_id,
    function_id,
    call_id,
    call_kind,
    payload
});

impl RpcPacket {
    pub fn call(instance_id: u16, function_id: u16, call_id: u32, payload: PayloadBuffer) -> Self {
        Self {
            instance_id,
            function_id,
            call_id,
            call_kind: CallKind::Call,
            payload,
        }
    }

    /// Return untuk packet ini: id sama, `call_kind = Return`.
    pub fn reply(&self, instance_id: u16, payload: PayloadBuffer) -> Self {
        Self {
            instance_id,
            function_id: self.function_id,
            call_id: self.call_id,
            call_kind: CallKind::Return,
            payload,
        }
    }

    /// Bungkus packet ke frame `RpcCall`.
    pub fn to_message(&self) -> Result<Message> {
        Message::build(MessageId::RpcCall.into(), MAX_PACKET_SIZE, |w| {
            w.serialize(self)
        })
    }

    /// Decode packet dari payload frame; sisa bytes dianggap error.
    pub fn from_message(message: &Message) -> Result<Self> {
        let mut packet = Self::default();
        let mut stream = ArchiveStream::reading(message.payload());
        stream.pass(&mut packet)?;

        let remaining = message.payload_size() - stream.total_size();
        if remaining != 0 {
            return Err(ArchiveError::TrailingBytes { remaining }.into());
        }
        Ok(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_wire_layout() {
        let payload = PayloadBuffer::from_args(&(3.0f64,)).unwrap();
        let packet = RpcPacket::call(0, 4, 0x0102_0304, payload);
        let msg = packet.to_message().unwrap();

        assert_eq!(msg.id(), u16::from(MessageId::RpcCall));
        assert_eq!(msg.payload_size(), PACKET_HEADER_SIZE + 8);

        let bytes = msg.payload();
        assert_eq!(&bytes[0..2], &[0, 0]);
        assert_eq!(&bytes[2..4], &[4, 0]);
        assert_eq!(&bytes[4..8], &[4, 3, 2, 1]);
        assert_eq!(bytes[8], 0);
        assert_eq!(&bytes[9..17], &8u64.to_le_bytes());
        assert_eq!(&bytes[17..], &3.0f64.to_le_bytes());

        assert_eq!(RpcPacket::from_message(&msg).unwrap(), packet);
    }

    #[test]
    fn test_reply_keeps_ids() {
        let call = RpcPacket::call(2, 4, 99, PayloadBuffer::new());
        let ret = call.reply(5, PayloadBuffer::from_args(&(9.0f64,)).unwrap());
        assert_eq!(ret.call_kind, CallKind::Return);
        assert_eq!(ret.call_id, 99);
        assert_eq!(ret.function_id, 4);
        assert_eq!(ret.instance_id, 5);
    }

    #[test]
    fn test_invalid_call_kind() {
        let packet = RpcPacket::call(0, 1, 1, PayloadBuffer::new());
        let mut bytes = packet.to_message().unwrap().payload().to_vec();
        bytes[8] = 7;
        let msg = Message::from_payload(MessageId::RpcCall.into(), &bytes).unwrap();

        let err = RpcPacket::from_message(&msg).unwrap_err();
        assert!(err.is_deserialization_mismatch());
    }

    #[test]
    fn test_truncated_and_trailing() {
        let packet = RpcPacket::call(0, 1, 1, PayloadBuffer::from_bytes(b"abc").unwrap());
        let bytes = packet.to_message().unwrap().payload().to_vec();

        let short = Message::from_payload(1, &bytes[..bytes.len() - 1]).unwrap();
        assert!(RpcPacket::from_message(&short).is_err());

        let mut long = bytes.clone();
        long.push(0);
        let long = Message::from_payload(1, &long).unwrap();
        assert!(matches!(
            RpcPacket::from_message(&long),
            Err(Error::Archive(ArchiveError::TrailingBytes { remaining: 1 }))
        ));
    }
}
