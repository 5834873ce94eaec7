//! Fixed-capacity payload untuk argumen dan hasil RPC
//!
//! Buffer dialokasikan sekali (1KB), write selalu dicek kapasitasnya.

use std::fmt;

use super::archive::{Archive, ArchiveError, Reader, Writer};

/// Kapasitas maksimum payload argumen/hasil dalam satu packet.
pub const PAYLOAD_CAPACITY: usize = 1024;

/// Argumen atau hasil yang sudah di-serialize, siap dibawa packet.
#[derive(Clone)]
pub struct PayloadBuffer {
    data: Box<[u8]>,
    len: usize,
}

impl PayloadBuffer {
    pub fn new() -> Self {
        Self {
            data: vec![0u8; PAYLOAD_CAPACITY].into_boxed_slice(),
            len: 0,
        }
    }

    /// Serialize argumen (biasanya tuple) ke payload baru.
    pub fn from_args<A: Archive>(args: &A) -> Result<Self, ArchiveError> {
        let mut payload = Self::new();
        let mut writer = Writer::new(&mut payload.data);
        args.serialize(&mut writer)?;
        payload.len = writer.total_size();
        Ok(payload)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ArchiveError> {
        let mut payload = Self::new();
        payload.fill(bytes)?;
        Ok(payload)
    }

    /// Decode payload sebagai `A`; seluruh bytes harus terpakai.
    pub fn decode<A: Archive>(&self) -> Result<A, ArchiveError> {
        let mut reader = Reader::new(self.as_bytes());
        let value = reader.deserialize()?;
        reader.finish()?;
        Ok(value)
    }

    #[inline(always)]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    fn fill(&mut self, bytes: &[u8]) -> Result<(), ArchiveError> {
        if bytes.len() > self.data.len() {
            return Err(ArchiveError::BufferOverflow {
                needed: bytes.len(),
                available: self.data.len(),
            });
        }
        self.data[..bytes.len()].copy_from_slice(bytes);
        self.len = bytes.len();
        Ok(())
    }
}

impl Default for PayloadBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for PayloadBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for PayloadBuffer {}

impl fmt::Debug for PayloadBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadBuffer")
            .field("len", &self.len)
            .field("bytes", &self.as_bytes())
            .finish()
    }
}

/// Wire: `[len: u64][bytes]`
impl Archive for PayloadBuffer {
    fn serialize(&self, ar: &mut Writer<'_>) -> Result<usize, ArchiveError> {
        Ok(self.len.serialize(ar)? + ar.write(self.as_bytes())?)
    }

    fn deserialize(ar: &mut Reader<'_>) -> Result<Self, ArchiveError> {
        let len = usize::deserialize(ar)?;
        if len > PAYLOAD_CAPACITY {
            return Err(ArchiveError::LengthTooLarge {
                len,
                limit: PAYLOAD_CAPACITY,
            });
        }
        Self::from_bytes(ar.read(len)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_roundtrip() {
        let payload = PayloadBuffer::from_args(&(1i32, String::from("alice"))).unwrap();
        assert_eq!(payload.len(), 4 + 8 + 5);

        let (id, name): (i32, String) = payload.decode().unwrap();
        assert_eq!(id, 1);
        assert_eq!(name, "alice");
    }

    #[test]
    fn test_empty_args() {
        let payload = PayloadBuffer::from_args(&()).unwrap();
        assert!(payload.is_empty());
        payload.decode::<()>().unwrap();
    }

    #[test]
    fn test_overflow_is_reported() {
        let big = vec![0u8; PAYLOAD_CAPACITY];
        let err = PayloadBuffer::from_args(&(big,)).unwrap_err();
        assert!(err.is_overflow());

        let err = PayloadBuffer::from_bytes(&[0u8; PAYLOAD_CAPACITY + 1]).unwrap_err();
        assert!(err.is_overflow());
    }

    #[test]
    fn test_shape_mismatch() {
        let payload = PayloadBuffer::from_args(&(3.0f64,)).unwrap();
        // Kurang bytes
        assert!(matches!(
            payload.decode::<(f64, f64)>(),
            Err(ArchiveError::UnexpectedEnd { .. })
        ));
        // Kelebihan bytes
        assert!(matches!(
            payload.decode::<(u32,)>(),
            Err(ArchiveError::TrailingBytes { remaining: 4 })
        ));
    }

    #[test]
    fn test_nested_payload_roundtrip() {
        let inner = PayloadBuffer::from_args(&(9u8, 10u8)).unwrap();
        let mut buf = [0u8; 32];
        let mut writer = Writer::new(&mut buf);
        let written = writer.serialize(&inner).unwrap();
        assert_eq!(written, 8 + 2);

        let decoded: PayloadBuffer = Reader::new(&buf[..written]).deserialize().unwrap();
        assert_eq!(decoded, inner);
    }

    #[test]
    fn test_oversized_prefix_rejected() {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&((PAYLOAD_CAPACITY + 1) as u64).to_le_bytes());
        let err = Reader::new(&buf).deserialize::<PayloadBuffer>().unwrap_err();
        assert!(matches!(err, ArchiveError::LengthTooLarge { len, limit: PAYLOAD_CAPACITY } if len == PAYLOAD_CAPACITY + 1));

        // Dari sisi packet masuk ini payload yang salah bentuk, bukan overflow
        let err = crate::Error::from(err);
        assert!(err.is_deserialization_mismatch());
        assert!(!err.is_buffer_overflow());
    }
}
