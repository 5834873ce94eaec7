//! Binary Archive: serialization dua arah dengan satu deskripsi per tipe
//!
//! Layout encoding:
//! - Angka fixed-width little-endian (u8..u64, i8..i64, f32, f64)
//! - `bool` satu byte (0/1), `Option<T>` tag byte lalu value
//! - Sequence (`String`, `Vec<T>`): length prefix u64 lalu elemen
//! - Tuple dan struct: field berurutan, tanpa framing
//!
//! Semua write dicek terhadap kapasitas buffer tujuan (`BufferOverflow`),
//! semua read dicek terhadap sisa input (`UnexpectedEnd`).

/// Batas jumlah elemen `Vec<T>` untuk `T` zero-sized.
pub const MAX_ZERO_SIZED_ITEMS: usize = 64 * 1024;

/// Error dari archive, baik arah write maupun read.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArchiveError {
    /// Write melebihi kapasitas buffer tujuan.
    #[error("buffer overflow: need {needed} bytes, {available} available")]
    BufferOverflow { needed: usize, available: usize },

    /// Input habis sebelum value selesai dibaca.
    #[error("unexpected end of input: need {needed} bytes, {remaining} remaining")]
    UnexpectedEnd { needed: usize, remaining: usize },

    #[error("invalid bool byte {0:#04x}")]
    InvalidBool(u8),

    #[error("invalid {what} tag {tag}")]
    InvalidTag { what: &'static str, tag: u8 },

    #[error("string is not valid utf-8")]
    InvalidUtf8,

    #[error("length prefix {0} does not fit in usize")]
    LengthOverflow(u64),

    /// Length prefix dari input melebihi batas yang bisa diterima.
    #[error("length prefix {len} exceeds limit {limit}")]
    LengthTooLarge { len: usize, limit: usize },

    /// Input masih tersisa setelah value lengkap di-decode.
    #[error("{remaining} trailing bytes after decode")]
    TrailingBytes { remaining: usize },
}

impl ArchiveError {
    /// `true` untuk kegagalan arah write (kapasitas), `false` untuk
    /// ketidakcocokan bentuk payload saat read.
    pub fn is_overflow(&self) -> bool {
        matches!(self, Self::BufferOverflow { .. })
    }
}

/// Satu deskripsi per tipe, dipakai untuk kedua arah.
///
/// Untuk struct, pakai [`archive_struct!`](crate::archive_struct) supaya
/// urutan field write dan read selalu simetris.
pub trait Archive: Sized {
    /// Tulis value ke cursor, return jumlah bytes yang ditulis.
    fn serialize(&self, ar: &mut Writer<'_>) -> Result<usize, ArchiveError>;

    /// Baca value dari cursor, maju tepat sebesar lebar encoding.
    fn deserialize(ar: &mut Reader<'_>) -> Result<Self, ArchiveError>;
}

/// Write cursor di atas buffer yang sudah dialokasikan.
pub struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Copy raw bytes, gagal dengan `BufferOverflow` jika tidak muat.
    #[inline(always)]
    pub fn write(&mut self, bytes: &[u8]) -> Result<usize, ArchiveError> {
        let available = self.remaining();
        if bytes.len() > available {
            return Err(ArchiveError::BufferOverflow {
                needed: bytes.len(),
                available,
            });
        }

        let end = self.pos + bytes.len();
        self.buf[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
        Ok(bytes.len())
    }

    #[inline(always)]
    pub fn serialize<T: Archive>(&mut self, value: &T) -> Result<usize, ArchiveError> {
        value.serialize(self)
    }

    /// Total bytes yang sudah ditulis sejak cursor dibuat.
    #[inline(always)]
    pub fn total_size(&self) -> usize {
        self.pos
    }

    #[inline(always)]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn written(&self) -> &[u8] {
        &self.buf[..self.pos]
    }
}

/// Read cursor di atas input yang sudah lengkap.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Ambil `len` bytes berikutnya (zero-copy).
    #[inline(always)]
    pub fn read(&mut self, len: usize) -> Result<&'a [u8], ArchiveError> {
        let remaining = self.remaining();
        if len > remaining {
            return Err(ArchiveError::UnexpectedEnd {
                needed: len,
                remaining,
            });
        }

        let start = self.pos;
        self.pos += len;
        Ok(&self.buf[start..self.pos])
    }

    #[inline(always)]
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], ArchiveError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read(N)?);
        Ok(out)
    }

    #[inline(always)]
    pub fn deserialize<T: Archive>(&mut self) -> Result<T, ArchiveError> {
        T::deserialize(self)
    }

    /// Decode langsung ke destination yang sudah ada.
    pub fn deserialize_into<T: Archive>(&mut self, dst: &mut T) -> Result<(), ArchiveError> {
        *dst = T::deserialize(self)?;
        Ok(())
    }

    #[inline(always)]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Bytes yang sudah dikonsumsi.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Pastikan seluruh input terpakai.
    pub fn finish(self) -> Result<(), ArchiveError> {
        match self.remaining() {
            0 => Ok(()),
            remaining => Err(ArchiveError::TrailingBytes { remaining }),
        }
    }
}

/// Arah stream yang sedang aktif.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Serialize,
    Deserialize,
}

/// Stream dua arah: satu operator (`pass`) yang write atau read
/// tergantung arah yang dikonfigurasi.
///
/// ```
/// use kurir::core::ArchiveStream;
///
/// let mut buf = [0u8; 16];
/// let (mut id, mut score) = (7u16, 2.5f32);
/// let mut out = ArchiveStream::writing(&mut buf);
/// out.pass(&mut id)?.pass(&mut score)?;
/// let written = out.total_size();
///
/// let (mut id2, mut score2) = (0u16, 0f32);
/// let mut input = ArchiveStream::reading(&buf[..written]);
/// input.pass(&mut id2)?.pass(&mut score2)?;
/// assert_eq!((id2, score2), (7, 2.5));
/// # Ok::<(), kurir::core::ArchiveError>(())
/// ```
pub enum ArchiveStream<'a> {
    Writing(Writer<'a>),
    Reading(Reader<'a>),
}

impl<'a> ArchiveStream<'a> {
    pub fn writing(buf: &'a mut [u8]) -> Self {
        Self::Writing(Writer::new(buf))
    }

    pub fn reading(buf: &'a [u8]) -> Self {
        Self::Reading(Reader::new(buf))
    }

    pub fn direction(&self) -> Direction {
        match self {
            Self::Writing(_) => Direction::Serialize,
            Self::Reading(_) => Direction::Deserialize,
        }
    }

    /// Serialize `value` (arah write) atau timpa `value` dengan hasil decode
    /// (arah read).
    pub fn pass<T: Archive>(&mut self, value: &mut T) -> Result<&mut Self, ArchiveError> {
        match self {
            Self::Writing(writer) => {
                writer.serialize(value)?;
            }
            Self::Reading(reader) => reader.deserialize_into(value)?,
        }
        Ok(self)
    }

    /// Bytes yang sudah ditulis atau dikonsumsi.
    pub fn total_size(&self) -> usize {
        match self {
            Self::Writing(writer) => writer.total_size(),
            Self::Reading(reader) => reader.position(),
        }
    }
}

macro_rules! impl_archive_le {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Archive for $ty {
                #[inline(always)]
                fn serialize(&self, ar: &mut Writer<'_>) -> Result<usize, ArchiveError> {
                    ar.write(&self.to_le_bytes())
                }

                #[inline(always)]
                fn deserialize(ar: &mut Reader<'_>) -> Result<Self, ArchiveError> {
                    Ok(<$ty>::from_le_bytes(ar.read_array()?))
                }
            }
        )*
    };
}

impl_archive_le!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl Archive for usize {
    fn serialize(&self, ar: &mut Writer<'_>) -> Result<usize, ArchiveError> {
        (*self as u64).serialize(ar)
    }

    fn deserialize(ar: &mut Reader<'_>) -> Result<Self, ArchiveError> {
        let len = u64::deserialize(ar)?;
        usize::try_from(len).map_err(|_| ArchiveError::LengthOverflow(len))
    }
}

impl Archive for bool {
    fn serialize(&self, ar: &mut Writer<'_>) -> Result<usize, ArchiveError> {
        ar.write(&[*self as u8])
    }

    fn deserialize(ar: &mut Reader<'_>) -> Result<Self, ArchiveError> {
        match u8::deserialize(ar)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ArchiveError::InvalidBool(other)),
        }
    }
}

impl Archive for () {
    fn serialize(&self, _ar: &mut Writer<'_>) -> Result<usize, ArchiveError> {
        Ok(0)
    }

    fn deserialize(_ar: &mut Reader<'_>) -> Result<Self, ArchiveError> {
        Ok(())
    }
}

impl<const N: usize> Archive for [u8; N] {
    fn serialize(&self, ar: &mut Writer<'_>) -> Result<usize, ArchiveError> {
        ar.write(self)
    }

    fn deserialize(ar: &mut Reader<'_>) -> Result<Self, ArchiveError> {
        ar.read_array()
    }
}

impl Archive for String {
    fn serialize(&self, ar: &mut Writer<'_>) -> Result<usize, ArchiveError> {
        Ok(self.len().serialize(ar)? + ar.write(self.as_bytes())?)
    }

    fn deserialize(ar: &mut Reader<'_>) -> Result<Self, ArchiveError> {
        let len = usize::deserialize(ar)?;
        let bytes = ar.read(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ArchiveError::InvalidUtf8)
    }
}

impl<T: Archive> Archive for Vec<T> {
    fn serialize(&self, ar: &mut Writer<'_>) -> Result<usize, ArchiveError> {
        let mut written = self.len().serialize(ar)?;
        for item in self {
            written += item.serialize(ar)?;
        }
        Ok(written)
    }

    fn deserialize(ar: &mut Reader<'_>) -> Result<Self, ArchiveError> {
        let len = usize::deserialize(ar)?;
        // Elemen zero-sized tidak memakan input, jumlahnya dibatasi langsung
        if std::mem::size_of::<T>() == 0 {
            if len > MAX_ZERO_SIZED_ITEMS {
                return Err(ArchiveError::LengthTooLarge {
                    len,
                    limit: MAX_ZERO_SIZED_ITEMS,
                });
            }
        } else if len > ar.remaining() {
            return Err(ArchiveError::UnexpectedEnd {
                needed: len,
                remaining: ar.remaining(),
            });
        }

        let mut items = Vec::with_capacity(len);
        for _ in 0..len {
            items.push(T::deserialize(ar)?);
        }
        Ok(items)
    }
}

impl<T: Archive> Archive for Option<T> {
    fn serialize(&self, ar: &mut Writer<'_>) -> Result<usize, ArchiveError> {
        match self {
            None => ar.write(&[0]),
            Some(value) => Ok(ar.write(&[1])? + value.serialize(ar)?),
        }
    }

    fn deserialize(ar: &mut Reader<'_>) -> Result<Self, ArchiveError> {
        match u8::deserialize(ar)? {
            0 => Ok(None),
            1 => Ok(Some(T::deserialize(ar)?)),
            tag => Err(ArchiveError::InvalidTag {
                what: "option",
                tag,
            }),
        }
    }
}

macro_rules! impl_archive_tuple {
    ($(($ty:ident, $var:ident)),+) => {
        impl<$($ty: Archive),+> Archive for ($($ty,)+) {
            fn serialize(&self, ar: &mut Writer<'_>) -> Result<usize, ArchiveError> {
                let ($($var,)+) = self;
                let mut written = 0;
                $(written += $var.serialize(ar)?;)+
                Ok(written)
            }

            fn deserialize(ar: &mut Reader<'_>) -> Result<Self, ArchiveError> {
                Ok(($($ty::deserialize(ar)?,)+))
            }
        }
    };
}

impl_archive_tuple!((A, a));
impl_archive_tuple!((A, a), (B, b));
impl_archive_tuple!((A, a), (B, b), (C, c));
impl_archive_tuple!((A, a), (B, b), (C, c), (D, d));
impl_archive_tuple!((A, a), (B, b), (C, c), (D, d), (E, e));
impl_archive_tuple!((A, a), (B, b), (C, c), (D, d), (E, e), (F, f));

/// Implement [`Archive`](crate::core::Archive) untuk struct dari satu daftar
/// field. Urutan daftar = urutan di wire, untuk write dan read sekaligus.
///
/// ```
/// use kurir::archive_struct;
/// use kurir::core::{Reader, Writer};
///
/// #[derive(Debug, PartialEq)]
/// struct Account {
///     id: i32,
///     name: String,
/// }
///
/// archive_struct!(Account { id, name });
///
/// let mut buf = [0u8; 64];
/// let mut writer = Writer::new(&mut buf);
/// let account = Account { id: 1, name: "alice".into() };
/// let len = writer.serialize(&account)?;
///
/// let decoded: Account = Reader::new(&buf[..len]).deserialize()?;
/// assert_eq!(decoded, account);
/// # Ok::<(), kurir::core::ArchiveError>(())
/// ```
#[macro_export]
macro_rules! archive_struct {
    ($ty:ident { $($field:ident),+ $(,)? }) => {
        impl $crate::core::Archive for $ty {
            fn serialize(
                &self,
                ar: &mut $crate::core::Writer<'_>,
            ) -> ::std::result::Result<usize, $crate::core::ArchiveError> {
                let mut written = 0;
                $(written += $crate::core::Archive::serialize(&self.$field, ar)?;)+
                Ok(written)
            }

            fn deserialize(
                ar: &mut $crate::core::Reader<'_>,
            ) -> ::std::result::Result<Self, $crate::core::ArchiveError> {
                Ok(Self {
                    $($field: $crate::core::Archive::deserialize(ar)?,)+
                })
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: Archive + PartialEq + std::fmt::Debug>(value: T) {
        let mut buf = [0u8; 256];
        let mut writer = Writer::new(&mut buf);
        let written = writer.serialize(&value).unwrap();
        assert_eq!(writer.total_size(), written);

        let mut reader = Reader::new(&buf[..written]);
        let decoded: T = reader.deserialize().unwrap();
        reader.finish().unwrap();
        assert_eq!(decoded, value);
    }

    #[derive(Debug, PartialEq)]
    struct Account {
        id: i32,
        name: String,
        balance: f64,
        tags: Vec<u16>,
        active: bool,
    }

    crate::archive_struct!(Account {
        id,
        name,
        balance,
        tags,
        active
    });

    #[test]
    fn test_primitive_roundtrip() {
        roundtrip(0xABu8);
        roundtrip(-5i8);
        roundtrip(0xBEEFu16);
        roundtrip(i16::MIN);
        roundtrip(u32::MAX);
        roundtrip(-42i32);
        roundtrip(u64::MAX - 1);
        roundtrip(i64::MIN);
        roundtrip(3.5f32);
        roundtrip(-0.125f64);
        roundtrip(true);
        roundtrip(usize::MAX);
        roundtrip(());
    }

    #[test]
    fn test_aggregate_roundtrip() {
        roundtrip(String::from("halo, kurir"));
        roundtrip(String::new());
        roundtrip(vec![1u32, 2, 3]);
        roundtrip(Some(7i64));
        roundtrip(None::<u8>);
        roundtrip((1i32, String::from("alice")));
        roundtrip([9u8; 5]);
        roundtrip(Account {
            id: 1,
            name: "alice".into(),
            balance: 10.75,
            tags: vec![4, 8],
            active: true,
        });
    }

    #[test]
    fn test_little_endian_layout() {
        let mut buf = [0u8; 8];
        let mut writer = Writer::new(&mut buf);
        writer.serialize(&0x0102u16).unwrap();
        writer.serialize(&String::from("a")).unwrap_err();
        assert_eq!(writer.written(), &[0x02, 0x01]);
    }

    #[test]
    fn test_string_layout() {
        let mut buf = [0u8; 16];
        let mut writer = Writer::new(&mut buf);
        let written = writer.serialize(&String::from("hi")).unwrap();
        assert_eq!(written, 10);
        assert_eq!(&buf[..10], &[2, 0, 0, 0, 0, 0, 0, 0, b'h', b'i']);
    }

    #[test]
    fn test_write_overflow_is_checked() {
        let mut buf = [0u8; 3];
        let mut writer = Writer::new(&mut buf);
        writer.serialize(&1u16).unwrap();

        let err = writer.serialize(&1u16).unwrap_err();
        assert_eq!(
            err,
            ArchiveError::BufferOverflow {
                needed: 2,
                available: 1
            }
        );
        assert!(err.is_overflow());
        // Cursor tidak maju setelah gagal
        assert_eq!(writer.total_size(), 2);
    }

    #[test]
    fn test_read_past_end() {
        let mut reader = Reader::new(&[1, 2]);
        assert_eq!(
            reader.deserialize::<u32>().unwrap_err(),
            ArchiveError::UnexpectedEnd {
                needed: 4,
                remaining: 2
            }
        );
    }

    #[test]
    fn test_invalid_values() {
        assert_eq!(
            Reader::new(&[2]).deserialize::<bool>().unwrap_err(),
            ArchiveError::InvalidBool(2)
        );
        assert!(matches!(
            Reader::new(&[3, 0]).deserialize::<Option<u8>>(),
            Err(ArchiveError::InvalidTag { tag: 3, .. })
        ));

        let mut buf = [0u8; 10];
        buf[0] = 2;
        buf[8] = 0xff;
        buf[9] = 0xfe;
        assert_eq!(
            Reader::new(&buf).deserialize::<String>().unwrap_err(),
            ArchiveError::InvalidUtf8
        );
    }

    #[test]
    fn test_huge_length_prefix_does_not_allocate() {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&(u32::MAX as u64).to_le_bytes());
        let err = Reader::new(&buf).deserialize::<Vec<u64>>().unwrap_err();
        assert!(matches!(err, ArchiveError::UnexpectedEnd { .. }));
    }

    #[test]
    fn test_zero_sized_length_prefix_is_capped() {
        let buf = u64::MAX.to_le_bytes();
        let err = Reader::new(&buf).deserialize::<Vec<()>>().unwrap_err();
        assert!(matches!(err, ArchiveError::LengthTooLarge { .. }));
        assert!(!err.is_overflow());

        let buf = (MAX_ZERO_SIZED_ITEMS as u64).to_le_bytes();
        let units: Vec<()> = Reader::new(&buf).deserialize().unwrap();
        assert_eq!(units.len(), MAX_ZERO_SIZED_ITEMS);
    }

    #[test]
    fn test_trailing_bytes() {
        let mut reader = Reader::new(&[1, 0, 9]);
        assert_eq!(reader.deserialize::<u16>().unwrap(), 1);
        assert_eq!(
            reader.finish().unwrap_err(),
            ArchiveError::TrailingBytes { remaining: 1 }
        );
    }

    #[test]
    fn test_stream_both_directions() {
        let mut buf = [0u8; 64];
        let mut id = 5i32;
        let mut name = String::from("bob");

        let mut out = ArchiveStream::writing(&mut buf);
        assert_eq!(out.direction(), Direction::Serialize);
        out.pass(&mut id).unwrap().pass(&mut name).unwrap();
        let written = out.total_size();

        let mut id2 = 0i32;
        let mut name2 = String::new();
        let mut input = ArchiveStream::reading(&buf[..written]);
        assert_eq!(input.direction(), Direction::Deserialize);
        input.pass(&mut id2).unwrap().pass(&mut name2).unwrap();

        assert_eq!(input.total_size(), written);
        assert_eq!((id2, name2.as_str()), (5, "bob"));
    }
}
