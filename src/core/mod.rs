//! Core module: Binary Archive dan payload buffer
//!
//! Prinsip desain:
//! - Satu deskripsi per tipe: write dan read tidak pernah diduplikasi
//! - Little-endian eksplisit: encoding tidak tergantung host
//! - Bounds-checked: overflow jadi error, bukan memory corruption

mod archive;
mod payload;

pub use archive::{Archive, ArchiveError, ArchiveStream, Direction, Reader, Writer};
pub use payload::{PayloadBuffer, PAYLOAD_CAPACITY};
