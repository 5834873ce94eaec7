//! Frame reader/writer untuk socket non-blocking
//!
//! Reader: state machine header → body, tahan partial read.
//! Writer: antrian FIFO dengan satu write in-flight dan cursor offset
//! untuk partial write.

use std::collections::VecDeque;
use std::io::{self, Read, Write};

use super::message::{Message, PendingMessage, HEADER_SIZE};

/// Posisi read lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    AwaitingHeader,
    AwaitingBody,
}

/// Hasil satu langkah read.
#[derive(Debug)]
pub enum ReadEvent {
    /// Satu message lengkap siap di-dispatch
    Message(Message),
    /// Socket belum punya data lagi
    WouldBlock,
    /// Peer menutup koneksi di batas frame
    Closed,
}

/// Reassembly message dari stream: baca tepat 4 bytes header, lalu tepat
/// `payload_len` bytes body.
pub struct FrameReader {
    header: [u8; HEADER_SIZE],
    header_filled: usize,
    body: Option<PendingMessage>,
}

impl FrameReader {
    pub fn new() -> Self {
        Self {
            header: [0u8; HEADER_SIZE],
            header_filled: 0,
            body: None,
        }
    }

    pub fn state(&self) -> ReadState {
        match self.body {
            Some(_) => ReadState::AwaitingBody,
            None => ReadState::AwaitingHeader,
        }
    }

    /// Baca sampai satu message lengkap, `WouldBlock`, atau EOF.
    ///
    /// EOF di tengah frame adalah `UnexpectedEof`.
    pub fn poll_read<R: Read>(&mut self, src: &mut R) -> io::Result<ReadEvent> {
        loop {
            if let Some(pending) = self.body.as_mut() {
                if !pending.is_complete() {
                    match src.read(pending.unfilled_mut()) {
                        Ok(0) => return Err(truncated("body")),
                        Ok(n) => pending.advance(n),
                        Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                            return Ok(ReadEvent::WouldBlock);
                        }
                        Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                        Err(e) => return Err(e),
                    }
                    continue;
                }

                // Body lengkap: pindahkan message keluar, kembali ke header
                if let Some(msg) = self.body.take().and_then(PendingMessage::finish) {
                    return Ok(ReadEvent::Message(msg));
                }
                continue;
            }

            match src.read(&mut self.header[self.header_filled..]) {
                Ok(0) if self.header_filled == 0 => return Ok(ReadEvent::Closed),
                Ok(0) => return Err(truncated("header")),
                Ok(n) => {
                    self.header_filled += n;
                    if self.header_filled == HEADER_SIZE {
                        self.header_filled = 0;
                        self.body = Some(Message::from_header(self.header));
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(ReadEvent::WouldBlock);
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

fn truncated(part: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("connection closed in the middle of a frame {}", part),
    )
}

/// Ringkasan satu putaran drain write lane.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteReport {
    /// Message yang selesai ditulis penuh
    pub frames: usize,
    /// Bytes yang diterima socket
    pub bytes: usize,
    /// `true` jika antrian kosong (lane idle)
    pub drained: bool,
}

/// Antrian outbound FIFO. Front entry adalah write yang sedang in-flight.
pub struct FrameWriter {
    queue: VecDeque<Message>,
    offset: usize,
}

impl FrameWriter {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            offset: 0,
        }
    }

    /// Tambah message ke belakang antrian.
    ///
    /// Return `true` jika lane sebelumnya idle, artinya caller harus memulai
    /// write sekarang.
    pub fn push(&mut self, msg: Message) -> bool {
        let was_idle = self.queue.is_empty();
        self.queue.push_back(msg);
        was_idle
    }

    #[inline(always)]
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    /// Message yang menunggu (termasuk yang in-flight).
    #[inline(always)]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Tulis front entry, pop setelah selesai, lanjut ke entry berikutnya
    /// sampai antrian kosong atau socket `WouldBlock`.
    pub fn poll_write<W: Write>(&mut self, dst: &mut W) -> io::Result<WriteReport> {
        let mut report = WriteReport::default();

        while let Some(front) = self.queue.front() {
            let remaining = &front.as_bytes()[self.offset..];
            match dst.write(remaining) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "Failed to write to socket",
                    ));
                }
                Ok(n) => {
                    report.bytes += n;
                    self.offset += n;
                    if self.offset == front.total_size() {
                        self.queue.pop_front();
                        self.offset = 0;
                        report.frames += 1;
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(report),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }

        report.drained = true;
        Ok(report)
    }

    /// Buang semua message yang belum terkirim.
    pub fn clear(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        self.offset = 0;
        dropped
    }
}

impl Default for FrameWriter {
    fn default() -> Self {
        Self::new()
    }
}
