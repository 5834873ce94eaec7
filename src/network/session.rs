//! Session: satu socket, read lane dan write lane
//!
//! - Read lane hanya dijalankan oleh thread event loop: header → body →
//!   dispatch ke handler secara sinkron → header lagi.
//! - Write lane: antrian FIFO di bawah mutex. `send()` dari thread mana pun;
//!   jika lane idle, write langsung dimulai di thread pemanggil (non-blocking).
//!   Sisa write setelah `WouldBlock` dilanjutkan event loop saat socket
//!   writable. Paling banyak satu write in-flight per session.

use std::fmt;
use std::io;
use std::net::{Shutdown, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use mio::net::TcpStream;
use mio::Token;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::reactor::Notifier;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::protocol::{FrameReader, FrameWriter, Message, ReadEvent};

/// Callback untuk message inbound yang sudah lengkap.
///
/// Dipanggil dari thread event loop, satu message per waktu, sesuai urutan
/// kedatangan. Jangan blocking di sini (misalnya menunggu `CallFuture`).
pub trait MessageHandler: Send + Sync + 'static {
    fn on_message(&self, session: &Arc<Session>, message: Message);

    /// Dipanggil tepat sekali saat session tertutup.
    fn on_closed(&self, _session: &Session, _reason: &CloseReason) {}
}

impl<F> MessageHandler for F
where
    F: Fn(&Arc<Session>, Message) + Send + Sync + 'static,
{
    fn on_message(&self, session: &Arc<Session>, message: Message) {
        self(session, message)
    }
}

/// Alasan session berakhir.
#[derive(Debug)]
pub enum CloseReason {
    /// Peer menutup koneksi di batas frame
    PeerClosed,
    /// `Session::close()` dipanggil aplikasi
    Local,
    /// Event loop berhenti
    Shutdown,
    /// Error I/O di read atau write lane
    Io(io::Error),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerClosed => write!(f, "peer closed the connection"),
            Self::Local => write!(f, "closed locally"),
            Self::Shutdown => write!(f, "event loop shut down"),
            Self::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

/// Snapshot counter per session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// Message di write queue (termasuk yang in-flight)
    pub queued: usize,
}

#[derive(Default)]
struct Counters {
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
}

/// Satu koneksi TCP yang sudah terdaftar di event loop.
///
/// Selalu dipegang lewat `Arc`; event loop, handler (via `Weak`), dan
/// aplikasi berbagi ownership sampai semua operasi selesai.
pub struct Session {
    token: Token,
    peer_addr: SocketAddr,
    stream: TcpStream,
    reader: Mutex<FrameReader>,
    writer: Mutex<FrameWriter>,
    handler: OnceLock<Arc<dyn MessageHandler>>,
    open: AtomicBool,
    notifier: Arc<Notifier>,
    counters: Counters,
}

impl Session {
    pub(crate) fn new(
        token: Token,
        stream: TcpStream,
        peer_addr: SocketAddr,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            token,
            peer_addr,
            stream,
            reader: Mutex::new(FrameReader::new()),
            writer: Mutex::new(FrameWriter::new()),
            handler: OnceLock::new(),
            open: AtomicBool::new(true),
            notifier,
            counters: Counters::default(),
        }
    }

    /// Pasang handler sebelum session dimasukkan ke event loop.
    pub(crate) fn attach(&self, handler: Arc<dyn MessageHandler>) {
        if self.handler.set(handler).is_err() {
            warn!(token = self.token.0, "session handler already attached");
        }
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.stream.local_addr()
    }

    #[inline(always)]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Masukkan message ke write queue. Jika tidak ada write in-flight,
    /// write dimulai sekarang di thread ini.
    pub fn send(&self, message: Message) -> Result<()> {
        if !self.is_open() {
            return Err(Error::ConnectionClosed);
        }

        let outcome = {
            let mut writer = self.writer.lock();
            if writer.push(message) {
                self.drain(&mut writer)
            } else {
                Ok(())
            }
        };

        // Close di luar lock write lane
        if let Err(e) = outcome {
            error!(peer = %self.peer_addr, error = %e, "write failed");
            self.close_with(CloseReason::Io(e));
            return Err(Error::ConnectionClosed);
        }
        Ok(())
    }

    /// Tutup session: socket di-shutdown, antrian dibuang, handler diberi
    /// tahu. Aman dipanggil berkali-kali.
    pub fn close(&self) {
        self.close_with(CloseReason::Local);
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            messages_sent: self.counters.messages_sent.load(Ordering::Relaxed),
            messages_received: self.counters.messages_received.load(Ordering::Relaxed),
            bytes_sent: self.counters.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.counters.bytes_received.load(Ordering::Relaxed),
            queued: self.writer.lock().pending(),
        }
    }

    /// Read lane: baca dan dispatch sampai socket `WouldBlock`.
    pub(crate) fn on_readable(self: &Arc<Self>) {
        while self.is_open() {
            let event = {
                let mut reader = self.reader.lock();
                reader.poll_read(&mut &self.stream)
            };

            match event {
                Ok(ReadEvent::Message(message)) => {
                    self.counters
                        .messages_received
                        .fetch_add(1, Ordering::Relaxed);
                    self.counters
                        .bytes_received
                        .fetch_add(message.total_size() as u64, Ordering::Relaxed);
                    debug!(
                        peer = %self.peer_addr,
                        id = message.id(),
                        len = message.payload_size(),
                        "frame received"
                    );

                    match self.handler.get() {
                        Some(handler) => handler.on_message(self, message),
                        None => warn!(peer = %self.peer_addr, "no handler attached, frame dropped"),
                    }
                }
                Ok(ReadEvent::WouldBlock) => return,
                Ok(ReadEvent::Closed) => {
                    self.close_with(CloseReason::PeerClosed);
                    return;
                }
                Err(e) => {
                    error!(peer = %self.peer_addr, error = %e, "read failed");
                    self.close_with(CloseReason::Io(e));
                    return;
                }
            }
        }
    }

    /// Write lane: lanjutkan write yang tertahan `WouldBlock`.
    pub(crate) fn on_writable(&self) {
        if !self.is_open() {
            return;
        }

        let outcome = {
            let mut writer = self.writer.lock();
            self.drain(&mut writer)
        };

        if let Err(e) = outcome {
            error!(peer = %self.peer_addr, error = %e, "write failed");
            self.close_with(CloseReason::Io(e));
        }
    }

    pub(crate) fn take_socket_error(&self) -> Option<io::Error> {
        match self.stream.take_error() {
            Ok(err) => err,
            Err(e) => Some(e),
        }
    }

    pub(crate) fn close_with(&self, reason: CloseReason) {
        if !self.open.swap(false, Ordering::AcqRel) {
            return;
        }

        let _ = self.stream.shutdown(Shutdown::Both);
        let dropped = self.writer.lock().clear();

        match &reason {
            CloseReason::Io(_) => {
                warn!(peer = %self.peer_addr, %reason, dropped, "session closed")
            }
            _ => info!(peer = %self.peer_addr, %reason, dropped, "session closed"),
        }

        if let Some(handler) = self.handler.get() {
            handler.on_closed(self, &reason);
        }
        self.notifier.session_closed(self.token);
    }

    fn drain(&self, writer: &mut FrameWriter) -> io::Result<()> {
        let report = writer.poll_write(&mut &self.stream)?;
        self.counters
            .messages_sent
            .fetch_add(report.frames as u64, Ordering::Relaxed);
        self.counters
            .bytes_sent
            .fetch_add(report.bytes as u64, Ordering::Relaxed);
        Ok(())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &self.token.0)
            .field("peer_addr", &self.peer_addr)
            .field("open", &self.is_open())
            .finish()
    }
}

/// TCP_NODELAY dan ukuran socket buffer sesuai config.
pub(crate) fn tune_socket(stream: &TcpStream, config: &Config) -> io::Result<()> {
    stream.set_nodelay(config.nodelay)?;

    #[cfg(unix)]
    if let Some(size) = config.socket_buffer_size {
        use std::os::unix::io::AsRawFd;

        let fd = stream.as_raw_fd();
        let optval = size.min(libc::c_int::MAX as usize) as libc::c_int;
        for opt in [libc::SO_SNDBUF, libc::SO_RCVBUF] {
            // Tidak semua platform menerima ukuran ini, cukup dicatat
            let rc = unsafe {
                libc::setsockopt(
                    fd,
                    libc::SOL_SOCKET,
                    opt,
                    &optval as *const _ as *const libc::c_void,
                    std::mem::size_of::<libc::c_int>() as libc::socklen_t,
                )
            };
            if rc != 0 {
                debug!(error = %io::Error::last_os_error(), "setsockopt failed");
            }
        }
    }

    Ok(())
}
