//! Event loop berbasis mio
//!
//! Satu `Poll` per loop, dijalankan di thread sendiri. Thread lain
//! berinteraksi lewat `LoopHandle`; notifikasi (session tertutup, session
//! baru yang perlu read awal, shutdown) dikirim lewat `mio::Waker`.

use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Registry, Token, Waker};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::server::{Listener, Server};
use super::session::{tune_socket, CloseReason, MessageHandler, Session, SessionStats};
use crate::config::Config;
use crate::error::{Error, Result};

const WAKER_TOKEN: Token = Token(0);
const FIRST_TOKEN: usize = 1;

/// Notifikasi dari thread mana pun ke thread loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Notice {
    /// Session baru aktif: jalankan read lane sekali
    Activated,
    /// Session tertutup: lepas dari tabel loop
    Closed,
}

pub(crate) struct Notifier {
    waker: Waker,
    queue: Mutex<Vec<(Token, Notice)>>,
}

impl Notifier {
    fn push(&self, token: Token, notice: Notice) {
        self.queue.lock().push((token, notice));
        self.wake();
    }

    pub(crate) fn session_closed(&self, token: Token) {
        self.push(token, Notice::Closed);
    }

    fn wake(&self) {
        if let Err(e) = self.waker.wake() {
            warn!(error = %e, "failed to wake event loop");
        }
    }

    fn drain(&self) -> Vec<(Token, Notice)> {
        std::mem::take(&mut *self.queue.lock())
    }
}

/// State yang dibagi antara loop dan semua handle.
pub(crate) struct Shared {
    registry: Registry,
    notifier: Arc<Notifier>,
    sessions: Mutex<HashMap<Token, Arc<Session>>>,
    listeners: Mutex<HashMap<Token, Arc<Listener>>>,
    next_token: AtomicUsize,
    running: AtomicBool,
    config: Config,
}

impl Shared {
    #[inline(always)]
    fn next_token(&self) -> Token {
        Token(self.next_token.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Daftarkan listener; event baru diproses setelah entry ada di tabel.
    pub(crate) fn add_listener(
        &self,
        build: impl FnOnce(Token) -> io::Result<Listener>,
    ) -> io::Result<Arc<Listener>> {
        let token = self.next_token();
        let mut listeners = self.listeners.lock();
        let mut listener = build(token)?;
        self.registry
            .register(listener.source_mut(), token, Interest::READABLE)?;
        let listener = Arc::new(listener);
        listeners.insert(token, listener.clone());
        Ok(listener)
    }

    pub(crate) fn remove_listener(&self, token: Token) -> bool {
        self.listeners.lock().remove(&token).is_some()
    }

    /// Socket baru → session terdaftar di poll, belum punya handler.
    pub(crate) fn prepare(&self, mut stream: TcpStream, peer: SocketAddr) -> io::Result<Arc<Session>> {
        tune_socket(&stream, &self.config)?;
        let token = self.next_token();
        self.registry
            .register(&mut stream, token, Interest::READABLE | Interest::WRITABLE)?;
        Ok(Arc::new(Session::new(
            token,
            stream,
            peer,
            self.notifier.clone(),
        )))
    }

    /// Pasang handler, masukkan ke tabel, lalu minta loop membaca sekali.
    ///
    /// Readiness yang datang sebelum session ada di tabel diabaikan loop;
    /// notifikasi `Activated` menutup celah itu.
    ///
    /// `running` dicek di bawah lock tabel yang sama dengan `close_all`:
    /// loop yang sudah berhenti tidak pernah menerima session baru.
    pub(crate) fn activate(&self, session: &Arc<Session>, handler: Arc<dyn MessageHandler>) -> Result<()> {
        session.attach(handler);

        let inserted = {
            let mut sessions = self.sessions.lock();
            let running = self.running.load(Ordering::Acquire);
            if running {
                sessions.insert(session.token(), session.clone());
            }
            running
        };
        if !inserted {
            session.close_with(CloseReason::Shutdown);
            return Err(Error::ConnectionClosed);
        }

        self.notifier.push(session.token(), Notice::Activated);
        info!(peer = %session.peer_addr(), token = session.token().0, "session opened");
        Ok(())
    }
}

/// Handle thread-safe ke sebuah event loop.
#[derive(Clone)]
pub struct LoopHandle {
    shared: Arc<Shared>,
}

impl LoopHandle {
    /// Mulai listen di `addr`; koneksi yang diterima memakai handler dari
    /// `factory`.
    pub fn listen<A, H, F>(&self, addr: A, factory: F) -> Result<Server>
    where
        A: ToSocketAddrs,
        H: MessageHandler,
        F: Fn(Weak<Session>) -> H + Send + Sync + 'static,
    {
        Server::bind(self, addr, factory)
    }

    /// `listen` di `Config::bind_addr` milik loop ini.
    pub fn serve<H, F>(&self, factory: F) -> Result<Server>
    where
        H: MessageHandler,
        F: Fn(Weak<Session>) -> H + Send + Sync + 'static,
    {
        let addr = self.shared.config.bind_addr.clone();
        Server::bind(self, addr.as_str(), factory)
    }

    /// Connect ke peer (blocking sampai TCP handshake selesai), lalu
    /// serahkan socket ke loop.
    pub fn connect<A, H, F>(&self, addr: A, factory: F) -> Result<(Arc<Session>, Arc<H>)>
    where
        A: ToSocketAddrs,
        H: MessageHandler,
        F: FnOnce(Weak<Session>) -> H,
    {
        if !self.is_running() {
            return Err(Error::ConnectionClosed);
        }

        let stream = std::net::TcpStream::connect(addr)?;
        stream.set_nonblocking(true)?;
        let peer = stream.peer_addr()?;

        let session = self.shared.prepare(TcpStream::from_std(stream), peer)?;
        let handler = Arc::new(factory(Arc::downgrade(&session)));
        self.shared.activate(&session, handler.clone())?;
        Ok((session, handler))
    }

    /// Hentikan loop; semua session ditutup dengan `CloseReason::Shutdown`.
    pub fn shutdown(&self) {
        if self.shared.running.swap(false, Ordering::AcqRel) {
            info!("event loop shutdown requested");
            self.shared.notifier.wake();
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn session_count(&self) -> usize {
        self.shared.session_count()
    }

    /// Jumlah counter dari semua session yang masih aktif.
    pub fn stats(&self) -> SessionStats {
        let sessions: Vec<Arc<Session>> = self.shared.sessions.lock().values().cloned().collect();
        sessions.iter().map(|s| s.stats()).fold(SessionStats::default(), |mut acc, s| {
            acc.messages_sent += s.messages_sent;
            acc.messages_received += s.messages_received;
            acc.bytes_sent += s.bytes_sent;
            acc.bytes_received += s.bytes_received;
            acc.queued += s.queued;
            acc
        })
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }
}

/// Event loop: poll → dispatch readiness → proses notifikasi → ulangi.
pub struct EventLoop {
    poll: Poll,
    events: Events,
    shared: Arc<Shared>,
}

impl EventLoop {
    pub fn new(config: Config) -> io::Result<Self> {
        let poll = Poll::new()?;
        let waker = Waker::new(poll.registry(), WAKER_TOKEN)?;
        let registry = poll.registry().try_clone()?;

        Ok(Self {
            events: Events::with_capacity(config.events_capacity),
            poll,
            shared: Arc::new(Shared {
                registry,
                notifier: Arc::new(Notifier {
                    waker,
                    queue: Mutex::new(Vec::new()),
                }),
                sessions: Mutex::new(HashMap::new()),
                listeners: Mutex::new(HashMap::new()),
                next_token: AtomicUsize::new(FIRST_TOKEN),
                running: AtomicBool::new(true),
                config,
            }),
        })
    }

    /// Buat loop dan jalankan di thread `kurir-loop`.
    pub fn spawn(config: Config) -> io::Result<(LoopHandle, JoinHandle<io::Result<()>>)> {
        let event_loop = Self::new(config)?;
        let handle = event_loop.handle();
        let thread = thread::Builder::new()
            .name("kurir-loop".to_string())
            .spawn(move || event_loop.run())?;
        Ok((handle, thread))
    }

    pub fn handle(&self) -> LoopHandle {
        LoopHandle {
            shared: self.shared.clone(),
        }
    }

    /// Jalankan sampai `LoopHandle::shutdown()`.
    pub fn run(mut self) -> io::Result<()> {
        let timeout = Some(self.shared.config.poll_timeout);
        info!("event loop started");

        let result = loop {
            if !self.shared.running.load(Ordering::Acquire) {
                break Ok(());
            }

            if let Err(e) = self.poll.poll(&mut self.events, timeout) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                break Err(e);
            }

            for event in self.events.iter() {
                let token = event.token();
                if token == WAKER_TOKEN {
                    continue;
                }

                let listener = self.shared.listeners.lock().get(&token).cloned();
                if let Some(listener) = listener {
                    listener.accept_pending(&self.shared);
                    continue;
                }

                let session = self.shared.sessions.lock().get(&token).cloned();
                let Some(session) = session else {
                    // Session sudah tertutup atau belum aktif
                    continue;
                };

                if event.is_error() {
                    let err = session
                        .take_socket_error()
                        .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "socket error"));
                    session.close_with(CloseReason::Io(err));
                    continue;
                }
                if event.is_readable() || event.is_read_closed() {
                    session.on_readable();
                }
                if event.is_writable() {
                    session.on_writable();
                }
            }

            self.process_notices();
        };

        self.close_all();
        info!("event loop stopped");
        result
    }

    fn process_notices(&self) {
        for (token, notice) in self.shared.notifier.drain() {
            match notice {
                Notice::Activated => {
                    let session = self.shared.sessions.lock().get(&token).cloned();
                    if let Some(session) = session {
                        session.on_readable();
                    }
                }
                Notice::Closed => {
                    if self.shared.sessions.lock().remove(&token).is_some() {
                        debug!(token = token.0, "session released");
                    }
                }
            }
        }
    }

    fn close_all(&self) {
        self.shared.listeners.lock().clear();
        let sessions: Vec<Arc<Session>> = {
            let mut table = self.shared.sessions.lock();
            // Loop juga bisa berhenti karena error poll
            self.shared.running.store(false, Ordering::Release);
            table.drain().map(|(_, session)| session).collect()
        };
        for session in sessions {
            session.close_with(CloseReason::Shutdown);
        }
        self.shared.notifier.drain();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Message;
    use std::sync::mpsc;
    use std::time::Duration;

    fn local_config() -> Config {
        Config::default().with_bind_addr("127.0.0.1:0")
    }

    #[test]
    fn test_connect_and_echo() {
        let (handle, thread) = EventLoop::spawn(local_config()).unwrap();

        let server = handle
            .listen("127.0.0.1:0", |_| {
                |session: &Arc<Session>, message: Message| {
                    let _ = session.send(message);
                }
            })
            .unwrap();

        let (tx, rx) = mpsc::sync_channel(8);
        let (session, _) = handle
            .connect(server.local_addr(), move |_| {
                move |_: &Arc<Session>, message: Message| {
                    let _ = tx.send(message);
                }
            })
            .unwrap();

        let msg = Message::from_payload(0, b"echo\0").unwrap();
        session.send(msg.clone()).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), msg);

        let stats = session.stats();
        assert_eq!(stats.messages_sent, 1);
        assert_eq!(stats.messages_received, 1);

        handle.shutdown();
        thread.join().unwrap().unwrap();
        assert!(!session.is_open());
        assert!(matches!(session.send(msg), Err(Error::ConnectionClosed)));
    }

    #[test]
    fn test_connect_after_shutdown() {
        let (handle, thread) = EventLoop::spawn(local_config()).unwrap();
        handle.shutdown();
        thread.join().unwrap().unwrap();

        let result = handle.connect("127.0.0.1:1", |_| |_: &Arc<Session>, _: Message| {});
        assert!(matches!(result, Err(Error::ConnectionClosed)));
    }

    #[test]
    fn test_serve_binds_config_addr() {
        let (handle, thread) = EventLoop::spawn(local_config()).unwrap();

        let server = handle
            .serve(|_| |_: &Arc<Session>, _: Message| {})
            .unwrap();
        assert!(server.local_addr().ip().is_loopback());
        assert_ne!(server.local_addr().port(), 0);

        handle.shutdown();
        thread.join().unwrap().unwrap();
    }
}
