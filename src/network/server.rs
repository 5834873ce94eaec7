//! Server/Acceptor
//!
//! Listener non-blocking yang terdaftar di event loop. Accept berjalan di
//! thread loop: accept → session → read lane → accept lagi sampai
//! `WouldBlock`. Error accept hanya dicatat, listener tetap hidup.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use mio::net::TcpListener;
use mio::Token;
use tracing::{debug, info, warn};

use super::reactor::{LoopHandle, Shared};
use super::session::{MessageHandler, Session};
use crate::error::{Error, Result};

type HandlerFactory = Box<dyn Fn(Weak<Session>) -> Arc<dyn MessageHandler> + Send + Sync>;

/// Counter acceptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub accepted: u64,
    pub rejected: u64,
    pub accept_errors: u64,
}

#[derive(Default)]
struct Counters {
    accepted: AtomicU64,
    rejected: AtomicU64,
    accept_errors: AtomicU64,
}

pub(crate) struct Listener {
    token: Token,
    local_addr: SocketAddr,
    listener: TcpListener,
    factory: HandlerFactory,
    counters: Arc<Counters>,
}

impl Listener {
    pub(crate) fn source_mut(&mut self) -> &mut TcpListener {
        &mut self.listener
    }

    /// Accept semua koneksi yang menunggu di backlog.
    pub(crate) fn accept_pending(&self, shared: &Shared) {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    if shared.session_count() >= shared.config().max_connections {
                        self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                        warn!(peer = %addr, "max connections reached, rejecting");
                        continue;
                    }

                    match shared.prepare(stream, addr) {
                        Ok(session) => {
                            let handler = (self.factory)(Arc::downgrade(&session));
                            if let Err(e) = shared.activate(&session, handler) {
                                debug!(peer = %addr, error = %e, "loop stopped, session dropped");
                                break;
                            }
                            self.counters.accepted.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            self.counters.accept_errors.fetch_add(1, Ordering::Relaxed);
                            warn!(peer = %addr, error = %e, "failed to set up session");
                        }
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    // Mis. EMFILE: coba lagi di readiness berikutnya
                    self.counters.accept_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(addr = %self.local_addr, error = %e, "accept failed");
                    break;
                }
            }
        }
    }
}

/// Handle ke listener yang berjalan di sebuah event loop.
pub struct Server {
    token: Token,
    local_addr: SocketAddr,
    counters: Arc<Counters>,
    handle: LoopHandle,
}

impl Server {
    /// Bind dan mulai accept. Gagal langsung jika bind/listen gagal.
    pub fn bind<A, H, F>(handle: &LoopHandle, addr: A, factory: F) -> Result<Self>
    where
        A: ToSocketAddrs,
        H: MessageHandler,
        F: Fn(Weak<Session>) -> H + Send + Sync + 'static,
    {
        let addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| Error::InvalidAddress("no socket address".to_string()))?;

        let std_listener = std::net::TcpListener::bind(addr)?;
        std_listener.set_nonblocking(true)?;
        let local_addr = std_listener.local_addr()?;

        let counters = Arc::new(Counters::default());
        let factory: HandlerFactory =
            Box::new(move |session| Arc::new(factory(session)) as Arc<dyn MessageHandler>);

        let listener = handle.shared().add_listener(|token| {
            Ok(Listener {
                token,
                local_addr,
                listener: TcpListener::from_std(std_listener),
                factory,
                counters: counters.clone(),
            })
        })?;

        info!(addr = %local_addr, "listening");
        Ok(Self {
            token: listener.token,
            local_addr,
            counters,
            handle: handle.clone(),
        })
    }

    /// Alamat yang benar-benar di-bind (berguna untuk port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            accepted: self.counters.accepted.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            accept_errors: self.counters.accept_errors.load(Ordering::Relaxed),
        }
    }

    /// Berhenti accept. Session yang sudah ada tidak tersentuh.
    pub fn close(&self) {
        if self.handle.shared().remove_listener(self.token) {
            info!(addr = %self.local_addr, "listener closed");
        }
    }
}
