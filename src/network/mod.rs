//! Network Layer: session, event loop, dan acceptor
//!
//! Menggunakan mio untuk cross-platform non-blocking I/O
//! (epoll/kqueue/IOCP).
//!
//! Fitur:
//! - Satu thread loop per `EventLoop`, dikontrol lewat `LoopHandle`
//! - Write lane FIFO per session, write pertama langsung dari thread pengirim
//! - Accept kontinu dengan batas `max_connections`

mod reactor;
mod server;
mod session;

pub use reactor::{EventLoop, LoopHandle};
pub use server::{Server, ServerStats};
pub use session::{CloseReason, MessageHandler, Session, SessionStats};
