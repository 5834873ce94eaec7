//! Kurir - Peer-to-peer RPC di atas framed TCP messages
//!
//! Arsitektur:
//! - `core`: binary archive (satu deskripsi per tipe, dua arah) dan payload
//!   1KB yang bounds-checked
//! - `protocol`: frame 4-byte header `[id: u16][len: u16]` dan reader/writer
//!   untuk socket non-blocking
//! - `network`: event loop mio, session dengan read lane dan write lane FIFO,
//!   acceptor
//! - `rpc`: packet, dispatch table, pending-call table, `CallFuture`
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use kurir::demo::{self, SQUARE};
//! use kurir::network::EventLoop;
//! use kurir::Config;
//!
//! let (handle, _thread) = EventLoop::spawn(Config::default())?;
//! let table = Arc::new(demo::dispatch_table());
//!
//! let server_table = table.clone();
//! let server = handle.listen("127.0.0.1:7777", move |session| {
//!     demo::connection(session, server_table.clone())
//! })?;
//!
//! let (_session, conn) = handle.connect(server.local_addr(), |session| {
//!     demo::connection(session, table)
//! })?;
//! let nine = conn
//!     .interface()
//!     .call(SQUARE, (3.0,))?
//!     .wait_timeout(Duration::from_secs(1))?;
//! assert_eq!(nine, 9.0);
//! # Ok::<(), kurir::Error>(())
//! ```

pub mod config;
pub mod core;
pub mod demo;
pub mod error;
pub mod logging;
pub mod network;
pub mod protocol;
pub mod rpc;

pub use config::Config;
pub use error::{Error, Result};
