//! Interface contoh dan command loop interaktif
//!
//! Kedua sisi koneksi memasang table yang sama (peer-to-peer): server
//! membalas `ping` dengan `pong` ke client, client mencatat `pong`.

use std::io::{BufRead, Write};
use std::sync::{Arc, Weak};
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use crate::error::Result;
use crate::network::Session;
use crate::rpc::{trim_nul, DispatchTable, RemoteFn, RemoteProc, RpcConnection, RpcInterface};

pub const INSTANCE_ID: u16 = 0;
pub const DEFAULT_PORT: u16 = 7777;

pub const SEND_INT: RemoteProc<(i32,)> = RemoteProc::new(0, "sendInt");
pub const CREATE_ACCOUNT: RemoteProc<(i32, String)> = RemoteProc::new(1, "createAccount");
pub const PING: RemoteProc<()> = RemoteProc::new(2, "ping");
pub const PONG: RemoteProc<()> = RemoteProc::new(3, "pong");
pub const SQUARE: RemoteFn<(f64,), f64> = RemoteFn::new(4, "square");

/// Binding untuk semua fungsi contoh.
pub fn dispatch_table() -> DispatchTable {
    DispatchTable::builder()
        .bind_proc(SEND_INT, |value: i32| {
            info!(value, "received int");
        })
        .bind_proc(CREATE_ACCOUNT, |id: i32, name: String| {
            info!(id, %name, "account created");
        })
        .bind_proc_with_peer(PING, |peer: &RpcInterface| {
            info!("ping");
            if let Err(e) = peer.notify(PONG, ()) {
                peer.report(&e);
            }
        })
        .bind_proc(PONG, || {
            info!("pong");
        })
        .bind(SQUARE, |x: f64| x * x)
        .build()
}

/// Factory handler untuk `LoopHandle::listen`/`connect`.
pub fn connection(session: Weak<Session>, table: Arc<DispatchTable>) -> RpcConnection {
    RpcConnection::new(session, INSTANCE_ID, table).on_text(|session: &Arc<Session>, text: &[u8]| {
        info!(
            peer = %session.peer_addr(),
            text = %String::from_utf8_lossy(trim_nul(text)),
            "received text"
        );
    })
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("usage: {0}")]
    Usage(&'static str),
}

/// Satu baris input command loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SendInt(i32),
    CreateAccount(i32, String),
    Ping,
    Square(f64),
    /// Selain command di atas: dikirim sebagai teks NUL-terminated
    Text(String),
    Quit,
}

impl Command {
    /// Parse satu baris; `None` untuk baris kosong.
    pub fn parse(line: &str) -> std::result::Result<Option<Self>, CommandError> {
        let line = line.trim();
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Ok(None);
        };

        let command = match head {
            "sendInt" => {
                let value = words
                    .next()
                    .and_then(|w| w.parse().ok())
                    .ok_or(CommandError::Usage("sendInt <int>"))?;
                Self::SendInt(value)
            }
            "createAccount" => {
                let id = words
                    .next()
                    .and_then(|w| w.parse().ok())
                    .ok_or(CommandError::Usage("createAccount <id> <name>"))?;
                let name = words
                    .next()
                    .ok_or(CommandError::Usage("createAccount <id> <name>"))?;
                Self::CreateAccount(id, name.to_string())
            }
            "ping" => Self::Ping,
            "square" => {
                let value = words
                    .next()
                    .and_then(|w| w.parse().ok())
                    .ok_or(CommandError::Usage("square <number>"))?;
                Self::Square(value)
            }
            "quit" | "exit" => Self::Quit,
            _ => Self::Text(line.to_string()),
        };
        Ok(Some(command))
    }

    /// Jalankan command lewat koneksi. Return teks untuk ditampilkan.
    pub fn execute(&self, conn: &RpcConnection, timeout: Duration) -> Result<Option<String>> {
        let rpc = conn.interface();
        match self {
            Self::SendInt(value) => rpc.notify(SEND_INT, (*value,))?,
            Self::CreateAccount(id, name) => rpc.notify(CREATE_ACCOUNT, (*id, name.clone()))?,
            Self::Ping => rpc.notify(PING, ())?,
            Self::Square(x) => {
                let result = rpc.call(SQUARE, (*x,))?.wait_timeout(timeout)?;
                return Ok(Some(format!("square({}) = {}", x, result)));
            }
            Self::Text(text) => {
                let mut bytes = Vec::with_capacity(text.len() + 1);
                bytes.extend_from_slice(text.as_bytes());
                bytes.push(0);
                conn.send_text(&bytes)?;
            }
            Self::Quit => conn.close(),
        }
        Ok(None)
    }
}

/// Command loop: baca baris dari `input` sampai EOF, `quit`, atau koneksi
/// putus. Output dan pesan error ditulis ke `output`.
pub fn run_repl<R: BufRead, W: Write>(
    input: R,
    mut output: W,
    conn: &RpcConnection,
    timeout: Duration,
) -> Result<()> {
    for line in input.lines() {
        let line = line?;
        let command = match Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                writeln!(output, "{}", e)?;
                continue;
            }
        };

        match command.execute(conn, timeout) {
            Ok(Some(text)) => writeln!(output, "{}", text)?,
            Ok(None) => {}
            Err(e) => writeln!(output, "error: {}", e)?,
        }

        let closed = conn.session().map_or(true, |s| !s.is_open());
        if command == Command::Quit || closed {
            break;
        }
    }
    Ok(())
}
