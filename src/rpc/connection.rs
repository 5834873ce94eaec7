//! Jembatan session ↔ RPC interface
//!
//! `RpcConnection` adalah `MessageHandler` untuk satu session: frame
//! `RpcCall` di-decode jadi packet dan diserahkan ke interface, frame
//! `PlainText` ke callback teks.

use std::sync::{Arc, Weak};

use tracing::{info, warn};

use super::dispatch::DispatchTable;
use super::interface::{PacketSink, RpcInterface};
use super::packet::RpcPacket;
use crate::error::{Error, Result};
use crate::network::{CloseReason, MessageHandler, Session};
use crate::protocol::{Message, MessageId};

/// `PacketSink` di atas session; `Weak` supaya tidak ada siklus
/// session → handler → session.
pub struct SessionSink(Weak<Session>);

impl SessionSink {
    pub fn new(session: Weak<Session>) -> Self {
        Self(session)
    }
}

impl PacketSink for SessionSink {
    fn send_packet(&self, packet: &RpcPacket) -> Result<()> {
        let session = self.0.upgrade().ok_or(Error::ConnectionClosed)?;
        session.send(packet.to_message()?)
    }
}

pub type TextHandler = Box<dyn Fn(&Arc<Session>, &[u8]) + Send + Sync>;

pub struct RpcConnection {
    session: Weak<Session>,
    interface: RpcInterface,
    on_text: Option<TextHandler>,
}

impl RpcConnection {
    pub fn new(session: Weak<Session>, instance_id: u16, dispatch: impl Into<Arc<DispatchTable>>) -> Self {
        let sink = SessionSink::new(session.clone());
        Self {
            session,
            interface: RpcInterface::new(instance_id, dispatch, sink),
            on_text: None,
        }
    }

    /// Callback untuk frame `PlainText`. Tanpa callback, teks dicatat di
    /// level info.
    pub fn on_text(mut self, handler: impl Fn(&Arc<Session>, &[u8]) + Send + Sync + 'static) -> Self {
        self.on_text = Some(Box::new(handler));
        self
    }

    pub fn with_error_hook(mut self, hook: impl Fn(&Error) + Send + Sync + 'static) -> Self {
        self.interface = self.interface.with_error_hook(hook);
        self
    }

    #[inline(always)]
    pub fn interface(&self) -> &RpcInterface {
        &self.interface
    }

    pub fn session(&self) -> Option<Arc<Session>> {
        self.session.upgrade()
    }

    /// Kirim frame `PlainText`.
    pub fn send_text(&self, text: &[u8]) -> Result<()> {
        let session = self.session().ok_or(Error::ConnectionClosed)?;
        session.send(Message::from_payload(MessageId::PlainText.into(), text)?)
    }

    pub fn close(&self) {
        if let Some(session) = self.session() {
            session.close();
        }
    }
}

impl MessageHandler for RpcConnection {
    fn on_message(&self, session: &Arc<Session>, message: Message) {
        match MessageId::from_u16(message.id()) {
            Some(MessageId::PlainText) => match &self.on_text {
                Some(handler) => handler(session, message.payload()),
                None => info!(
                    peer = %session.peer_addr(),
                    text = %String::from_utf8_lossy(trim_nul(message.payload())),
                    "plain text"
                ),
            },
            Some(MessageId::RpcCall) => match RpcPacket::from_message(&message) {
                Ok(packet) => self.interface.on_packet(packet),
                Err(e) => self.interface.report(&e),
            },
            None => self.interface.report(&Error::UnknownMessage(message.id())),
        }
    }

    fn on_closed(&self, session: &Session, reason: &CloseReason) {
        let failed = self.interface.fail_pending();
        if failed > 0 {
            warn!(peer = %session.peer_addr(), %reason, failed, "pending calls failed");
        }
    }
}

/// Potong NUL terminator dan semua setelahnya.
pub fn trim_nul(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|&b| b == 0) {
        Some(end) => &bytes[..end],
        None => bytes,
    }
}
