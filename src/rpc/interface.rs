//! RPC interface: proxy lokal untuk call keluar dan dispatch untuk call masuk

use std::sync::Arc;

use tracing::{debug, warn};

use super::dispatch::{DispatchTable, RemoteFn, RemoteProc};
use super::packet::{CallKind, RpcPacket};
use super::pending::{CallFuture, PendingCalls};
use crate::core::{Archive, PayloadBuffer};
use crate::error::{Error, Result};

/// Transport yang dipakai interface untuk mengirim packet.
pub trait PacketSink: Send + Sync {
    fn send_packet(&self, packet: &RpcPacket) -> Result<()>;
}

/// Callback untuk error dispatch (fungsi tidak dikenal, payload salah, dst).
pub type ErrorHook = Box<dyn Fn(&Error) + Send + Sync>;

struct Detached;

impl PacketSink for Detached {
    fn send_packet(&self, _packet: &RpcPacket) -> Result<()> {
        Err(Error::ConnectionClosed)
    }
}

/// Satu endpoint RPC di atas satu koneksi.
///
/// Call keluar: serialize argumen → daftarkan continuation → kirim packet.
/// Packet masuk: Call di-dispatch ke handler, Return menyelesaikan call
/// yang menunggu.
pub struct RpcInterface {
    instance_id: u16,
    dispatch: Arc<DispatchTable>,
    pending: Arc<PendingCalls>,
    sink: Box<dyn PacketSink>,
    on_error: ErrorHook,
}

impl RpcInterface {
    pub fn new(
        instance_id: u16,
        dispatch: impl Into<Arc<DispatchTable>>,
        sink: impl PacketSink + 'static,
    ) -> Self {
        Self {
            instance_id,
            dispatch: dispatch.into(),
            pending: Arc::new(PendingCalls::new()),
            sink: Box::new(sink),
            on_error: Box::new(|e: &Error| warn!(error = %e, "rpc dispatch error")),
        }
    }

    /// Interface tanpa transport: setiap pengiriman gagal dengan
    /// `ConnectionClosed`.
    pub fn detached(instance_id: u16, dispatch: impl Into<Arc<DispatchTable>>) -> Self {
        Self::new(instance_id, dispatch, Detached)
    }

    /// Ganti hook error (default: `tracing::warn!`).
    pub fn with_error_hook(mut self, hook: impl Fn(&Error) + Send + Sync + 'static) -> Self {
        self.on_error = Box::new(hook);
        self
    }

    #[inline(always)]
    pub fn instance_id(&self) -> u16 {
        self.instance_id
    }

    pub fn dispatch_table(&self) -> &DispatchTable {
        &self.dispatch
    }

    /// Jumlah call yang masih menunggu Return.
    pub fn pending_calls(&self) -> usize {
        self.pending.len()
    }

    /// Panggil fungsi remote yang mengembalikan nilai.
    ///
    /// Argumen yang melebihi kapasitas payload gagal dengan `BufferOverflow`
    /// sebelum apa pun dikirim.
    pub fn call<A, R>(&self, function: RemoteFn<A, R>, args: A) -> Result<CallFuture<R>>
    where
        A: Archive,
        R: Archive + Send + 'static,
    {
        let payload = PayloadBuffer::from_args(&args)?;
        let future = self.pending.register::<R>();
        let packet = RpcPacket::call(self.instance_id, function.id(), future.call_id(), payload);

        debug!(function = function.name(), call_id = future.call_id(), "calling");
        // Gagal kirim: future di-drop, entry ikut terhapus
        self.sink.send_packet(&packet)?;
        Ok(future)
    }

    /// Panggil fungsi remote tanpa nilai balik; tidak ada yang didaftarkan.
    pub fn notify<A: Archive>(&self, function: RemoteProc<A>, args: A) -> Result<()> {
        let payload = PayloadBuffer::from_args(&args)?;
        let call_id = self.pending.next_notify_id();
        let packet = RpcPacket::call(self.instance_id, function.id(), call_id, payload);

        debug!(function = function.name(), "notifying");
        self.sink.send_packet(&packet)
    }

    /// Proses packet masuk; error dilaporkan lewat hook, tidak dilempar.
    pub fn on_packet(&self, packet: RpcPacket) {
        if let Err(e) = self.handle_packet(packet) {
            self.report(&e);
        }
    }

    /// Proses packet masuk dan kembalikan error dispatch ke caller.
    pub fn handle_packet(&self, packet: RpcPacket) -> Result<()> {
        match packet.call_kind {
            CallKind::Call => {
                if packet.instance_id != self.instance_id {
                    return Err(Error::UnknownInstance {
                        instance_id: packet.instance_id,
                        local: self.instance_id,
                    });
                }

                let binding = self.dispatch.lookup(packet.function_id).ok_or(
                    Error::UnknownFunction {
                        instance_id: packet.instance_id,
                        function_id: packet.function_id,
                    },
                )?;

                debug!(function = binding.name(), call_id = packet.call_id, "dispatching");
                if let Some(result) = binding.invoke(self, &packet.payload)? {
                    self.sink
                        .send_packet(&packet.reply(self.instance_id, result))?;
                }
                Ok(())
            }
            CallKind::Return => {
                if !self.pending.resolve(packet.call_id, &packet.payload) {
                    debug!(call_id = packet.call_id, "stale reply dropped");
                }
                Ok(())
            }
        }
    }

    /// Gagalkan semua call yang menunggu (koneksi putus).
    pub fn fail_pending(&self) -> usize {
        self.pending.fail_all(|| Error::ConnectionClosed)
    }

    pub fn report(&self, error: &Error) {
        (self.on_error)(error)
    }
}

impl std::fmt::Debug for RpcInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcInterface")
            .field("instance_id", &self.instance_id)
            .field("dispatch", &self.dispatch)
            .field("pending", &self.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PAYLOAD_CAPACITY;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::mpsc;
    use std::time::Duration;

    const SQUARE: RemoteFn<(f64,), f64> = RemoteFn::new(4, "square");
    const CREATE_ACCOUNT: RemoteProc<(i32, String)> = RemoteProc::new(1, "createAccount");
    const PING: RemoteProc<()> = RemoteProc::new(2, "ping");
    const PONG: RemoteProc<()> = RemoteProc::new(3, "pong");
    const MISSING: RemoteFn<(), u8> = RemoteFn::new(99, "missing");
    const ECHO: RemoteFn<(String,), String> = RemoteFn::new(7, "echo");

    /// Packet ditampung di antrian, dipindahkan manual ke interface lawan.
    #[derive(Clone, Default)]
    struct Wire(Arc<Mutex<VecDeque<RpcPacket>>>);

    impl Wire {
        fn pop(&self) -> RpcPacket {
            self.0.lock().pop_front().unwrap()
        }

        fn len(&self) -> usize {
            self.0.lock().len()
        }
    }

    impl PacketSink for Wire {
        fn send_packet(&self, packet: &RpcPacket) -> Result<()> {
            self.0.lock().push_back(packet.clone());
            Ok(())
        }
    }

    fn pair(server: DispatchTable, client: DispatchTable) -> (RpcInterface, Wire, RpcInterface, Wire) {
        let to_server = Wire::default();
        let to_client = Wire::default();
        let server = RpcInterface::new(0, server, to_client.clone());
        let client = RpcInterface::new(0, client, to_server.clone());
        (server, to_server, client, to_client)
    }

    #[test]
    fn test_call_and_return() {
        let (server, to_server, client, to_client) = pair(
            DispatchTable::builder().bind(SQUARE, |x: f64| x * x).build(),
            DispatchTable::default(),
        );

        let future = client.call(SQUARE, (3.0,)).unwrap();
        assert_eq!(client.pending_calls(), 1);

        let call = to_server.pop();
        assert_eq!(call.call_kind, CallKind::Call);
        assert_eq!(call.function_id, 4);
        server.handle_packet(call).unwrap();

        let ret = to_client.pop();
        assert_eq!(ret.call_kind, CallKind::Return);
        assert_eq!(ret.call_id, future.call_id());

        client.handle_packet(ret.clone()).unwrap();
        // Duplikat: no-op
        client.handle_packet(ret).unwrap();

        assert_eq!(future.wait().unwrap(), 9.0);
        assert_eq!(client.pending_calls(), 0);
    }

    #[test]
    fn test_proc_sends_no_return() {
        let (tx, rx) = mpsc::sync_channel(1);
        let (server, to_server, client, to_client) = pair(
            DispatchTable::builder()
                .bind_proc(CREATE_ACCOUNT, move |id: i32, name: String| {
                    tx.send((id, name)).unwrap();
                })
                .build(),
            DispatchTable::default(),
        );

        client
            .notify(CREATE_ACCOUNT, (1, "alice".to_string()))
            .unwrap();
        assert_eq!(client.pending_calls(), 0);

        server.handle_packet(to_server.pop()).unwrap();
        assert_eq!(rx.recv().unwrap(), (1, "alice".to_string()));
        assert_eq!(to_client.len(), 0);
    }

    #[test]
    fn test_unknown_function_keeps_other_calls() {
        let (server, to_server, client, to_client) = pair(
            DispatchTable::builder().bind(SQUARE, |x: f64| x * x).build(),
            DispatchTable::default(),
        );

        let square = client.call(SQUARE, (2.0,)).unwrap();
        let missing = client.call(MISSING, ()).unwrap();

        server.handle_packet(to_server.pop()).unwrap();
        let err = server.handle_packet(to_server.pop()).unwrap_err();
        assert!(matches!(
            err,
            Error::UnknownFunction {
                function_id: 99,
                ..
            }
        ));

        client.handle_packet(to_client.pop()).unwrap();
        assert_eq!(square.wait().unwrap(), 4.0);
        assert!(!missing.is_ready());
    }

    #[test]
    fn test_unknown_instance() {
        let to_client = Wire::default();
        let server = RpcInterface::new(
            3,
            DispatchTable::builder().bind(SQUARE, |x: f64| x * x).build(),
            to_client.clone(),
        );

        let packet = RpcPacket::call(0, 4, 1, PayloadBuffer::from_args(&(1.0f64,)).unwrap());
        assert!(matches!(
            server.handle_packet(packet),
            Err(Error::UnknownInstance {
                instance_id: 0,
                local: 3
            })
        ));
        assert_eq!(to_client.len(), 0);
    }

    #[test]
    fn test_error_hook_receives_dispatch_errors() {
        let (tx, rx) = mpsc::sync_channel(4);
        let server = RpcInterface::detached(0, DispatchTable::default())
            .with_error_hook(move |e| tx.send(e.to_string()).unwrap());

        server.on_packet(RpcPacket::call(0, 42, 1, PayloadBuffer::new()));
        let msg = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(msg.contains("unknown function 42"));
    }

    #[test]
    fn test_argument_overflow_sends_nothing() {
        let (_server, to_server, client, _to_client) =
            pair(DispatchTable::default(), DispatchTable::default());

        let big = "x".repeat(PAYLOAD_CAPACITY);
        let err = client.call(ECHO, (big,)).unwrap_err();
        assert!(err.is_buffer_overflow());
        assert_eq!(to_server.len(), 0);
        assert_eq!(client.pending_calls(), 0);
    }

    #[test]
    fn test_send_failure_unregisters() {
        let client = RpcInterface::detached(0, DispatchTable::default());
        assert!(matches!(
            client.call(SQUARE, (1.0,)),
            Err(Error::ConnectionClosed)
        ));
        assert_eq!(client.pending_calls(), 0);
    }

    #[test]
    fn test_ping_answered_with_pong() {
        let (tx, rx) = mpsc::sync_channel(1);
        let (server, to_server, client, to_client) = pair(
            DispatchTable::builder()
                .bind_proc_with_peer(PING, |peer: &RpcInterface| {
                    peer.notify(PONG, ()).unwrap();
                })
                .build(),
            DispatchTable::builder()
                .bind_proc(PONG, move || tx.send(()).unwrap())
                .build(),
        );

        client.notify(PING, ()).unwrap();
        server.handle_packet(to_server.pop()).unwrap();
        client.handle_packet(to_client.pop()).unwrap();
        rx.recv_timeout(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn test_fail_pending() {
        let (_server, _to_server, client, _to_client) =
            pair(DispatchTable::default(), DispatchTable::default());
        let a = client.call(SQUARE, (1.0,)).unwrap();
        let b = client.call(SQUARE, (2.0,)).unwrap();

        assert_eq!(client.fail_pending(), 2);
        assert!(matches!(a.wait(), Err(Error::ConnectionClosed)));
        assert!(matches!(b.wait(), Err(Error::ConnectionClosed)));
    }
}
