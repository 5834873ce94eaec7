//! RPC Layer: packet, dispatch table, dan pending-call table
//!
//! Prinsip desain:
//! - Signature fungsi remote di-type-check saat compile (`RemoteFn<A, R>`)
//! - Dispatch table read-only setelah dibangun, lookup tanpa lock
//! - Satu continuation per call, diselesaikan tepat sekali
//! - Error dispatch dilaporkan lewat hook, session tetap jalan

mod connection;
mod dispatch;
mod interface;
mod packet;
mod pending;

pub use connection::{trim_nul, RpcConnection, SessionSink, TextHandler};
pub use dispatch::{
    Binding, DispatchTable, DispatchTableBuilder, Handler, PeerHandler, RemoteFn, RemoteProc,
};
pub use interface::{ErrorHook, PacketSink, RpcInterface};
pub use packet::{CallKind, RpcPacket, MAX_PACKET_SIZE, PACKET_HEADER_SIZE};
pub use pending::{CallFuture, PendingCalls};
