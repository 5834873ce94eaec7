//! Remote function descriptor dan dispatch table
//!
//! Setiap fungsi remote punya id dan signature tetap. Table dibangun sekali
//! lewat builder, setelah itu read-only (lookup tanpa lock).

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use tracing::warn;

use super::interface::RpcInterface;
use crate::core::{Archive, PayloadBuffer};
use crate::error::Result;

/// Fungsi remote yang mengembalikan `R`. `A` adalah tuple argumen.
pub struct RemoteFn<A, R> {
    id: u16,
    name: &'static str,
    _sig: PhantomData<fn(A) -> R>,
}

impl<A, R> RemoteFn<A, R> {
    pub const fn new(id: u16, name: &'static str) -> Self {
        Self {
            id,
            name,
            _sig: PhantomData,
        }
    }

    #[inline(always)]
    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<A, R> Clone for RemoteFn<A, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A, R> Copy for RemoteFn<A, R> {}

impl<A, R> fmt::Debug for RemoteFn<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RemoteFn({}, {:?})", self.id, self.name)
    }
}

/// Fungsi remote tanpa nilai balik: tidak ada Return packet.
pub struct RemoteProc<A> {
    id: u16,
    name: &'static str,
    _sig: PhantomData<fn(A)>,
}

impl<A> RemoteProc<A> {
    pub const fn new(id: u16, name: &'static str) -> Self {
        Self {
            id,
            name,
            _sig: PhantomData,
        }
    }

    #[inline(always)]
    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<A> Clone for RemoteProc<A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A> Copy for RemoteProc<A> {}

impl<A> fmt::Debug for RemoteProc<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RemoteProc({}, {:?})", self.id, self.name)
    }
}

/// Closure yang menerima argumen sebagai parameter terpisah.
///
/// Diimplementasikan untuk `Fn` dengan 0 sampai 4 parameter; `Args` adalah
/// tuple yang di-decode dari payload.
pub trait Handler<Args, R>: Send + Sync + 'static {
    fn invoke(&self, args: Args) -> R;
}

/// Seperti [`Handler`], ditambah interface penerima sebagai parameter
/// pertama.
pub trait PeerHandler<Args, R>: Send + Sync + 'static {
    fn invoke(&self, peer: &RpcInterface, args: Args) -> R;
}

macro_rules! impl_handler {
    ($($arg:ident),*) => {
        impl<F, R, $($arg,)*> Handler<($($arg,)*), R> for F
        where
            F: Fn($($arg),*) -> R + Send + Sync + 'static,
        {
            #[allow(non_snake_case)]
            fn invoke(&self, ($($arg,)*): ($($arg,)*)) -> R {
                self($($arg),*)
            }
        }

        impl<F, R, $($arg,)*> PeerHandler<($($arg,)*), R> for F
        where
            F: Fn(&RpcInterface, $($arg),*) -> R + Send + Sync + 'static,
        {
            #[allow(non_snake_case)]
            fn invoke(&self, peer: &RpcInterface, ($($arg,)*): ($($arg,)*)) -> R {
                self(peer, $($arg),*)
            }
        }
    };
}

impl_handler!();
impl_handler!(A1);
impl_handler!(A1, A2);
impl_handler!(A1, A2, A3);
impl_handler!(A1, A2, A3, A4);

type Invoker = Box<dyn Fn(&RpcInterface, &PayloadBuffer) -> Result<Option<PayloadBuffer>> + Send + Sync>;

/// Satu entry table: nama (untuk log) dan invoker yang sudah di-erase.
pub struct Binding {
    name: &'static str,
    returns: bool,
    invoker: Invoker,
}

impl Binding {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// `true` jika fungsi mengirim Return.
    pub fn returns(&self) -> bool {
        self.returns
    }

    /// Decode argumen, panggil handler, serialize hasil (jika ada).
    pub fn invoke(&self, peer: &RpcInterface, args: &PayloadBuffer) -> Result<Option<PayloadBuffer>> {
        (self.invoker)(peer, args)
    }
}

/// Table function_id → handler.
#[derive(Default)]
pub struct DispatchTable {
    bindings: HashMap<u16, Binding>,
}

impl DispatchTable {
    pub fn builder() -> DispatchTableBuilder {
        DispatchTableBuilder::default()
    }

    #[inline(always)]
    pub fn lookup(&self, function_id: u16) -> Option<&Binding> {
        self.bindings.get(&function_id)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.bindings.iter().map(|(id, b)| (*id, b.name)).collect();
        ids.sort_unstable();
        f.debug_struct("DispatchTable").field("bindings", &ids).finish()
    }
}

#[derive(Default)]
pub struct DispatchTableBuilder {
    bindings: HashMap<u16, Binding>,
}

impl DispatchTableBuilder {
    pub fn bind<A, R, H>(self, function: RemoteFn<A, R>, handler: H) -> Self
    where
        A: Archive + 'static,
        R: Archive + 'static,
        H: Handler<A, R>,
    {
        self.insert(function.id(), function.name(), true, move |_, payload| {
            let result = handler.invoke(payload.decode::<A>()?);
            Ok(Some(PayloadBuffer::from_args(&result)?))
        })
    }

    pub fn bind_proc<A, H>(self, function: RemoteProc<A>, handler: H) -> Self
    where
        A: Archive + 'static,
        H: Handler<A, ()>,
    {
        self.insert(function.id(), function.name(), false, move |_, payload| {
            handler.invoke(payload.decode::<A>()?);
            Ok(None)
        })
    }

    pub fn bind_with_peer<A, R, H>(self, function: RemoteFn<A, R>, handler: H) -> Self
    where
        A: Archive + 'static,
        R: Archive + 'static,
        H: PeerHandler<A, R>,
    {
        self.insert(function.id(), function.name(), true, move |peer, payload| {
            let result = handler.invoke(peer, payload.decode::<A>()?);
            Ok(Some(PayloadBuffer::from_args(&result)?))
        })
    }

    pub fn bind_proc_with_peer<A, H>(self, function: RemoteProc<A>, handler: H) -> Self
    where
        A: Archive + 'static,
        H: PeerHandler<A, ()>,
    {
        self.insert(function.id(), function.name(), false, move |peer, payload| {
            handler.invoke(peer, payload.decode::<A>()?);
            Ok(None)
        })
    }

    pub fn build(self) -> DispatchTable {
        DispatchTable {
            bindings: self.bindings,
        }
    }

    fn insert<F>(mut self, id: u16, name: &'static str, returns: bool, invoker: F) -> Self
    where
        F: Fn(&RpcInterface, &PayloadBuffer) -> Result<Option<PayloadBuffer>> + Send + Sync + 'static,
    {
        let binding = Binding {
            name,
            returns,
            invoker: Box::new(invoker),
        };
        if let Some(old) = self.bindings.insert(id, binding) {
            warn!(id, old = old.name, new = name, "function id bound twice, keeping the last binding");
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    const SQUARE: RemoteFn<(f64,), f64> = RemoteFn::new(4, "square");
    const ADD: RemoteFn<(i32, i32, i32, i32), i32> = RemoteFn::new(5, "add4");
    const STORE: RemoteProc<(i32,)> = RemoteProc::new(0, "store");
    const NOW: RemoteFn<(), u64> = RemoteFn::new(6, "now");

    #[test]
    fn test_builder_registers_by_id() {
        let table = DispatchTable::builder()
            .bind(SQUARE, |x: f64| x * x)
            .bind(ADD, |a: i32, b: i32, c: i32, d: i32| a + b + c + d)
            .bind(NOW, || 42u64)
            .bind_proc(STORE, |_: i32| {})
            .build();

        assert_eq!(table.len(), 4);
        assert_eq!(table.lookup(4).map(Binding::name), Some("square"));
        assert!(table.lookup(4).unwrap().returns());
        assert!(!table.lookup(0).unwrap().returns());
        assert!(table.lookup(99).is_none());
    }

    #[test]
    fn test_descriptor_is_copy() {
        let f = SQUARE;
        let g = f;
        assert_eq!(f.id(), g.id());
        assert_eq!(format!("{:?}", STORE), "RemoteProc(0, \"store\")");
    }

    #[test]
    fn test_invoke_decodes_arguments() {
        let seen = Arc::new(AtomicI32::new(0));
        let seen2 = seen.clone();
        let table = DispatchTable::builder()
            .bind(ADD, |a: i32, b: i32, c: i32, d: i32| a + b + c + d)
            .bind_proc(STORE, move |v: i32| seen2.store(v, Ordering::SeqCst))
            .build();

        let peer = RpcInterface::detached(0, DispatchTable::default());

        let args = PayloadBuffer::from_args(&(1, 2, 3, 4)).unwrap();
        let result = table.lookup(5).unwrap().invoke(&peer, &args).unwrap().unwrap();
        assert_eq!(result.decode::<i32>().unwrap(), 10);

        let args = PayloadBuffer::from_args(&(77,)).unwrap();
        assert!(table.lookup(0).unwrap().invoke(&peer, &args).unwrap().is_none());
        assert_eq!(seen.load(Ordering::SeqCst), 77);
    }

    #[test]
    fn test_argument_mismatch() {
        let table = DispatchTable::builder().bind(SQUARE, |x: f64| x * x).build();
        let peer = RpcInterface::detached(0, DispatchTable::default());

        let wrong = PayloadBuffer::from_args(&(1u8,)).unwrap();
        let err = table.lookup(4).unwrap().invoke(&peer, &wrong).unwrap_err();
        assert!(err.is_deserialization_mismatch());
    }
}
