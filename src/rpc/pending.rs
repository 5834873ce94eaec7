//! Pending-call table dan future hasil call
//!
//! Setiap call yang menunggu Return punya satu continuation (closure
//! bertipe) di table, dikunci oleh `call_id`. Continuation dikeluarkan dari
//! table sebelum dipanggil, jadi setiap call selesai tepat sekali.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::core::{Archive, PayloadBuffer};
use crate::error::{Error, Result};

type Continuation = Box<dyn FnOnce(std::result::Result<&PayloadBuffer, Error>) + Send>;

/// Table call_id → continuation, satu per interface.
pub struct PendingCalls {
    next_call_id: AtomicU32,
    table: Mutex<HashMap<u32, Continuation>>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self {
            next_call_id: AtomicU32::new(0),
            table: Mutex::new(HashMap::new()),
        }
    }

    /// Alokasikan call_id baru dan daftarkan continuation yang men-decode
    /// hasil sebagai `R`.
    pub fn register<R>(self: &Arc<Self>) -> CallFuture<R>
    where
        R: Archive + Send + 'static,
    {
        let slot = Arc::new(CallSlot::new());
        let target = slot.clone();
        let continuation: Continuation = Box::new(move |outcome| {
            let result = outcome.and_then(|payload| payload.decode::<R>().map_err(Error::from));
            target.complete(result);
        });

        let mut table = self.table.lock();
        // Counter wrap setelah 2^32 call; lewati id yang masih menunggu
        let call_id = loop {
            let id = self.next_call_id.fetch_add(1, Ordering::Relaxed);
            if !table.contains_key(&id) {
                break id;
            }
        };
        table.insert(call_id, continuation);
        drop(table);

        CallFuture {
            call_id,
            slot,
            table: Arc::downgrade(self),
        }
    }

    /// call_id untuk call tanpa nilai balik; tidak didaftarkan di table.
    pub fn next_notify_id(&self) -> u32 {
        self.next_call_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Selesaikan call dengan payload Return. `false` jika call_id tidak
    /// dikenal (reply basi atau duplikat).
    pub fn resolve(&self, call_id: u32, payload: &PayloadBuffer) -> bool {
        let continuation = self.table.lock().remove(&call_id);
        match continuation {
            Some(continuation) => {
                continuation(Ok(payload));
                true
            }
            None => false,
        }
    }

    /// Gagalkan satu call.
    pub fn fail(&self, call_id: u32, error: Error) -> bool {
        let continuation = self.table.lock().remove(&call_id);
        match continuation {
            Some(continuation) => {
                continuation(Err(error));
                true
            }
            None => false,
        }
    }

    /// Gagalkan semua call yang menunggu, return jumlahnya.
    pub fn fail_all(&self, error: impl Fn() -> Error) -> usize {
        let drained: Vec<Continuation> = self.table.lock().drain().map(|(_, c)| c).collect();
        let count = drained.len();
        for continuation in drained {
            continuation(Err(error()));
        }
        count
    }

    /// Hapus entry tanpa memanggil continuation.
    pub fn cancel(&self, call_id: u32) -> bool {
        self.table.lock().remove(&call_id).is_some()
    }

    pub fn contains(&self, call_id: u32) -> bool {
        self.table.lock().contains_key(&call_id)
    }

    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.lock().is_empty()
    }
}

impl Default for PendingCalls {
    fn default() -> Self {
        Self::new()
    }
}

struct SlotState<R> {
    result: Option<Result<R>>,
    waker: Option<Waker>,
}

struct CallSlot<R> {
    state: Mutex<SlotState<R>>,
    ready: Condvar,
}

impl<R> CallSlot<R> {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                result: None,
                waker: None,
            }),
            ready: Condvar::new(),
        }
    }

    fn complete(&self, result: Result<R>) {
        let waker = {
            let mut state = self.state.lock();
            state.result = Some(result);
            state.waker.take()
        };
        self.ready.notify_all();
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

/// Hasil call yang belum tiba.
///
/// Bisa ditunggu blocking (`wait`, `wait_timeout`), dicek (`try_take`), atau
/// di-`.await`. Drop sebelum hasil tiba membuang entry di table; Return yang
/// datang belakangan dianggap basi.
///
/// Jangan `wait` dari dalam handler dispatch: Return diproses oleh thread
/// event loop yang sama.
pub struct CallFuture<R> {
    call_id: u32,
    slot: Arc<CallSlot<R>>,
    table: Weak<PendingCalls>,
}

impl<R> CallFuture<R> {
    #[inline(always)]
    pub fn call_id(&self) -> u32 {
        self.call_id
    }

    pub fn is_ready(&self) -> bool {
        self.slot.state.lock().result.is_some()
    }

    /// Block sampai hasil tiba atau koneksi tertutup.
    pub fn wait(self) -> Result<R> {
        let mut state = self.slot.state.lock();
        loop {
            if let Some(result) = state.result.take() {
                return result;
            }
            self.slot.ready.wait(&mut state);
        }
    }

    /// Block paling lama `timeout`. Saat timeout, entry dihapus dan
    /// hasilnya `Error::Timeout`.
    pub fn wait_timeout(self, timeout: Duration) -> Result<R> {
        let deadline = Instant::now() + timeout;
        let mut state = self.slot.state.lock();
        loop {
            if let Some(result) = state.result.take() {
                return result;
            }
            if self.slot.ready.wait_until(&mut state, deadline).timed_out() {
                if let Some(result) = state.result.take() {
                    return result;
                }
                drop(state);
                self.cancel();
                return Err(Error::Timeout);
            }
        }
    }

    /// Ambil hasil jika sudah tiba, tanpa blocking.
    pub fn try_take(&mut self) -> Option<Result<R>> {
        self.slot.state.lock().result.take()
    }

    fn cancel(&self) {
        if let Some(table) = self.table.upgrade() {
            table.cancel(self.call_id);
        }
    }
}

impl<R> Future for CallFuture<R> {
    type Output = Result<R>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.slot.state.lock();
        match state.result.take() {
            Some(result) => Poll::Ready(result),
            None => {
                state.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl<R> Drop for CallFuture<R> {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl<R> std::fmt::Debug for CallFuture<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallFuture")
            .field("call_id", &self.call_id)
            .field("ready", &self.is_ready())
            .finish()
    }
}
