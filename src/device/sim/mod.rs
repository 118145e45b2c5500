//! A host-side accelerator.
//!
//! Device memory lives in its own heap, never aliasing the host regions of a
//! buffer. Work is executed eagerly but still accounted per queue, so tests can
//! see what was enqueued where and whether it was synchronized. Every failure
//! path of the harness can be reached through [`SimDevice::fail_next`] and
//! [`SimDevice::with_memory_limit`].

mod blas;
mod solver;

pub use blas::{status as blas_status, SimBlas};
pub use solver::{status as solver_status, SimSolver};

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use tracing::trace;

use crate::{
    device::{Device, DeviceMemory, QueueId},
    error::{Direction, Error, Library, Region, Result},
};

/// Runtime status codes, numbered like the CUDA runtime.
pub mod runtime_status {
    pub const INVALID_VALUE: i64 = 1;
    pub const MEMORY_ALLOCATION: i64 = 2;
    pub const ILLEGAL_ADDRESS: i64 = 700;
    pub const LAUNCH_FAILURE: i64 = 719;
}

/// Operations that can be told to fail once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    Alloc,
    CopyToDevice,
    CopyToHost,
    Synchronize,
    CreateQueue,
    DestroyQueue,
    CreateHandle,
    BindStream,
    Kernel,
}

/// Snapshot of what is currently alive on a [`SimDevice`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimStats {
    pub live_allocations: usize,
    pub live_bytes: usize,
    pub live_queues: usize,
    pub live_handles: usize,
    pub synchronizations: usize,
    pub kernel_launches: usize,
    pub transfers: usize,
}

#[derive(Debug, Default, Clone, Copy)]
struct QueueLedger {
    submitted: usize,
    pending: usize,
}

#[derive(Debug)]
pub struct SimDevice {
    memory_limit: Option<usize>,
    live_allocations: AtomicUsize,
    live_bytes: AtomicUsize,
    live_queues: AtomicUsize,
    live_handles: AtomicUsize,
    synchronizations: AtomicUsize,
    kernel_launches: AtomicUsize,
    transfers: AtomicUsize,
    next_queue: AtomicUsize,
    queues: Mutex<HashMap<QueueId, QueueLedger>>,
    faults: Mutex<Vec<FaultPoint>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SimDevice {
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::build(None))
    }

    /// A device that refuses allocations once `bytes` are live.
    pub fn with_memory_limit(bytes: usize) -> Arc<Self> {
        Arc::new(Self::build(Some(bytes)))
    }

    fn build(memory_limit: Option<usize>) -> Self {
        Self {
            memory_limit,
            live_allocations: AtomicUsize::new(0),
            live_bytes: AtomicUsize::new(0),
            live_queues: AtomicUsize::new(0),
            live_handles: AtomicUsize::new(0),
            synchronizations: AtomicUsize::new(0),
            kernel_launches: AtomicUsize::new(0),
            transfers: AtomicUsize::new(0),
            next_queue: AtomicUsize::new(1),
            queues: Mutex::new(HashMap::new()),
            faults: Mutex::new(Vec::new()),
        }
    }

    /// Make the next operation of this kind fail.
    pub fn fail_next(&self, point: FaultPoint) {
        lock(&self.faults).push(point);
    }

    pub fn stats(&self) -> SimStats {
        SimStats {
            live_allocations: self.live_allocations.load(Ordering::SeqCst),
            live_bytes: self.live_bytes.load(Ordering::SeqCst),
            live_queues: self.live_queues.load(Ordering::SeqCst),
            live_handles: self.live_handles.load(Ordering::SeqCst),
            synchronizations: self.synchronizations.load(Ordering::SeqCst),
            kernel_launches: self.kernel_launches.load(Ordering::SeqCst),
            transfers: self.transfers.load(Ordering::SeqCst),
        }
    }

    /// Operations enqueued on `queue` since its last synchronize.
    pub fn pending(&self, queue: QueueId) -> usize {
        lock(&self.queues)
            .get(&queue)
            .map(|l| l.pending)
            .unwrap_or_default()
    }

    /// Operations ever enqueued on `queue`.
    pub fn submitted(&self, queue: QueueId) -> usize {
        lock(&self.queues)
            .get(&queue)
            .map(|l| l.submitted)
            .unwrap_or_default()
    }

    fn take_fault(&self, point: FaultPoint) -> bool {
        let mut faults = lock(&self.faults);
        match faults.iter().position(|p| *p == point) {
            Some(i) => {
                faults.remove(i);
                true
            }
            None => false,
        }
    }

    fn enqueue(&self, queue: QueueId) {
        let mut queues = lock(&self.queues);
        let ledger = queues.entry(queue).or_default();
        ledger.submitted += 1;
        ledger.pending += 1;
    }

    fn transfer(&self, direction: Direction, src: usize, dst: usize) -> Result<()> {
        let point = match direction {
            Direction::HostToDevice => FaultPoint::CopyToDevice,
            Direction::DeviceToHost => FaultPoint::CopyToHost,
        };
        if self.take_fault(point) {
            return Err(Error::Transfer {
                direction,
                bytes: src,
                code: runtime_status::ILLEGAL_ADDRESS,
                reason: "injected fault".to_string(),
            });
        }
        if src != dst {
            return Err(Error::Transfer {
                direction,
                bytes: src,
                code: runtime_status::INVALID_VALUE,
                reason: format!("destination holds {dst} bytes"),
            });
        }
        self.transfers.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn handle_created(&self) {
        self.live_handles.fetch_add(1, Ordering::SeqCst);
    }

    fn handle_destroyed(&self) {
        self.live_handles.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A region of the simulated device heap, 16 byte aligned.
#[derive(Debug)]
pub struct SimMemory {
    device: Arc<SimDevice>,
    words: Vec<u128>,
    bytes: usize,
    live: bool,
}

impl SimMemory {
    fn as_bytes(&self) -> &[u8] {
        &bytemuck::cast_slice(&self.words)[..self.bytes]
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut(&mut self.words)[..self.bytes]
    }

    fn typed<T: bytemuck::Pod>(&self) -> Option<&[T]> {
        bytemuck::try_cast_slice(self.as_bytes()).ok()
    }

    fn typed_mut<T: bytemuck::Pod>(&mut self) -> Option<&mut [T]> {
        bytemuck::try_cast_slice_mut(self.as_bytes_mut()).ok()
    }

    fn free(&mut self) {
        if self.live {
            self.live = false;
            self.words = Vec::new();
            self.device.live_allocations.fetch_sub(1, Ordering::SeqCst);
            self.device
                .live_bytes
                .fetch_sub(self.bytes, Ordering::SeqCst);
            trace!(bytes = self.bytes, "sim free");
        }
    }
}

impl DeviceMemory for SimMemory {
    fn byte_len(&self) -> usize {
        self.bytes
    }

    fn release(mut self) -> Result<()> {
        self.free();
        Ok(())
    }
}

impl Drop for SimMemory {
    fn drop(&mut self) {
        self.free();
    }
}

/// Queues are not `Clone`, a queue is destroyed exactly once.
#[derive(Debug)]
pub struct SimQueue {
    id: QueueId,
}

impl Device for SimDevice {
    type Memory = SimMemory;
    type Queue = SimQueue;
    type Blas = SimBlas;
    type Solver = SimSolver;

    fn name(&self) -> String {
        "sim".to_string()
    }

    fn alloc_zeroed(self: &Arc<Self>, bytes: usize) -> Result<SimMemory> {
        let oom = |reason: String| Error::Allocation {
            region: Region::Device,
            bytes,
            reason,
        };
        if self.take_fault(FaultPoint::Alloc) {
            return Err(oom("injected fault".to_string()));
        }
        if bytes == 0 {
            return Ok(SimMemory {
                device: self.clone(),
                words: Vec::new(),
                bytes: 0,
                live: false,
            });
        }
        let in_use = self.live_bytes.load(Ordering::SeqCst);
        if let Some(limit) = self.memory_limit {
            if in_use.checked_add(bytes).map_or(true, |total| total > limit) {
                return Err(oom(format!(
                    "out of memory ({in_use} of {limit} bytes in use)"
                )));
            }
        }
        let mut words = Vec::new();
        words
            .try_reserve_exact(bytes.div_ceil(16))
            .map_err(|e| oom(e.to_string()))?;
        words.resize(bytes.div_ceil(16), 0u128);
        self.live_allocations.fetch_add(1, Ordering::SeqCst);
        self.live_bytes.fetch_add(bytes, Ordering::SeqCst);
        trace!(bytes, "sim alloc");
        Ok(SimMemory {
            device: self.clone(),
            words,
            bytes,
            live: true,
        })
    }

    fn create_queue(&self) -> Result<SimQueue> {
        if self.take_fault(FaultPoint::CreateQueue) {
            return Err(Error::Stream {
                action: "create",
                code: runtime_status::MEMORY_ALLOCATION,
                reason: "injected fault".to_string(),
            });
        }
        let id = QueueId(self.next_queue.fetch_add(1, Ordering::SeqCst));
        lock(&self.queues).insert(id, QueueLedger::default());
        self.live_queues.fetch_add(1, Ordering::SeqCst);
        trace!(%id, "sim queue created");
        Ok(SimQueue { id })
    }

    fn destroy_queue(&self, queue: SimQueue) -> Result<()> {
        lock(&self.queues).remove(&queue.id);
        self.live_queues.fetch_sub(1, Ordering::SeqCst);
        trace!(id = %queue.id, "sim queue destroyed");
        if self.take_fault(FaultPoint::DestroyQueue) {
            return Err(Error::Stream {
                action: "destroy",
                code: runtime_status::INVALID_VALUE,
                reason: "injected fault".to_string(),
            });
        }
        Ok(())
    }

    fn queue_id(&self, queue: Option<&SimQueue>) -> QueueId {
        queue.map(|q| q.id).unwrap_or(QueueId::DEFAULT)
    }

    fn synchronize(&self, queue: Option<&SimQueue>) -> Result<()> {
        if self.take_fault(FaultPoint::Synchronize) {
            return Err(Error::Synchronization {
                code: runtime_status::LAUNCH_FAILURE,
                reason: "injected fault".to_string(),
            });
        }
        let id = self.queue_id(queue);
        if let Some(ledger) = lock(&self.queues).get_mut(&id) {
            ledger.pending = 0;
        }
        self.synchronizations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn copy_htod(&self, src: &[u8], dst: &mut SimMemory) -> Result<()> {
        self.transfer(Direction::HostToDevice, src.len(), dst.bytes)?;
        dst.as_bytes_mut().copy_from_slice(src);
        Ok(())
    }

    fn copy_dtoh(&self, src: &SimMemory, dst: &mut [u8]) -> Result<()> {
        self.transfer(Direction::DeviceToHost, src.bytes, dst.len())?;
        dst.copy_from_slice(src.as_bytes());
        Ok(())
    }

    fn copy_htod_async(
        &self,
        src: &[u8],
        dst: &mut SimMemory,
        queue: Option<&SimQueue>,
    ) -> Result<()> {
        self.copy_htod(src, dst)?;
        self.enqueue(self.queue_id(queue));
        Ok(())
    }

    fn copy_dtoh_async(
        &self,
        src: &SimMemory,
        dst: &mut [u8],
        queue: Option<&SimQueue>,
    ) -> Result<()> {
        self.copy_dtoh(src, dst)?;
        self.enqueue(self.queue_id(queue));
        Ok(())
    }
}

/// State shared by the simulated BLAS and SOLVER handles.
#[derive(Debug)]
struct SimHandle {
    device: Arc<SimDevice>,
    library: Library,
    queue: QueueId,
    live: bool,
}

impl SimHandle {
    fn create(device: &Arc<SimDevice>, library: Library, not_initialized: i64) -> Result<Self> {
        if device.take_fault(FaultPoint::CreateHandle) {
            return Err(Error::Context {
                library,
                action: "create",
                code: not_initialized,
            });
        }
        device.handle_created();
        Ok(Self {
            device: device.clone(),
            library,
            queue: QueueId::DEFAULT,
            live: true,
        })
    }

    fn set_stream(&mut self, queue: &SimQueue, invalid_value: i64) -> Result<()> {
        if self.device.take_fault(FaultPoint::BindStream) {
            return Err(Error::Context {
                library: self.library,
                action: "bind stream",
                code: invalid_value,
            });
        }
        self.queue = queue.id;
        Ok(())
    }

    /// Fault check and accounting for one routine call on the bound queue.
    fn launch(&self, routine: &str, execution_failed: i64) -> Result<()> {
        if self.device.take_fault(FaultPoint::Kernel) {
            return Err(Error::KernelInvocation {
                routine: routine.to_string(),
                code: execution_failed,
            });
        }
        self.device.enqueue(self.queue);
        self.device.kernel_launches.fetch_add(1, Ordering::SeqCst);
        trace!(routine, queue = %self.queue, "sim launch");
        Ok(())
    }

    fn destroy(&mut self) {
        if self.live {
            self.live = false;
            self.device.handle_destroyed();
        }
    }
}

impl Drop for SimHandle {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Elements a strided vector of `n` entries spans.
fn strided_len(n: usize, inc: usize) -> usize {
    if n == 0 {
        0
    } else {
        1 + (n - 1) * inc
    }
}

/// Elements a column-major `rows × cols` matrix with leading dimension `ld` spans.
fn matrix_len(rows: usize, cols: usize, ld: usize) -> usize {
    if rows == 0 || cols == 0 {
        0
    } else {
        ld * (cols - 1) + rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_accounting() {
        let dev = SimDevice::new();
        let a = dev.alloc_zeroed(40).unwrap();
        let b = dev.alloc_zeroed(0).unwrap();
        assert_eq!(a.as_bytes(), &[0u8; 40]);
        assert_eq!(b.byte_len(), 0);
        assert_eq!(dev.stats().live_allocations, 1);
        assert_eq!(dev.stats().live_bytes, 40);
        a.release().unwrap();
        drop(b);
        assert_eq!(dev.stats().live_allocations, 0);
        assert_eq!(dev.stats().live_bytes, 0);
    }

    #[test]
    fn test_memory_limit() {
        let dev = SimDevice::with_memory_limit(64);
        let _a = dev.alloc_zeroed(48).unwrap();
        let err = dev.alloc_zeroed(32).unwrap_err();
        assert!(matches!(
            err,
            Error::Allocation {
                region: Region::Device,
                bytes: 32,
                ..
            }
        ));
        assert!(dev.alloc_zeroed(usize::MAX).is_err());
        assert_eq!(dev.stats().live_allocations, 1);
    }

    #[test]
    fn test_queue_accounting() {
        let dev = SimDevice::new();
        let q = dev.create_queue().unwrap();
        let id = dev.queue_id(Some(&q));
        assert!(!id.is_default());
        let mut mem = dev.alloc_zeroed(8).unwrap();
        dev.copy_htod_async(&[1; 8], &mut mem, Some(&q)).unwrap();
        dev.copy_htod_async(&[2; 8], &mut mem, None).unwrap();
        assert_eq!(dev.pending(id), 1);
        assert_eq!(dev.pending(QueueId::DEFAULT), 1);
        dev.synchronize(Some(&q)).unwrap();
        assert_eq!(dev.pending(id), 0);
        assert_eq!(dev.submitted(id), 1);
        assert_eq!(dev.pending(QueueId::DEFAULT), 1);
        dev.destroy_queue(q).unwrap();
        assert_eq!(dev.stats().live_queues, 0);
    }

    #[test]
    fn test_faults_fire_once() {
        let dev = SimDevice::new();
        dev.fail_next(FaultPoint::Synchronize);
        assert!(matches!(
            dev.synchronize(None),
            Err(Error::Synchronization { .. })
        ));
        dev.synchronize(None).unwrap();
    }

    #[test]
    fn test_transfer_size_mismatch() {
        let dev = SimDevice::new();
        let mut mem = dev.alloc_zeroed(8).unwrap();
        let err = dev.copy_htod(&[0; 4], &mut mem).unwrap_err();
        assert_eq!(err.code(), Some(runtime_status::INVALID_VALUE));
    }
}
