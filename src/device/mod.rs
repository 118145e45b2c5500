//! The seams between the harness and an accelerator.
//!
//! A [`Device`] owns memory and queues, a [`LibraryHandle`] is a BLAS or SOLVER
//! handle created against it, and [`BlasRoutines`] / [`SolverRoutines`] are the
//! vendor routines the kernel testers call through those handles.

#[cfg(feature = "cuda")]
pub mod cuda;
pub mod sim;

use std::{fmt, sync::Arc};

use crate::{
    error::{Library, Result},
    scalar::Transpose,
};

/// Identity of a queue. The implicit default queue is the null id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct QueueId(pub usize);

impl QueueId {
    pub const DEFAULT: QueueId = QueueId(0);

    pub fn is_default(self) -> bool {
        self == Self::DEFAULT
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_default() {
            write!(f, "default")
        } else {
            write!(f, "{:#x}", self.0)
        }
    }
}

/// A device allocation. Dropping it frees the region, `release` does the same
/// but reports failure.
pub trait DeviceMemory: Send + Sync + Sized {
    fn byte_len(&self) -> usize;
    fn release(self) -> Result<()>;
}

pub trait Device: Send + Sync + Sized + 'static {
    type Memory: DeviceMemory;
    type Queue: Send;
    type Blas: LibraryHandle<Self>;
    type Solver: LibraryHandle<Self>;

    fn name(&self) -> String;

    /// Allocate `bytes` of device memory, zero filled.
    fn alloc_zeroed(self: &Arc<Self>, bytes: usize) -> Result<Self::Memory>;

    fn create_queue(&self) -> Result<Self::Queue>;
    fn destroy_queue(&self, queue: Self::Queue) -> Result<()>;
    /// `None` is the default queue.
    fn queue_id(&self, queue: Option<&Self::Queue>) -> QueueId;
    fn synchronize(&self, queue: Option<&Self::Queue>) -> Result<()>;

    fn copy_htod(&self, src: &[u8], dst: &mut Self::Memory) -> Result<()>;
    fn copy_dtoh(&self, src: &Self::Memory, dst: &mut [u8]) -> Result<()>;
    fn copy_htod_async(
        &self,
        src: &[u8],
        dst: &mut Self::Memory,
        queue: Option<&Self::Queue>,
    ) -> Result<()>;
    fn copy_dtoh_async(
        &self,
        src: &Self::Memory,
        dst: &mut [u8],
        queue: Option<&Self::Queue>,
    ) -> Result<()>;
}

/// A raw handle into one of the accelerated libraries.
pub trait LibraryHandle<D: Device>: Sized + Send {
    const LIBRARY: Library;

    fn create(device: &Arc<D>) -> Result<Self>;
    fn set_stream(&mut self, queue: &D::Queue) -> Result<()>;
    /// The queue the library currently issues work to.
    fn stream_id(&self) -> Result<QueueId>;
    fn destroy(self) -> Result<()>;
}

/// BLAS level 1, 2 and 3 routines for one precision. Scalars are passed by
/// host address, results of reductions land in host memory.
#[allow(clippy::too_many_arguments)]
pub trait BlasRoutines<D: Device, T> {
    fn axpy(
        &self,
        n: i32,
        alpha: &T,
        x: &D::Memory,
        incx: i32,
        y: &mut D::Memory,
        incy: i32,
    ) -> Result<()>;

    fn dot(
        &self,
        n: i32,
        x: &D::Memory,
        incx: i32,
        y: &D::Memory,
        incy: i32,
        result: &mut T,
    ) -> Result<()>;

    fn copy(
        &self,
        n: i32,
        x: &D::Memory,
        incx: i32,
        y: &mut D::Memory,
        incy: i32,
    ) -> Result<()>;

    fn iamax(&self, n: i32, x: &D::Memory, incx: i32, result: &mut i32) -> Result<()>;

    fn iamin(&self, n: i32, x: &D::Memory, incx: i32, result: &mut i32) -> Result<()>;

    fn gemv(
        &self,
        trans: Transpose,
        m: i32,
        n: i32,
        alpha: &T,
        a: &D::Memory,
        lda: i32,
        x: &D::Memory,
        incx: i32,
        beta: &T,
        y: &mut D::Memory,
        incy: i32,
    ) -> Result<()>;

    fn gemm(
        &self,
        transa: Transpose,
        transb: Transpose,
        m: i32,
        n: i32,
        k: i32,
        alpha: &T,
        a: &D::Memory,
        lda: i32,
        b: &D::Memory,
        ldb: i32,
        beta: &T,
        c: &mut D::Memory,
        ldc: i32,
    ) -> Result<()>;
}

/// Dense general solve `A·X = B`, queried then invoked.
#[allow(clippy::too_many_arguments)]
pub trait SolverRoutines<D: Device, T> {
    /// Workspace bytes `gesv` needs for this problem.
    fn gesv_buffer_size(
        &self,
        n: i32,
        nrhs: i32,
        a: &D::Memory,
        lda: i32,
        ipiv: &D::Memory,
        b: &D::Memory,
        ldb: i32,
        x: &D::Memory,
        ldx: i32,
    ) -> Result<usize>;

    /// Solve, writing the iteration count to `iters` and the LAPACK `info`
    /// code to device memory.
    fn gesv(
        &self,
        n: i32,
        nrhs: i32,
        a: &mut D::Memory,
        lda: i32,
        ipiv: &mut D::Memory,
        b: &D::Memory,
        ldb: i32,
        x: &mut D::Memory,
        ldx: i32,
        work: &mut D::Memory,
        work_bytes: usize,
        iters: &mut i32,
        info: &mut D::Memory,
    ) -> Result<()>;
}
