//! CUDA backend over the driver API, cuBLAS and cuSOLVER.
//!
//! Host buffers are pageable, so the `*_async` copies return once the host
//! side has been staged. Callers still synchronize before reading results.

mod blas;
mod solver;

use std::sync::Arc;

use cudarc::driver::{
    result::{self as driver, stream::StreamKind, DriverError},
    sys,
};
use tracing::{debug, trace, warn};

pub use blas::CudaBlas;
pub use solver::CudaSolver;

use super::{Device, DeviceMemory, QueueId};
use crate::error::{Direction, Error, Region, Result};

fn code(e: DriverError) -> i64 {
    e.0 as i64
}

fn describe(e: DriverError) -> String {
    e.error_string()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|_| format!("{:?}", e.0))
}

fn transfer_error(direction: Direction, bytes: usize) -> impl Fn(DriverError) -> Error {
    move |e| Error::Transfer {
        direction,
        bytes,
        code: code(e),
        reason: describe(e),
    }
}

/// The primary context of one device.
pub struct CudaDevice {
    ordinal: usize,
    cu_device: sys::CUdevice,
    ctx: sys::CUcontext,
}

// The primary context may be made current on any thread.
unsafe impl Send for CudaDevice {}
unsafe impl Sync for CudaDevice {}

impl std::fmt::Debug for CudaDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CudaDevice")
            .field("ordinal", &self.ordinal)
            .finish()
    }
}

impl CudaDevice {
    pub fn new(ordinal: usize) -> Result<Arc<Self>> {
        let ctx_error = |e: DriverError| Error::Stream {
            action: "initialize context for",
            code: code(e),
            reason: describe(e),
        };
        driver::init().map_err(ctx_error)?;
        let cu_device = driver::device::get(ordinal as i32).map_err(ctx_error)?;
        let ctx = unsafe { driver::primary_ctx::retain(cu_device) }.map_err(ctx_error)?;
        unsafe { driver::ctx::set_current(ctx) }.map_err(ctx_error)?;
        debug!(ordinal, "retained primary context");
        Ok(Arc::new(Self {
            ordinal,
            cu_device,
            ctx,
        }))
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Make the context current on the calling thread.
    pub(crate) fn bind(&self) -> Result<()> {
        unsafe { driver::ctx::set_current(self.ctx) }.map_err(|e| Error::Stream {
            action: "bind context for",
            code: code(e),
            reason: describe(e),
        })
    }

    fn raw(queue: Option<&CudaQueue>) -> sys::CUstream {
        queue.map_or_else(driver::stream::null, |q| q.0)
    }
}

impl Drop for CudaDevice {
    fn drop(&mut self) {
        if let Err(e) = unsafe { driver::primary_ctx::release(self.cu_device) } {
            warn!(ordinal = self.ordinal, code = code(e), "failed to release primary context");
        }
    }
}

pub struct CudaMemory {
    device: Arc<CudaDevice>,
    ptr: sys::CUdeviceptr,
    bytes: usize,
    live: bool,
}

impl CudaMemory {
    pub(crate) fn ptr(&self) -> sys::CUdeviceptr {
        self.ptr
    }

    fn free(&mut self) -> Result<()> {
        if !self.live {
            return Ok(());
        }
        self.device.bind()?;
        self.live = false;
        unsafe { driver::free_sync(self.ptr) }.map_err(|e| Error::Allocation {
            region: Region::Device,
            bytes: self.bytes,
            reason: format!("free failed: {}", describe(e)),
        })?;
        trace!(bytes = self.bytes, "cuda free");
        Ok(())
    }
}

impl std::fmt::Debug for CudaMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CudaMemory({:#x}, {} bytes)", self.ptr, self.bytes)
    }
}

impl DeviceMemory for CudaMemory {
    fn byte_len(&self) -> usize {
        self.bytes
    }

    fn release(mut self) -> Result<()> {
        self.free()
    }
}

impl Drop for CudaMemory {
    fn drop(&mut self) {
        if let Err(e) = self.free() {
            warn!("{e}");
        }
    }
}

/// An owned, non-default stream.
#[derive(Debug)]
pub struct CudaQueue(sys::CUstream);

unsafe impl Send for CudaQueue {}

impl Device for CudaDevice {
    type Memory = CudaMemory;
    type Queue = CudaQueue;
    type Blas = CudaBlas;
    type Solver = CudaSolver;

    fn name(&self) -> String {
        format!("cuda:{}", self.ordinal)
    }

    fn alloc_zeroed(self: &Arc<Self>, bytes: usize) -> Result<CudaMemory> {
        if bytes == 0 {
            return Ok(CudaMemory {
                device: self.clone(),
                ptr: 0,
                bytes: 0,
                live: false,
            });
        }
        self.bind()?;
        let oom = |e: DriverError| Error::Allocation {
            region: Region::Device,
            bytes,
            reason: describe(e),
        };
        let ptr = unsafe { driver::malloc_sync(bytes) }.map_err(oom)?;
        let mut mem = CudaMemory {
            device: self.clone(),
            ptr,
            bytes,
            live: true,
        };
        unsafe { driver::memset_d8_sync(ptr, 0, bytes) }.map_err(|e| {
            let _ = mem.free();
            oom(e)
        })?;
        trace!(bytes, "cuda alloc");
        Ok(mem)
    }

    fn create_queue(&self) -> Result<CudaQueue> {
        self.bind()?;
        let stream = driver::stream::create(StreamKind::NonBlocking).map_err(|e| Error::Stream {
            action: "create",
            code: code(e),
            reason: describe(e),
        })?;
        Ok(CudaQueue(stream))
    }

    fn destroy_queue(&self, queue: CudaQueue) -> Result<()> {
        self.bind()?;
        unsafe { driver::stream::destroy(queue.0) }.map_err(|e| Error::Stream {
            action: "destroy",
            code: code(e),
            reason: describe(e),
        })
    }

    fn queue_id(&self, queue: Option<&CudaQueue>) -> QueueId {
        QueueId(Self::raw(queue) as usize)
    }

    fn synchronize(&self, queue: Option<&CudaQueue>) -> Result<()> {
        self.bind()?;
        unsafe { driver::stream::synchronize(Self::raw(queue)) }.map_err(|e| {
            Error::Synchronization {
                code: code(e),
                reason: describe(e),
            }
        })
    }

    fn copy_htod(&self, src: &[u8], dst: &mut CudaMemory) -> Result<()> {
        check_len(Direction::HostToDevice, src.len(), dst.bytes)?;
        if src.is_empty() {
            return Ok(());
        }
        self.bind()?;
        unsafe { driver::memcpy_htod_sync(dst.ptr, src) }
            .map_err(transfer_error(Direction::HostToDevice, src.len()))
    }

    fn copy_dtoh(&self, src: &CudaMemory, dst: &mut [u8]) -> Result<()> {
        check_len(Direction::DeviceToHost, dst.len(), src.bytes)?;
        if dst.is_empty() {
            return Ok(());
        }
        self.bind()?;
        let bytes = dst.len();
        unsafe { driver::memcpy_dtoh_sync(dst, src.ptr) }
            .map_err(transfer_error(Direction::DeviceToHost, bytes))
    }

    fn copy_htod_async(
        &self,
        src: &[u8],
        dst: &mut CudaMemory,
        queue: Option<&CudaQueue>,
    ) -> Result<()> {
        check_len(Direction::HostToDevice, src.len(), dst.bytes)?;
        if src.is_empty() {
            return Ok(());
        }
        self.bind()?;
        unsafe { driver::memcpy_htod_async(dst.ptr, src, Self::raw(queue)) }
            .map_err(transfer_error(Direction::HostToDevice, src.len()))
    }

    fn copy_dtoh_async(
        &self,
        src: &CudaMemory,
        dst: &mut [u8],
        queue: Option<&CudaQueue>,
    ) -> Result<()> {
        check_len(Direction::DeviceToHost, dst.len(), src.bytes)?;
        if dst.is_empty() {
            return Ok(());
        }
        self.bind()?;
        let bytes = dst.len();
        unsafe { driver::memcpy_dtoh_async(dst, src.ptr, Self::raw(queue)) }
            .map_err(transfer_error(Direction::DeviceToHost, bytes))
    }
}

/// Host and device sides of a copy must be the same size.
fn check_len(direction: Direction, host: usize, device: usize) -> Result<()> {
    if host != device {
        return Err(Error::Transfer {
            direction,
            bytes: host,
            code: sys::CUresult::CUDA_ERROR_INVALID_VALUE as i64,
            reason: format!("host side is {host} bytes, device side is {device}"),
        });
    }
    Ok(())
}
