use std::sync::Arc;

use cudarc::cusolver::sys;
use tracing::debug;

use super::{CudaDevice, CudaMemory, CudaQueue};
use crate::{
    device::{LibraryHandle, QueueId, SolverRoutines},
    error::{Error, Library, Result},
    scalar::{KernelKind, Precision},
};

pub struct CudaSolver {
    device: Arc<CudaDevice>,
    handle: sys::cusolverDnHandle_t,
    live: bool,
}

unsafe impl Send for CudaSolver {}

impl std::fmt::Debug for CudaSolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CudaSolver({:p})", self.handle)
    }
}

macro_rules! cusolver_call {
    ($f:expr, $err:expr) => {{
        let status = $f;
        if status != sys::cusolverStatus_t::CUSOLVER_STATUS_SUCCESS {
            return Err($err(status as i64));
        }
    }};
}

fn context_error(action: &'static str) -> impl Fn(i64) -> Error {
    move |code| Error::Context {
        library: Library::Solver,
        action,
        code,
    }
}

fn kernel_error(precision: Precision) -> impl Fn(i64) -> Error {
    move |code| Error::KernelInvocation {
        routine: precision.routine_name(KernelKind::Gesv),
        code,
    }
}

impl LibraryHandle<CudaDevice> for CudaSolver {
    const LIBRARY: Library = Library::Solver;

    fn create(device: &Arc<CudaDevice>) -> Result<Self> {
        device.bind()?;
        let mut handle: sys::cusolverDnHandle_t = std::ptr::null_mut();
        cusolver_call!(
            unsafe { sys::cusolverDnCreate(&mut handle) },
            context_error("create")
        );
        debug!("created cuSOLVER handle");
        Ok(Self {
            device: device.clone(),
            handle,
            live: true,
        })
    }

    fn set_stream(&mut self, queue: &CudaQueue) -> Result<()> {
        cusolver_call!(
            unsafe { sys::cusolverDnSetStream(self.handle, queue.0 as _) },
            context_error("bind stream")
        );
        Ok(())
    }

    fn stream_id(&self) -> Result<QueueId> {
        let mut stream: sys::cudaStream_t = std::ptr::null_mut();
        cusolver_call!(
            unsafe { sys::cusolverDnGetStream(self.handle, &mut stream) },
            context_error("get stream")
        );
        Ok(QueueId(stream as usize))
    }

    fn destroy(mut self) -> Result<()> {
        self.device.bind()?;
        self.live = false;
        cusolver_call!(
            unsafe { sys::cusolverDnDestroy(self.handle) },
            context_error("destroy")
        );
        Ok(())
    }
}

impl Drop for CudaSolver {
    fn drop(&mut self) {
        if self.live {
            let _ = unsafe { sys::cusolverDnDestroy(self.handle) };
        }
    }
}

macro_rules! solver_routines {
    ($t:ty, $p:expr, $buffer_size:ident, $gesv:ident) => {
        impl SolverRoutines<CudaDevice, $t> for CudaSolver {
            fn gesv_buffer_size(
                &self,
                n: i32,
                nrhs: i32,
                a: &CudaMemory,
                lda: i32,
                ipiv: &CudaMemory,
                b: &CudaMemory,
                ldb: i32,
                x: &CudaMemory,
                ldx: i32,
            ) -> Result<usize> {
                let mut bytes = 0usize;
                cusolver_call!(
                    unsafe {
                        sys::$buffer_size(
                            self.handle,
                            n,
                            nrhs,
                            a.ptr() as *mut $t,
                            lda,
                            ipiv.ptr() as *mut _,
                            b.ptr() as *mut $t,
                            ldb,
                            x.ptr() as *mut $t,
                            ldx,
                            std::ptr::null_mut(),
                            &mut bytes,
                        )
                    },
                    kernel_error($p)
                );
                Ok(bytes)
            }

            fn gesv(
                &self,
                n: i32,
                nrhs: i32,
                a: &mut CudaMemory,
                lda: i32,
                ipiv: &mut CudaMemory,
                b: &CudaMemory,
                ldb: i32,
                x: &mut CudaMemory,
                ldx: i32,
                work: &mut CudaMemory,
                work_bytes: usize,
                iters: &mut i32,
                info: &mut CudaMemory,
            ) -> Result<()> {
                cusolver_call!(
                    unsafe {
                        sys::$gesv(
                            self.handle,
                            n,
                            nrhs,
                            a.ptr() as *mut $t,
                            lda,
                            ipiv.ptr() as *mut _,
                            b.ptr() as *mut $t,
                            ldb,
                            x.ptr() as *mut $t,
                            ldx,
                            work.ptr() as *mut _,
                            work_bytes,
                            iters,
                            info.ptr() as *mut _,
                        )
                    },
                    kernel_error($p)
                );
                Ok(())
            }
        }
    };
}

solver_routines!(
    f32,
    Precision::Single,
    cusolverDnSSgesv_bufferSize,
    cusolverDnSSgesv
);
solver_routines!(
    f64,
    Precision::Double,
    cusolverDnDDgesv_bufferSize,
    cusolverDnDDgesv
);
