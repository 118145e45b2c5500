use std::sync::Arc;

use cudarc::cublas::{result as cublas, sys};
use tracing::debug;

use super::{CudaDevice, CudaMemory, CudaQueue};
use crate::{
    device::{BlasRoutines, LibraryHandle, QueueId},
    error::{Error, Library, Result},
    scalar::{KernelKind, Precision, Transpose},
};

pub struct CudaBlas {
    device: Arc<CudaDevice>,
    handle: sys::cublasHandle_t,
    live: bool,
}

unsafe impl Send for CudaBlas {}

impl std::fmt::Debug for CudaBlas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CudaBlas({:p})", self.handle)
    }
}

fn context_error(action: &'static str) -> impl Fn(cublas::CublasError) -> Error {
    move |e| Error::Context {
        library: Library::Blas,
        action,
        code: e.0 as i64,
    }
}

impl LibraryHandle<CudaDevice> for CudaBlas {
    const LIBRARY: Library = Library::Blas;

    fn create(device: &Arc<CudaDevice>) -> Result<Self> {
        device.bind()?;
        let handle = cublas::create_handle().map_err(context_error("create"))?;
        debug!("created cuBLAS handle");
        Ok(Self {
            device: device.clone(),
            handle,
            live: true,
        })
    }

    fn set_stream(&mut self, queue: &CudaQueue) -> Result<()> {
        unsafe { cublas::set_stream(self.handle, queue.0 as _) }
            .map_err(context_error("bind stream"))
    }

    fn stream_id(&self) -> Result<QueueId> {
        let mut stream: sys::cudaStream_t = std::ptr::null_mut();
        unsafe { sys::cublasGetStream_v2(self.handle, &mut stream) }
            .result()
            .map_err(context_error("get stream"))?;
        Ok(QueueId(stream as usize))
    }

    fn destroy(mut self) -> Result<()> {
        self.device.bind()?;
        self.live = false;
        unsafe { cublas::destroy_handle(self.handle) }.map_err(context_error("destroy"))
    }
}

impl Drop for CudaBlas {
    fn drop(&mut self) {
        if self.live {
            let _ = unsafe { cublas::destroy_handle(self.handle) };
        }
    }
}

fn op(trans: Transpose) -> sys::cublasOperation_t {
    match trans {
        Transpose::NoTrans => sys::cublasOperation_t::CUBLAS_OP_N,
        Transpose::Trans => sys::cublasOperation_t::CUBLAS_OP_T,
    }
}

fn call(precision: Precision, kind: KernelKind, status: sys::cublasStatus_t) -> Result<()> {
    status.result().map_err(|e| Error::KernelInvocation {
        routine: precision.routine_name(kind),
        code: e.0 as i64,
    })
}

macro_rules! blas_routines {
    ($t:ty, $p:expr, $axpy:ident, $dot:ident, $copy:ident, $iamax:ident, $iamin:ident, $gemv:ident, $gemm:ident) => {
        impl BlasRoutines<CudaDevice, $t> for CudaBlas {
            fn axpy(
                &self,
                n: i32,
                alpha: &$t,
                x: &CudaMemory,
                incx: i32,
                y: &mut CudaMemory,
                incy: i32,
            ) -> Result<()> {
                let status = unsafe {
                    sys::$axpy(
                        self.handle,
                        n,
                        alpha,
                        x.ptr() as *const $t,
                        incx,
                        y.ptr() as *mut $t,
                        incy,
                    )
                };
                call($p, KernelKind::Axpy, status)
            }

            fn dot(
                &self,
                n: i32,
                x: &CudaMemory,
                incx: i32,
                y: &CudaMemory,
                incy: i32,
                result: &mut $t,
            ) -> Result<()> {
                let status = unsafe {
                    sys::$dot(
                        self.handle,
                        n,
                        x.ptr() as *const $t,
                        incx,
                        y.ptr() as *const $t,
                        incy,
                        result,
                    )
                };
                call($p, KernelKind::Dot, status)
            }

            fn copy(
                &self,
                n: i32,
                x: &CudaMemory,
                incx: i32,
                y: &mut CudaMemory,
                incy: i32,
            ) -> Result<()> {
                let status = unsafe {
                    sys::$copy(
                        self.handle,
                        n,
                        x.ptr() as *const $t,
                        incx,
                        y.ptr() as *mut $t,
                        incy,
                    )
                };
                call($p, KernelKind::Copy, status)
            }

            fn iamax(&self, n: i32, x: &CudaMemory, incx: i32, result: &mut i32) -> Result<()> {
                let status =
                    unsafe { sys::$iamax(self.handle, n, x.ptr() as *const $t, incx, result) };
                call($p, KernelKind::Iamax, status)
            }

            fn iamin(&self, n: i32, x: &CudaMemory, incx: i32, result: &mut i32) -> Result<()> {
                let status =
                    unsafe { sys::$iamin(self.handle, n, x.ptr() as *const $t, incx, result) };
                call($p, KernelKind::Iamin, status)
            }

            fn gemv(
                &self,
                trans: Transpose,
                m: i32,
                n: i32,
                alpha: &$t,
                a: &CudaMemory,
                lda: i32,
                x: &CudaMemory,
                incx: i32,
                beta: &$t,
                y: &mut CudaMemory,
                incy: i32,
            ) -> Result<()> {
                let status = unsafe {
                    sys::$gemv(
                        self.handle,
                        op(trans),
                        m,
                        n,
                        alpha,
                        a.ptr() as *const $t,
                        lda,
                        x.ptr() as *const $t,
                        incx,
                        beta,
                        y.ptr() as *mut $t,
                        incy,
                    )
                };
                call($p, KernelKind::Gemv, status)
            }

            fn gemm(
                &self,
                transa: Transpose,
                transb: Transpose,
                m: i32,
                n: i32,
                k: i32,
                alpha: &$t,
                a: &CudaMemory,
                lda: i32,
                b: &CudaMemory,
                ldb: i32,
                beta: &$t,
                c: &mut CudaMemory,
                ldc: i32,
            ) -> Result<()> {
                let status = unsafe {
                    sys::$gemm(
                        self.handle,
                        op(transa),
                        op(transb),
                        m,
                        n,
                        k,
                        alpha,
                        a.ptr() as *const $t,
                        lda,
                        b.ptr() as *const $t,
                        ldb,
                        beta,
                        c.ptr() as *mut $t,
                        ldc,
                    )
                };
                call($p, KernelKind::Gemm, status)
            }
        }
    };
}

blas_routines!(
    f32,
    Precision::Single,
    cublasSaxpy_v2,
    cublasSdot_v2,
    cublasScopy_v2,
    cublasIsamax_v2,
    cublasIsamin_v2,
    cublasSgemv_v2,
    cublasSgemm_v2
);
blas_routines!(
    f64,
    Precision::Double,
    cublasDaxpy_v2,
    cublasDdot_v2,
    cublasDcopy_v2,
    cublasIdamax_v2,
    cublasIdamin_v2,
    cublasDgemv_v2,
    cublasDgemm_v2
);
