use std::sync::Arc;

use gemm::Parallelism;

use super::{matrix_len, strided_len, SimDevice, SimHandle, SimMemory, SimQueue};
use crate::{
    device::{BlasRoutines, LibraryHandle, QueueId},
    error::{Error, Library, Result},
    scalar::{BlasFloat, KernelKind, Transpose},
};

/// BLAS status codes, numbered like cuBLAS.
pub mod status {
    pub const NOT_INITIALIZED: i64 = 1;
    pub const ALLOC_FAILED: i64 = 3;
    pub const INVALID_VALUE: i64 = 7;
    pub const EXECUTION_FAILED: i64 = 13;
}

#[derive(Debug)]
pub struct SimBlas(SimHandle);

impl LibraryHandle<SimDevice> for SimBlas {
    const LIBRARY: Library = Library::Blas;

    fn create(device: &Arc<SimDevice>) -> Result<Self> {
        SimHandle::create(device, Library::Blas, status::NOT_INITIALIZED).map(SimBlas)
    }

    fn set_stream(&mut self, queue: &SimQueue) -> Result<()> {
        self.0.set_stream(queue, status::INVALID_VALUE)
    }

    fn stream_id(&self) -> Result<QueueId> {
        Ok(self.0.queue)
    }

    fn destroy(mut self) -> Result<()> {
        self.0.destroy();
        Ok(())
    }
}

fn invalid(routine: &str) -> Error {
    Error::KernelInvocation {
        routine: routine.to_string(),
        code: status::INVALID_VALUE,
    }
}

fn out_of_bounds(routine: &str) -> Error {
    Error::KernelInvocation {
        routine: routine.to_string(),
        code: status::EXECUTION_FAILED,
    }
}

fn dim(routine: &str, v: i32) -> Result<usize> {
    usize::try_from(v).map_err(|_| invalid(routine))
}

/// Only positive increments are supported.
fn inc(routine: &str, v: i32) -> Result<usize> {
    if v > 0 {
        Ok(v as usize)
    } else {
        Err(invalid(routine))
    }
}

fn ld(routine: &str, v: i32, rows: usize) -> Result<usize> {
    let v = dim(routine, v)?;
    if v < rows.max(1) {
        return Err(invalid(routine));
    }
    Ok(v)
}

fn read<'a, T: BlasFloat>(mem: &'a SimMemory, needed: usize, routine: &str) -> Result<&'a [T]> {
    match mem.typed::<T>() {
        Some(data) if data.len() >= needed => Ok(data),
        _ => Err(out_of_bounds(routine)),
    }
}

fn write<'a, T: BlasFloat>(
    mem: &'a mut SimMemory,
    needed: usize,
    routine: &str,
) -> Result<&'a mut [T]> {
    match mem.typed_mut::<T>() {
        Some(data) if data.len() >= needed => Ok(data),
        _ => Err(out_of_bounds(routine)),
    }
}

/// Position of the first element whose magnitude wins `better` against all before it.
fn first_extremum<T: BlasFloat>(
    x: &[T],
    n: usize,
    incx: usize,
    better: impl Fn(T, T) -> bool,
) -> i32 {
    let mut best = 0;
    for i in 1..n {
        if better(x[i * incx].abs(), x[best * incx].abs()) {
            best = i;
        }
    }
    best as i32 + 1
}

impl<T: BlasFloat> BlasRoutines<SimDevice, T> for SimBlas {
    fn axpy(
        &self,
        n: i32,
        alpha: &T,
        x: &SimMemory,
        incx: i32,
        y: &mut SimMemory,
        incy: i32,
    ) -> Result<()> {
        let routine = T::PRECISION.routine_name(KernelKind::Axpy);
        let (incx, incy) = (inc(&routine, incx)?, inc(&routine, incy)?);
        self.0.launch(&routine, status::EXECUTION_FAILED)?;
        if n <= 0 {
            return Ok(());
        }
        let n = n as usize;
        let xs = read::<T>(x, strided_len(n, incx), &routine)?;
        let ys = write::<T>(y, strided_len(n, incy), &routine)?;
        let one = T::one();
        // y (n x 1) := 1 * y + alpha * x (n x 1) * [1]
        unsafe {
            gemm::gemm(
                n,
                1,
                1,
                ys.as_mut_ptr(),
                0,
                incy as isize,
                true,
                xs.as_ptr(),
                0,
                incx as isize,
                &one as *const T,
                0,
                0,
                T::one(),
                *alpha,
                false,
                false,
                false,
                Parallelism::None,
            );
        }
        Ok(())
    }

    fn dot(
        &self,
        n: i32,
        x: &SimMemory,
        incx: i32,
        y: &SimMemory,
        incy: i32,
        result: &mut T,
    ) -> Result<()> {
        let routine = T::PRECISION.routine_name(KernelKind::Dot);
        let (incx, incy) = (inc(&routine, incx)?, inc(&routine, incy)?);
        self.0.launch(&routine, status::EXECUTION_FAILED)?;
        let mut acc = T::zero();
        if n > 0 {
            let n = n as usize;
            let xs = read::<T>(x, strided_len(n, incx), &routine)?;
            let ys = read::<T>(y, strided_len(n, incy), &routine)?;
            // (1 x n) * (n x 1)
            unsafe {
                gemm::gemm(
                    1,
                    1,
                    n,
                    &mut acc as *mut T,
                    0,
                    0,
                    false,
                    xs.as_ptr(),
                    incx as isize,
                    0,
                    ys.as_ptr(),
                    0,
                    incy as isize,
                    T::zero(),
                    T::one(),
                    false,
                    false,
                    false,
                    Parallelism::None,
                );
            }
        }
        *result = acc;
        Ok(())
    }

    fn copy(
        &self,
        n: i32,
        x: &SimMemory,
        incx: i32,
        y: &mut SimMemory,
        incy: i32,
    ) -> Result<()> {
        let routine = T::PRECISION.routine_name(KernelKind::Copy);
        let (incx, incy) = (inc(&routine, incx)?, inc(&routine, incy)?);
        self.0.launch(&routine, status::EXECUTION_FAILED)?;
        if n <= 0 {
            return Ok(());
        }
        let n = n as usize;
        let xs = read::<T>(x, strided_len(n, incx), &routine)?;
        let ys = write::<T>(y, strided_len(n, incy), &routine)?;
        for i in 0..n {
            ys[i * incy] = xs[i * incx];
        }
        Ok(())
    }

    fn iamax(&self, n: i32, x: &SimMemory, incx: i32, result: &mut i32) -> Result<()> {
        let routine = T::PRECISION.routine_name(KernelKind::Iamax);
        let incx = inc(&routine, incx)?;
        self.0.launch(&routine, status::EXECUTION_FAILED)?;
        *result = 0;
        if n > 0 {
            let n = n as usize;
            let xs = read::<T>(x, strided_len(n, incx), &routine)?;
            *result = first_extremum(xs, n, incx, |a, b| a > b);
        }
        Ok(())
    }

    fn iamin(&self, n: i32, x: &SimMemory, incx: i32, result: &mut i32) -> Result<()> {
        let routine = T::PRECISION.routine_name(KernelKind::Iamin);
        let incx = inc(&routine, incx)?;
        self.0.launch(&routine, status::EXECUTION_FAILED)?;
        *result = 0;
        if n > 0 {
            let n = n as usize;
            let xs = read::<T>(x, strided_len(n, incx), &routine)?;
            *result = first_extremum(xs, n, incx, |a, b| a < b);
        }
        Ok(())
    }

    fn gemv(
        &self,
        trans: Transpose,
        m: i32,
        n: i32,
        alpha: &T,
        a: &SimMemory,
        lda: i32,
        x: &SimMemory,
        incx: i32,
        beta: &T,
        y: &mut SimMemory,
        incy: i32,
    ) -> Result<()> {
        let routine = T::PRECISION.routine_name(KernelKind::Gemv);
        let (m, n) = (dim(&routine, m)?, dim(&routine, n)?);
        let lda = ld(&routine, lda, m)?;
        let (incx, incy) = (inc(&routine, incx)?, inc(&routine, incy)?);
        self.0.launch(&routine, status::EXECUTION_FAILED)?;
        if m == 0 || n == 0 {
            return Ok(());
        }
        let (len_x, len_y) = if trans.is_trans() { (m, n) } else { (n, m) };
        let (a_rs, a_cs) = if trans.is_trans() {
            (lda as isize, 1)
        } else {
            (1, lda as isize)
        };
        let a_data = read::<T>(a, matrix_len(m, n, lda), &routine)?;
        let xs = read::<T>(x, strided_len(len_x, incx), &routine)?;
        let ys = write::<T>(y, strided_len(len_y, incy), &routine)?;
        // y (len_y x 1) := beta * y + alpha * op(A) (len_y x len_x) * x (len_x x 1)
        unsafe {
            gemm::gemm(
                len_y,
                1,
                len_x,
                ys.as_mut_ptr(),
                0,
                incy as isize,
                !beta.is_zero(),
                a_data.as_ptr(),
                a_cs,
                a_rs,
                xs.as_ptr(),
                0,
                incx as isize,
                *beta,
                *alpha,
                false,
                false,
                false,
                Parallelism::None,
            );
        }
        Ok(())
    }

    fn gemm(
        &self,
        transa: Transpose,
        transb: Transpose,
        m: i32,
        n: i32,
        k: i32,
        alpha: &T,
        a: &SimMemory,
        lda: i32,
        b: &SimMemory,
        ldb: i32,
        beta: &T,
        c: &mut SimMemory,
        ldc: i32,
    ) -> Result<()> {
        let routine = T::PRECISION.routine_name(KernelKind::Gemm);
        let (m, n, k) = (dim(&routine, m)?, dim(&routine, n)?, dim(&routine, k)?);
        // Stored shapes of A and B
        let (a_rows, a_cols) = if transa.is_trans() { (k, m) } else { (m, k) };
        let (b_rows, b_cols) = if transb.is_trans() { (n, k) } else { (k, n) };
        let lda = ld(&routine, lda, a_rows)?;
        let ldb = ld(&routine, ldb, b_rows)?;
        let ldc = ld(&routine, ldc, m)?;
        self.0.launch(&routine, status::EXECUTION_FAILED)?;
        if m == 0 || n == 0 {
            return Ok(());
        }
        let cs = write::<T>(c, matrix_len(m, n, ldc), &routine)?;
        if k == 0 {
            for col in 0..n {
                for row in 0..m {
                    let v = &mut cs[col * ldc + row];
                    *v = if beta.is_zero() { T::zero() } else { *beta * *v };
                }
            }
            return Ok(());
        }
        let a_data = read::<T>(a, matrix_len(a_rows, a_cols, lda), &routine)?;
        let b_data = read::<T>(b, matrix_len(b_rows, b_cols, ldb), &routine)?;
        let (a_rs, a_cs) = if transa.is_trans() {
            (lda as isize, 1)
        } else {
            (1, lda as isize)
        };
        let (b_rs, b_cs) = if transb.is_trans() {
            (ldb as isize, 1)
        } else {
            (1, ldb as isize)
        };
        unsafe {
            gemm::gemm(
                m,
                n,
                k,
                cs.as_mut_ptr(),
                ldc as isize,
                1,
                !beta.is_zero(),
                a_data.as_ptr(),
                a_cs,
                a_rs,
                b_data.as_ptr(),
                b_cs,
                b_rs,
                *beta,
                *alpha,
                false,
                false,
                false,
                Parallelism::None,
            );
        }
        Ok(())
    }
}
