use std::sync::Arc;

use nalgebra::{DMatrix, DVector, RealField};

use super::{matrix_len, SimDevice, SimHandle, SimMemory, SimQueue};
use crate::{
    device::{DeviceMemory, LibraryHandle, QueueId, SolverRoutines},
    error::{Error, Library, Result},
    scalar::{BlasFloat, KernelKind},
};

/// SOLVER status codes, numbered like cuSOLVER.
pub mod status {
    pub const NOT_INITIALIZED: i64 = 1;
    pub const ALLOC_FAILED: i64 = 2;
    pub const INVALID_VALUE: i64 = 3;
    pub const EXECUTION_FAILED: i64 = 6;
}

#[derive(Debug)]
pub struct SimSolver(SimHandle);

impl LibraryHandle<SimDevice> for SimSolver {
    const LIBRARY: Library = Library::Solver;

    fn create(device: &Arc<SimDevice>) -> Result<Self> {
        SimHandle::create(device, Library::Solver, status::NOT_INITIALIZED).map(SimSolver)
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

fn status_error(routine: &str, code: i64) -> Error {
    Error::KernelInvocation {
        routine: routine.to_string(),
        code,
    }
}

/// Validated `(n, nrhs)` for a gesv call.
fn gesv_dims(routine: &str, n: i32, nrhs: i32, lds: [i32; 3]) -> Result<(usize, usize)> {
    let invalid = || status_error(routine, status::INVALID_VALUE);
    let n = usize::try_from(n).map_err(|_| invalid())?;
    let nrhs = usize::try_from(nrhs).map_err(|_| invalid())?;
    if lds.iter().any(|&ld| ld < 1 || (ld as usize) < n) {
        return Err(invalid());
    }
    Ok((n, nrhs))
}

/// Room for a factored copy of A plus the solution, as a mixed precision
/// refinement would keep.
fn workspace_bytes<T>(n: usize, nrhs: usize) -> usize {
    (n * n + n * nrhs) * std::mem::size_of::<T>()
}

/// LAPACK style pivots (1-based, row `i` swapped with row `ipiv[i]`) that
/// reproduce the row order `order`.
fn swap_sequence(order: &[usize]) -> Vec<i32> {
    let mut current: Vec<usize> = (0..order.len()).collect();
    let mut ipiv = Vec::with_capacity(order.len());
    for (i, target) in order.iter().enumerate() {
        let j = current[i..]
            .iter()
            .position(|row| row == target)
            .map_or(i, |p| p + i);
        current.swap(i, j);
        ipiv.push(j as i32 + 1);
    }
    ipiv
}

impl<T: BlasFloat + RealField> SolverRoutines<SimDevice, T> for SimSolver {
    fn gesv_buffer_size(
        &self,
        n: i32,
        nrhs: i32,
        _a: &SimMemory,
        lda: i32,
        _ipiv: &SimMemory,
        _b: &SimMemory,
        ldb: i32,
        _x: &SimMemory,
        ldx: i32,
    ) -> Result<usize> {
        let routine = T::PRECISION.routine_name(KernelKind::Gesv);
        let (n, nrhs) = gesv_dims(&routine, n, nrhs, [lda, ldb, ldx])?;
        Ok(workspace_bytes::<T>(n, nrhs))
    }

    fn gesv(
        &self,
        n: i32,
        nrhs: i32,
        a: &mut SimMemory,
        lda: i32,
        ipiv: &mut SimMemory,
        b: &SimMemory,
        ldb: i32,
        x: &mut SimMemory,
        ldx: i32,
        work: &mut SimMemory,
        work_bytes: usize,
        iters: &mut i32,
        info: &mut SimMemory,
    ) -> Result<()> {
        let routine = T::PRECISION.routine_name(KernelKind::Gesv);
        let (n, nrhs) = gesv_dims(&routine, n, nrhs, [lda, ldb, ldx])?;
        let (lda, ldb, ldx) = (lda as usize, ldb as usize, ldx as usize);
        if work_bytes < workspace_bytes::<T>(n, nrhs) || work.byte_len() < work_bytes {
            return Err(status_error(&routine, status::INVALID_VALUE));
        }
        self.0.launch(&routine, status::EXECUTION_FAILED)?;
        *iters = 0;

        let out_of_bounds = || status_error(&routine, status::EXECUTION_FAILED);
        let a_data = a
            .typed::<T>()
            .filter(|d| d.len() >= matrix_len(n, n, lda))
            .ok_or_else(out_of_bounds)?;
        let b_data = b
            .typed::<T>()
            .filter(|d| d.len() >= matrix_len(n, nrhs, ldb))
            .ok_or_else(out_of_bounds)?;
        let mat = DMatrix::from_fn(n, n, |r, c| a_data[c * lda + r]);
        let rhs = DMatrix::from_fn(n, nrhs, |r, c| b_data[c * ldb + r]);

        let lu = mat.lu();
        let (l, u) = (lu.l(), lu.u());
        let singular = (0..n).find(|&i| u[(i, i)] == T::zero());

        let mut order = DVector::from_fn(n, |i, _| i);
        lu.p().permute_rows(&mut order);
        let pivots = swap_sequence(order.as_slice());
        ipiv.typed_mut::<i32>()
            .filter(|d| d.len() >= n)
            .ok_or_else(out_of_bounds)?[..n]
            .copy_from_slice(&pivots);

        // A is overwritten by its factors, unit diagonal of L implied
        let factors = a.typed_mut::<T>().ok_or_else(out_of_bounds)?;
        for c in 0..n {
            for r in 0..n {
                factors[c * lda + r] = if r > c { l[(r, c)] } else { u[(r, c)] };
            }
        }

        let code = match singular {
            Some(i) => i as i32 + 1,
            None => match lu.solve(&rhs) {
                Some(solution) => {
                    let xs = x
                        .typed_mut::<T>()
                        .filter(|d| d.len() >= matrix_len(n, nrhs, ldx))
                        .ok_or_else(out_of_bounds)?;
                    for c in 0..nrhs {
                        for r in 0..n {
                            xs[c * ldx + r] = solution[(r, c)];
                        }
                    }
                    0
                }
                None => n as i32,
            },
        };
        info.typed_mut::<i32>()
            .and_then(|d| d.first_mut())
            .ok_or_else(out_of_bounds)
            .map(|slot| *slot = code)
    }
}
