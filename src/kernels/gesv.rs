use std::fmt;

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    buffer::Buffer,
    context::SolverContext,
    device::{Device, SolverRoutines},
    error::Result,
    scalar::{BlasFloat, KernelKind},
    stream::Stream,
    tester::{CheckReport, KernelTester, Location},
    view::{Matrix, Scalar, Vector},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GesvParams {
    pub n: usize,
    pub nrhs: usize,
    pub seed: u64,
}

impl fmt::Display for GesvParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n={} nrhs={} seed={}", self.n, self.nrhs, self.seed)
    }
}

/// Solves `A·X = B` for uniform random `A` (`n × n`) and `B` (`n × nrhs`) in
/// `[-100, 100]`, then checks `A·X` against `B` element by element.
///
/// A non-zero `info` from the solver skips the check.
pub struct GesvTester<'s, T: BlasFloat, D: Device> {
    ctx: SolverContext<'s, D>,
    a: Matrix<T, D>,
    ipiv: Vector<i32, D>,
    b: Matrix<T, D>,
    x: Matrix<T, D>,
    iters: i32,
    info: Scalar<i32, D>,
    rng: StdRng,
    preset: bool,
}

impl<'s, T: BlasFloat, D: Device> GesvTester<'s, T, D> {
    pub fn new(stream: &'s Stream<D>, params: &GesvParams) -> Result<Self> {
        let ctx = SolverContext::new(stream)?;
        let device = stream.device();
        let GesvParams { n, nrhs, seed } = *params;
        Ok(Self {
            a: Matrix::new(device, n, n)?,
            ipiv: Vector::new(device, n, 1)?,
            b: Matrix::new(device, n, nrhs)?,
            x: Matrix::new(device, n, nrhs)?,
            iters: 0,
            info: Scalar::new(device)?,
            rng: StdRng::seed_from_u64(seed),
            preset: false,
            ctx,
        })
    }

    /// Use the given column-major operands instead of random ones.
    pub fn set_operands(&mut self, a: &[T], b: &[T]) {
        self.a.host_mut().copy_from_slice(a);
        self.b.host_mut().copy_from_slice(b);
        self.preset = true;
    }

    pub fn info(&self) -> i32 {
        self.info.get()
    }

    pub fn iterations(&self) -> i32 {
        self.iters
    }

    pub fn pivots(&self) -> &Vector<i32, D> {
        &self.ipiv
    }

    pub fn solution(&self) -> &Matrix<T, D> {
        &self.x
    }

    pub fn solution_mut(&mut self) -> &mut Matrix<T, D> {
        &mut self.x
    }
}

impl<T: BlasFloat, D: Device> KernelTester for GesvTester<'_, T, D>
where
    D::Solver: SolverRoutines<D, T>,
{
    fn name(&self) -> String {
        T::PRECISION.routine_name(KernelKind::Gesv)
    }

    fn init(&mut self) -> Result<()> {
        if !self.preset {
            // Matrix storage is contiguous, fill it in one pass
            for v in self.a.host_mut().iter_mut() {
                *v = T::cast_from(self.rng.gen_range(-100.0..=100.0));
            }
            for v in self.b.host_mut().iter_mut() {
                *v = T::cast_from(self.rng.gen_range(-100.0..=100.0));
            }
        }
        let stream = self.ctx.stream();
        self.a.copy_host_to_device_async(stream)?;
        self.b.copy_host_to_device_async(stream)?;
        stream.synchronize()
    }

    fn do_operation(&mut self) -> Result<()> {
        let stream = self.ctx.stream();
        let handle = self.ctx.handle();
        let (n, nrhs) = (self.a.rows() as i32, self.b.cols() as i32);
        let lda = self.a.leading_dim().max(1) as i32;
        let ldb = self.b.leading_dim().max(1) as i32;
        let ldx = self.x.leading_dim().max(1) as i32;

        let work_bytes = SolverRoutines::<D, T>::gesv_buffer_size(
            handle,
            n,
            nrhs,
            self.a.dev(),
            lda,
            self.ipiv.dev(),
            self.b.dev(),
            ldb,
            self.x.dev(),
            ldx,
        )?;
        let mut work = Buffer::<u8, D>::new(stream.device(), work_bytes)?;

        SolverRoutines::<D, T>::gesv(
            handle,
            n,
            nrhs,
            self.a.dev_mut(),
            lda,
            self.ipiv.dev_mut(),
            self.b.dev(),
            ldb,
            self.x.dev_mut(),
            ldx,
            work.dev_mut(),
            work_bytes,
            &mut self.iters,
            self.info.dev_mut(),
        )?;

        self.info.copy_device_to_host()?;
        if self.info.get() == 0 {
            self.x.copy_device_to_host_async(stream)?;
            self.ipiv.copy_device_to_host_async(stream)?;
        }
        stream.synchronize()
    }

    fn check(&self, tolerance: f64) -> CheckReport {
        let info = self.info.get();
        if info != 0 {
            return CheckReport::skipped(self.name(), format!("solver reported info = {info}"));
        }
        let mut report = CheckReport::new(self.name());
        let n = self.a.rows();
        let mut residual = 0.0f64;
        for c in 0..self.b.cols() {
            for r in 0..n {
                let ax: f64 = (0..n)
                    .map(|i| self.a.el(r, i).as_f64() * self.x.el(i, c).as_f64())
                    .sum();
                let b = self.b.el(r, c).as_f64();
                residual = residual.max((ax - b).abs());
                report.compare(Location::Element(r, c), b, ax, tolerance);
            }
        }
        report.residual_norm = Some(residual);
        report
    }
}
