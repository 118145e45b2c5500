use std::fmt;

use crate::{
    context::BlasContext,
    device::{BlasRoutines, Device},
    error::Result,
    scalar::{BlasFloat, KernelKind},
    stream::Stream,
    tester::{CheckReport, KernelTester, Location},
    view::{Scalar, Vector},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DotParams {
    pub n: usize,
    pub incx: usize,
    pub incy: usize,
}

impl fmt::Display for DotParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n={} incx={} incy={}", self.n, self.incx, self.incy)
    }
}

/// Closed form of `sum(i * 2i)` for `i < n`.
pub fn expected_dot(n: usize) -> f64 {
    let n = n as f64;
    (n - 1.0) * n * (2.0 * n - 1.0) / 3.0
}

/// `x[i] = i`, `y[i] = 2i`, the result lands in host memory.
pub struct DotTester<'s, T: BlasFloat, D: Device> {
    ctx: BlasContext<'s, D>,
    x: Vector<T, D>,
    y: Vector<T, D>,
    result: Scalar<T, D>,
}

impl<'s, T: BlasFloat, D: Device> DotTester<'s, T, D> {
    pub fn new(stream: &'s Stream<D>, params: &DotParams) -> Result<Self> {
        let ctx = BlasContext::new(stream)?;
        let device = stream.device();
        Ok(Self {
            x: Vector::new(device, params.n, params.incx)?,
            y: Vector::new(device, params.n, params.incy)?,
            result: Scalar::new(device)?,
            ctx,
        })
    }

    pub fn result(&self) -> T {
        self.result.get()
    }

    pub fn result_mut(&mut self) -> &mut T {
        self.result.el_mut()
    }
}

impl<T: BlasFloat, D: Device> KernelTester for DotTester<'_, T, D>
where
    D::Blas: BlasRoutines<D, T>,
{
    fn name(&self) -> String {
        T::PRECISION.routine_name(KernelKind::Dot)
    }

    fn init(&mut self) -> Result<()> {
        for i in 0..self.x.len() {
            *self.x.el_mut(i) = T::cast_from(i as f64);
            *self.y.el_mut(i) = T::cast_from(2.0 * i as f64);
        }
        let stream = self.ctx.stream();
        self.x.copy_host_to_device_async(stream)?;
        self.y.copy_host_to_device_async(stream)?;
        stream.synchronize()
    }

    fn do_operation(&mut self) -> Result<()> {
        self.ctx.handle().dot(
            self.x.len() as i32,
            self.x.dev(),
            self.x.stride() as i32,
            self.y.dev(),
            self.y.stride() as i32,
            self.result.el_mut(),
        )?;
        self.ctx.stream().synchronize()
    }

    fn check(&self, tolerance: f64) -> CheckReport {
        let mut report = CheckReport::new(self.name());
        report.compare(
            Location::Scalar,
            expected_dot(self.x.len()),
            self.result.get().as_f64(),
            tolerance,
        );
        report
    }
}
