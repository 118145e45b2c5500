use std::fmt;

use crate::{
    context::BlasContext,
    device::{BlasRoutines, Device},
    error::Result,
    scalar::{BlasFloat, KernelKind},
    stream::Stream,
    tester::{CheckReport, KernelTester, Location},
    view::Vector,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxpyParams {
    pub n: usize,
    pub incx: usize,
    pub incy: usize,
    pub alpha: f64,
}

impl fmt::Display for AxpyParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "n={} incx={} incy={} alpha={}",
            self.n, self.incx, self.incy, self.alpha
        )
    }
}

/// `y := alpha * x + y` with `x[i] = i`, `y[i] = 2i`, so `y[i]` ends up `(alpha + 2) * i`.
pub struct AxpyTester<'s, T: BlasFloat, D: Device> {
    ctx: BlasContext<'s, D>,
    x: Vector<T, D>,
    y: Vector<T, D>,
    alpha: T,
}

impl<'s, T: BlasFloat, D: Device> AxpyTester<'s, T, D> {
    pub fn new(stream: &'s Stream<D>, params: &AxpyParams) -> Result<Self> {
        let ctx = BlasContext::new(stream)?;
        let device = stream.device();
        Ok(Self {
            x: Vector::new(device, params.n, params.incx)?,
            y: Vector::new(device, params.n, params.incy)?,
            alpha: T::cast_from(params.alpha),
            ctx,
        })
    }

    pub fn y(&self) -> &Vector<T, D> {
        &self.y
    }

    pub fn y_mut(&mut self) -> &mut Vector<T, D> {
        &mut self.y
    }
}

impl<T: BlasFloat, D: Device> KernelTester for AxpyTester<'_, T, D>
where
    D::Blas: BlasRoutines<D, T>,
{
    fn name(&self) -> String {
        T::PRECISION.routine_name(KernelKind::Axpy)
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
        let inc_out = self.y.stride() as i32;
        self.ctx.handle().axpy(
            self.x.len() as i32,
            &self.alpha,
            self.x.dev(),
            self.x.stride() as i32,
            self.y.dev_mut(),
            inc_out,
        )?;
        let stream = self.ctx.stream();
        self.y.copy_device_to_host_async(stream)?;
        stream.synchronize()
    }

    fn check(&self, tolerance: f64) -> CheckReport {
        let mut report = CheckReport::new(self.name());
        let scale = self.alpha.as_f64() + 2.0;
        for i in 0..self.y.len() {
            report.compare(
                Location::Index(i),
                scale * i as f64,
                self.y.el(i).as_f64(),
                tolerance,
            );
        }
        report
    }
}
