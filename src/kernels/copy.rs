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
pub struct CopyParams {
    pub n: usize,
    pub incx: usize,
    pub incy: usize,
    pub factor: f64,
}

impl fmt::Display for CopyParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "n={} incx={} incy={} factor={}",
            self.n, self.incx, self.incy, self.factor
        )
    }
}

/// `y := x` with `x[i] = factor * i`. Copies must be bit exact, the check
/// ignores the tolerance it is given.
pub struct CopyTester<'s, T: BlasFloat, D: Device> {
    ctx: BlasContext<'s, D>,
    x: Vector<T, D>,
    y: Vector<T, D>,
    factor: T,
}

impl<'s, T: BlasFloat, D: Device> CopyTester<'s, T, D> {
    pub fn new(stream: &'s Stream<D>, params: &CopyParams) -> Result<Self> {
        let ctx = BlasContext::new(stream)?;
        let device = stream.device();
        Ok(Self {
            x: Vector::new(device, params.n, params.incx)?,
            y: Vector::new(device, params.n, params.incy)?,
            factor: T::cast_from(params.factor),
            ctx,
        })
    }

    pub fn y_mut(&mut self) -> &mut Vector<T, D> {
        &mut self.y
    }

    fn source(&self, i: usize) -> T {
        self.factor * T::cast_from(i as f64)
    }
}

impl<T: BlasFloat, D: Device> KernelTester for CopyTester<'_, T, D>
where
    D::Blas: BlasRoutines<D, T>,
{
    fn name(&self) -> String {
        T::PRECISION.routine_name(KernelKind::Copy)
    }

    fn init(&mut self) -> Result<()> {
        for i in 0..self.x.len() {
            *self.x.el_mut(i) = self.source(i);
        }
        let stream = self.ctx.stream();
        self.x.copy_host_to_device_async(stream)?;
        self.y.copy_host_to_device_async(stream)?;
        stream.synchronize()
    }

    fn do_operation(&mut self) -> Result<()> {
        let inc_out = self.y.stride() as i32;
        BlasRoutines::<D, T>::copy(
            self.ctx.handle(),
            self.x.len() as i32,
            self.x.dev(),
            self.x.stride() as i32,
            self.y.dev_mut(),
            inc_out,
        )?;
        let stream = self.ctx.stream();
        self.y.copy_device_to_host_async(stream)?;
        stream.synchronize()
    }

    fn check(&self, _tolerance: f64) -> CheckReport {
        let mut report = CheckReport::new(self.name());
        for i in 0..self.y.len() {
            report.compare(
                Location::Index(i),
                self.source(i).as_f64(),
                self.y.el(i).as_f64(),
                0.0,
            );
        }
        report
    }
}
