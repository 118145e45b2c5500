use std::fmt;

use crate::{
    context::BlasContext,
    device::{BlasRoutines, Device},
    error::Result,
    scalar::{BlasFloat, KernelKind, Transpose},
    stream::Stream,
    tester::{CheckReport, KernelTester, Location, Mismatch},
    view::{Matrix, Vector},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GemvParams {
    pub trans: Transpose,
    pub m: usize,
    pub n: usize,
    pub incx: usize,
    pub incy: usize,
    pub alpha: f64,
    pub beta: f64,
}

impl fmt::Display for GemvParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "trans={} m={} n={} incx={} incy={} alpha={} beta={}",
            self.trans.symbol(),
            self.m,
            self.n,
            self.incx,
            self.incy,
            self.alpha,
            self.beta
        )
    }
}

/// `y := alpha * op(A) * x + beta * y` with `A` all ones (`m × n` regardless of
/// the flag), `x[i] = i`, `y[i] = 2i`. Transposing swaps the lengths of `x`
/// and `y`, and every `y[i]` becomes `alpha * L * (L - 1) / 2 + 2 * beta * i`
/// where `L` is the length of `x`.
pub struct GemvTester<'s, T: BlasFloat, D: Device> {
    ctx: BlasContext<'s, D>,
    trans: Transpose,
    a: Matrix<T, D>,
    x: Vector<T, D>,
    y: Vector<T, D>,
    alpha: T,
    beta: T,
}

impl<'s, T: BlasFloat, D: Device> GemvTester<'s, T, D> {
    pub fn new(stream: &'s Stream<D>, params: &GemvParams) -> Result<Self> {
        let ctx = BlasContext::new(stream)?;
        let device = stream.device();
        let (len_x, len_y) = if params.trans.is_trans() {
            (params.m, params.n)
        } else {
            (params.n, params.m)
        };
        Ok(Self {
            trans: params.trans,
            a: Matrix::new(device, params.m, params.n)?,
            x: Vector::new(device, len_x, params.incx)?,
            y: Vector::new(device, len_y, params.incy)?,
            alpha: T::cast_from(params.alpha),
            beta: T::cast_from(params.beta),
            ctx,
        })
    }

    pub fn y_mut(&mut self) -> &mut Vector<T, D> {
        &mut self.y
    }
}

impl<T: BlasFloat, D: Device> KernelTester for GemvTester<'_, T, D>
where
    D::Blas: BlasRoutines<D, T>,
{
    fn name(&self) -> String {
        T::PRECISION.routine_name(KernelKind::Gemv)
    }

    fn init(&mut self) -> Result<()> {
        for c in 0..self.a.cols() {
            for r in 0..self.a.rows() {
                *self.a.el_mut(r, c) = T::one();
            }
        }
        for i in 0..self.x.len() {
            *self.x.el_mut(i) = T::cast_from(i as f64);
        }
        for i in 0..self.y.len() {
            *self.y.el_mut(i) = T::cast_from(2.0 * i as f64);
        }
        let stream = self.ctx.stream();
        self.a.copy_host_to_device_async(stream)?;
        self.x.copy_host_to_device_async(stream)?;
        self.y.copy_host_to_device_async(stream)?;
        stream.synchronize()
    }

    fn do_operation(&mut self) -> Result<()> {
        let inc_out = self.y.stride() as i32;
        self.ctx.handle().gemv(
            self.trans,
            self.a.rows() as i32,
            self.a.cols() as i32,
            &self.alpha,
            self.a.dev(),
            self.a.leading_dim().max(1) as i32,
            self.x.dev(),
            self.x.stride() as i32,
            &self.beta,
            self.y.dev_mut(),
            inc_out,
        )?;
        let stream = self.ctx.stream();
        self.y.copy_device_to_host_async(stream)?;
        stream.synchronize()
    }

    fn check(&self, tolerance: f64) -> CheckReport {
        let mut report = CheckReport::new(self.name());
        let (len_x, len_y) = if self.trans.is_trans() {
            (self.a.rows(), self.a.cols())
        } else {
            (self.a.cols(), self.a.rows())
        };
        if self.x.len() != len_x || self.y.len() != len_y {
            report.push(Mismatch::Shape {
                expected: (len_y, 1),
                actual: (self.y.len(), 1),
            });
            return report;
        }
        let (alpha, beta) = (self.alpha.as_f64(), self.beta.as_f64());
        let sum = (len_x * len_x.saturating_sub(1)) as f64 / 2.0;
        for i in 0..len_y {
            report.compare(
                Location::Index(i),
                alpha * sum + 2.0 * beta * i as f64,
                self.y.el(i).as_f64(),
                tolerance,
            );
        }
        report
    }
}
