use std::fmt;

use crate::{
    context::BlasContext,
    device::{BlasRoutines, Device},
    error::Result,
    scalar::{BlasFloat, KernelKind, Transpose},
    stream::Stream,
    tester::{CheckReport, KernelTester, Location, Mismatch},
    view::Matrix,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GemmParams {
    pub transa: Transpose,
    pub transb: Transpose,
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub alpha: f64,
    pub beta: f64,
}

impl fmt::Display for GemmParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "op={}{} m={} n={} k={} alpha={} beta={}",
            self.transa.symbol(),
            self.transb.symbol(),
            self.m,
            self.n,
            self.k,
            self.alpha,
            self.beta
        )
    }
}

/// `C := alpha * op(A) * op(B) + beta * C`.
///
/// `op(A)` is ones in its first column, `op(B)` ones in its first row, so the
/// product is all ones. With `C[r, c] = r * c` the result must be
/// `alpha + beta * r * c`. Storage of A and B follows their transpose flags,
/// the leading dimension is always the stored row count.
pub struct GemmTester<'s, T: BlasFloat, D: Device> {
    ctx: BlasContext<'s, D>,
    transa: Transpose,
    transb: Transpose,
    a: Matrix<T, D>,
    b: Matrix<T, D>,
    c: Matrix<T, D>,
    alpha: T,
    beta: T,
}

impl<'s, T: BlasFloat, D: Device> GemmTester<'s, T, D> {
    pub fn new(stream: &'s Stream<D>, params: &GemmParams) -> Result<Self> {
        let ctx = BlasContext::new(stream)?;
        let device = stream.device();
        let GemmParams { m, n, k, .. } = *params;
        let (a_rows, a_cols) = if params.transa.is_trans() { (k, m) } else { (m, k) };
        let (b_rows, b_cols) = if params.transb.is_trans() { (n, k) } else { (k, n) };
        Ok(Self {
            transa: params.transa,
            transb: params.transb,
            a: Matrix::new(device, a_rows, a_cols)?,
            b: Matrix::new(device, b_rows, b_cols)?,
            c: Matrix::new(device, m, n)?,
            alpha: T::cast_from(params.alpha),
            beta: T::cast_from(params.beta),
            ctx,
        })
    }

    pub fn a(&self) -> &Matrix<T, D> {
        &self.a
    }

    pub fn b(&self) -> &Matrix<T, D> {
        &self.b
    }

    pub fn c(&self) -> &Matrix<T, D> {
        &self.c
    }

    /// Logical `(m, k, n)`.
    fn dims(&self) -> (usize, usize, usize) {
        let (m, k) = if self.transa.is_trans() {
            (self.a.cols(), self.a.rows())
        } else {
            (self.a.rows(), self.a.cols())
        };
        let n = if self.transb.is_trans() {
            self.b.rows()
        } else {
            self.b.cols()
        };
        (m, k, n)
    }
}

/// Compare `c` against `alpha + beta * r * c` for an expected `rows × cols` result.
pub fn check_product<T: BlasFloat, D: Device>(
    kernel: String,
    c: &Matrix<T, D>,
    expected: (usize, usize),
    alpha: T,
    beta: T,
    tolerance: f64,
) -> CheckReport {
    let mut report = CheckReport::new(kernel);
    if (c.rows(), c.cols()) != expected {
        report.push(Mismatch::Shape {
            expected,
            actual: (c.rows(), c.cols()),
        });
        return report;
    }
    let (alpha, beta) = (alpha.as_f64(), beta.as_f64());
    for col in 0..c.cols() {
        for row in 0..c.rows() {
            report.compare(
                Location::Element(row, col),
                alpha + beta * (row * col) as f64,
                c.el(row, col).as_f64(),
                tolerance,
            );
        }
    }
    report
}

impl<T: BlasFloat, D: Device> KernelTester for GemmTester<'_, T, D>
where
    D::Blas: BlasRoutines<D, T>,
{
    fn name(&self) -> String {
        T::PRECISION.routine_name(KernelKind::Gemm)
    }

    fn init(&mut self) -> Result<()> {
        let (m, k, n) = self.dims();
        if k > 0 {
            for r in 0..m {
                let el = if self.transa.is_trans() {
                    self.a.el_mut(0, r)
                } else {
                    self.a.el_mut(r, 0)
                };
                *el = T::one();
            }
            for c in 0..n {
                let el = if self.transb.is_trans() {
                    self.b.el_mut(c, 0)
                } else {
                    self.b.el_mut(0, c)
                };
                *el = T::one();
            }
        }
        for c in 0..self.c.cols() {
            for r in 0..self.c.rows() {
                *self.c.el_mut(r, c) = T::cast_from((r * c) as f64);
            }
        }
        let stream = self.ctx.stream();
        self.a.copy_host_to_device_async(stream)?;
        self.b.copy_host_to_device_async(stream)?;
        self.c.copy_host_to_device_async(stream)?;
        stream.synchronize()
    }

    fn do_operation(&mut self) -> Result<()> {
        let inc_out = self.c.leading_dim().max(1) as i32;
        let (m, k, n) = self.dims();
        self.ctx.handle().gemm(
            self.transa,
            self.transb,
            m as i32,
            n as i32,
            k as i32,
            &self.alpha,
            self.a.dev(),
            self.a.leading_dim().max(1) as i32,
            self.b.dev(),
            self.b.leading_dim().max(1) as i32,
            &self.beta,
            self.c.dev_mut(),
            inc_out,
        )?;
        let stream = self.ctx.stream();
        self.c.copy_device_to_host_async(stream)?;
        stream.synchronize()
    }

    fn check(&self, tolerance: f64) -> CheckReport {
        let (m, k, n) = self.dims();
        // An empty inner dimension leaves no ones to multiply
        let alpha = if k > 0 { self.alpha } else { T::zero() };
        check_product(self.name(), &self.c, (m, n), alpha, self.beta, tolerance)
    }
}
