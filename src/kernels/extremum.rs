use std::fmt;

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    context::BlasContext,
    device::{BlasRoutines, Device},
    error::Result,
    scalar::{BlasFloat, KernelKind},
    stream::Stream,
    tester::{CheckReport, KernelTester, Location},
    view::Vector,
};

/// Whether the routine looks for the largest or smallest magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extremum {
    Max,
    Min,
}

impl Extremum {
    pub fn kernel(self) -> KernelKind {
        match self {
            Extremum::Max => KernelKind::Iamax,
            Extremum::Min => KernelKind::Iamin,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtremumParams {
    pub n: usize,
    pub incx: usize,
    pub seed: u64,
}

impl fmt::Display for ExtremumParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n={} incx={} seed={}", self.n, self.incx, self.seed)
    }
}

/// 0-based index of the first element with the extremal magnitude.
pub fn first_extremal_index<T: BlasFloat>(
    values: impl IntoIterator<Item = T>,
    which: Extremum,
) -> Option<usize> {
    let mut best: Option<(usize, T)> = None;
    for (i, v) in values.into_iter().enumerate() {
        let v = v.abs();
        let better = match (best, which) {
            (None, _) => true,
            (Some((_, b)), Extremum::Max) => v > b,
            (Some((_, b)), Extremum::Min) => v < b,
        };
        if better {
            best = Some((i, v));
        }
    }
    best.map(|(i, _)| i)
}

/// `i?amax` / `i?amin` over uniform values in `[-100, 100]`. The routine's
/// 1-based answer must equal the host scan's index plus one.
pub struct ExtremumTester<'s, T: BlasFloat, D: Device> {
    ctx: BlasContext<'s, D>,
    which: Extremum,
    x: Vector<T, D>,
    rng: StdRng,
    result: i32,
}

impl<'s, T: BlasFloat, D: Device> ExtremumTester<'s, T, D> {
    pub fn new(stream: &'s Stream<D>, which: Extremum, params: &ExtremumParams) -> Result<Self> {
        let ctx = BlasContext::new(stream)?;
        Ok(Self {
            x: Vector::new(stream.device(), params.n, params.incx)?,
            which,
            rng: StdRng::seed_from_u64(params.seed),
            result: -1,
            ctx,
        })
    }

    pub fn x_mut(&mut self) -> &mut Vector<T, D> {
        &mut self.x
    }
}

impl<T: BlasFloat, D: Device> KernelTester for ExtremumTester<'_, T, D>
where
    D::Blas: BlasRoutines<D, T>,
{
    fn name(&self) -> String {
        T::PRECISION.routine_name(self.which.kernel())
    }

    fn init(&mut self) -> Result<()> {
        for i in 0..self.x.len() {
            *self.x.el_mut(i) = T::cast_from(self.rng.gen_range(-100.0..=100.0));
        }
        let stream = self.ctx.stream();
        self.x.copy_host_to_device_async(stream)?;
        stream.synchronize()
    }

    fn do_operation(&mut self) -> Result<()> {
        let (n, incx) = (self.x.len() as i32, self.x.stride() as i32);
        let handle = self.ctx.handle();
        match self.which {
            Extremum::Max => {
                BlasRoutines::<D, T>::iamax(handle, n, self.x.dev(), incx, &mut self.result)?
            }
            Extremum::Min => {
                BlasRoutines::<D, T>::iamin(handle, n, self.x.dev(), incx, &mut self.result)?
            }
        }
        self.ctx.stream().synchronize()
    }

    fn check(&self, _tolerance: f64) -> CheckReport {
        let mut report = CheckReport::new(self.name());
        let expected = first_extremal_index(self.x.values(), self.which).map_or(0, |i| i + 1);
        report.compare_exact(Location::Scalar, expected as i64, self.result as i64);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_extremal_index() {
        let xs = [1.0f32, -5.0, 5.0, 0.25, -0.25];
        assert_eq!(first_extremal_index(xs, Extremum::Max), Some(1));
        assert_eq!(first_extremal_index(xs, Extremum::Min), Some(3));
        assert_eq!(first_extremal_index::<f64>([], Extremum::Max), None);
    }
}
