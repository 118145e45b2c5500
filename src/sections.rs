//! Parameterized sections: every tester specialization is driven through its
//! lifecycle over a grid of fixed strides and flags crossed with randomly
//! drawn sizes and coefficients.

use std::{fmt, sync::Arc};

use itertools::iproduct;
use rand::{rngs::StdRng, Rng, SeedableRng};
use strum::IntoEnumIterator;
use tracing::{error, info, info_span, warn};

use crate::{
    config::HarnessConfig,
    device::{BlasRoutines, Device, SolverRoutines},
    error::Error,
    kernels::*,
    scalar::{BlasFloat, KernelKind, Precision, Transpose},
    stream::Stream,
    tester::{run, CheckReport, KernelTester},
};

pub const INCX_SET: [usize; 2] = [1, 4];
pub const INCY_SET: [usize; 2] = [1, 7];

fn size(config: &HarnessConfig, rng: &mut impl Rng) -> usize {
    rng.gen_range(config.min_size..=config.max_size)
}

pub fn axpy_cases(config: &HarnessConfig, rng: &mut impl Rng) -> Vec<AxpyParams> {
    let mut cases = vec![];
    for _ in 0..config.samples {
        let n = size(config, rng);
        let alpha = rng.gen_range(-2.5..=2.5);
        cases.extend(
            iproduct!(INCX_SET, INCY_SET).map(|(incx, incy)| AxpyParams {
                n,
                incx,
                incy,
                alpha,
            }),
        );
    }
    cases
}

pub fn dot_cases(config: &HarnessConfig, rng: &mut impl Rng) -> Vec<DotParams> {
    let mut cases = vec![];
    for _ in 0..config.samples {
        let n = size(config, rng);
        cases.extend(
            iproduct!(INCX_SET, INCY_SET).map(|(incx, incy)| DotParams { n, incx, incy }),
        );
    }
    cases
}

pub fn copy_cases(config: &HarnessConfig, rng: &mut impl Rng) -> Vec<CopyParams> {
    let mut cases = vec![];
    for _ in 0..config.samples {
        let n = size(config, rng);
        let factor = rng.gen_range(0.0..=1.5);
        cases.extend(
            iproduct!(INCX_SET, INCY_SET).map(|(incx, incy)| CopyParams {
                n,
                incx,
                incy,
                factor,
            }),
        );
    }
    cases
}

pub fn extremum_cases(config: &HarnessConfig, rng: &mut impl Rng) -> Vec<ExtremumParams> {
    let mut cases = vec![];
    for _ in 0..config.samples {
        let n = size(config, rng);
        for incx in INCX_SET {
            cases.push(ExtremumParams {
                n,
                incx,
                seed: rng.gen(),
            });
        }
    }
    cases
}

pub fn gemv_cases(config: &HarnessConfig, rng: &mut impl Rng) -> Vec<GemvParams> {
    let mut cases = vec![];
    for _ in 0..config.samples {
        let (m, n) = (size(config, rng), size(config, rng));
        let alpha = rng.gen_range(-1.0..=1.0);
        let beta = rng.gen_range(-2.5..=2.5);
        cases.extend(
            iproduct!(INCX_SET, INCY_SET, Transpose::iter()).map(|(incx, incy, trans)| {
                GemvParams {
                    trans,
                    m,
                    n,
                    incx,
                    incy,
                    alpha,
                    beta,
                }
            }),
        );
    }
    cases
}

pub fn gemm_cases(config: &HarnessConfig, rng: &mut impl Rng) -> Vec<GemmParams> {
    let mut cases = vec![];
    for _ in 0..config.samples {
        let (m, n, k) = (size(config, rng), size(config, rng), size(config, rng));
        let alpha = rng.gen_range(-1.0..=1.0);
        let beta = rng.gen_range(-2.5..=2.5);
        cases.extend(
            iproduct!(Transpose::iter(), Transpose::iter()).map(|(transa, transb)| GemmParams {
                transa,
                transb,
                m,
                n,
                k,
                alpha,
                beta,
            }),
        );
    }
    cases
}

/// One right hand side, then a random count.
pub fn gesv_cases(config: &HarnessConfig, rng: &mut impl Rng) -> Vec<GesvParams> {
    let mut cases = vec![];
    for _ in 0..config.samples {
        let n = size(config, rng);
        let many = rng.gen_range(config.min_nrhs..=config.max_nrhs);
        for nrhs in [1, many] {
            cases.push(GesvParams {
                n,
                nrhs,
                seed: rng.gen(),
            });
        }
    }
    cases
}

#[derive(Debug)]
pub enum Outcome {
    Passed(CheckReport),
    Failed(CheckReport),
    /// The library declined the problem, e.g. a singular matrix
    Skipped(CheckReport),
    Error(Error),
}

impl Outcome {
    pub fn from_result(result: Result<CheckReport, Error>) -> Self {
        match result {
            Ok(report) if report.is_skipped() => Outcome::Skipped(report),
            Ok(report) if report.passed() => Outcome::Passed(report),
            Ok(report) => Outcome::Failed(report),
            Err(e) => Outcome::Error(e),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed(_) | Outcome::Error(_))
    }

    pub fn report(&self) -> Option<&CheckReport> {
        match self {
            Outcome::Passed(r) | Outcome::Failed(r) | Outcome::Skipped(r) => Some(r),
            Outcome::Error(_) => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Passed(r) => write!(f, "passed ({r})"),
            Outcome::Failed(r) => write!(f, "FAILED ({r})"),
            Outcome::Skipped(r) => write!(f, "skipped ({r})"),
            Outcome::Error(e) => write!(f, "ERROR [{}] {e}", e.category()),
        }
    }
}

#[derive(Debug)]
pub struct InstanceOutcome {
    pub params: String,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl Summary {
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped + self.errors
    }

    pub fn ok(&self) -> bool {
        self.failed == 0 && self.errors == 0
    }

    fn add(&mut self, other: Summary) {
        self.passed += other.passed;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.errors += other.errors;
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} passed, {} failed, {} skipped, {} errors",
            self.passed, self.failed, self.skipped, self.errors
        )
    }
}

#[derive(Debug)]
pub struct SectionReport {
    pub name: String,
    pub default_stream: bool,
    pub instances: Vec<InstanceOutcome>,
}

impl SectionReport {
    pub fn summary(&self) -> Summary {
        let mut s = Summary::default();
        for inst in &self.instances {
            match inst.outcome {
                Outcome::Passed(_) => s.passed += 1,
                Outcome::Failed(_) => s.failed += 1,
                Outcome::Skipped(_) => s.skipped += 1,
                Outcome::Error(_) => s.errors += 1,
            }
        }
        s
    }

    pub fn passed(&self) -> bool {
        self.summary().ok()
    }

    pub fn stream_label(&self) -> &'static str {
        if self.default_stream {
            "default"
        } else {
            "custom"
        }
    }
}

/// Run every case on `stream`, recording errors and moving on to the next case.
pub fn run_cases<D, P, K>(
    name: String,
    stream: &Stream<D>,
    cases: &[P],
    tolerance: f64,
    build: impl Fn(&P) -> Result<K, Error>,
) -> SectionReport
where
    D: Device,
    P: fmt::Display,
    K: KernelTester,
{
    let span = info_span!("section", %name, stream = %stream.id());
    let _guard = span.enter();
    let mut instances = Vec::with_capacity(cases.len());
    for params in cases {
        let outcome = Outcome::from_result(build(params).and_then(|t| run(t, tolerance)));
        match &outcome {
            Outcome::Error(e) => error!(%params, "{e}"),
            Outcome::Failed(r) => warn!(%params, "{r}"),
            o => info!(%params, "{o}"),
        }
        instances.push(InstanceOutcome {
            params: params.to_string(),
            outcome,
        });
    }
    SectionReport {
        name,
        default_stream: stream.is_default(),
        instances,
    }
}

/// Draw cases for one kernel at precision `T` and run them.
pub fn kernel_section<T, D>(
    kernel: KernelKind,
    stream: &Stream<D>,
    config: &HarnessConfig,
    rng: &mut impl Rng,
) -> SectionReport
where
    T: BlasFloat,
    D: Device,
    D::Blas: BlasRoutines<D, T>,
    D::Solver: SolverRoutines<D, T>,
{
    let name = T::PRECISION.routine_name(kernel);
    let tol = config.rel_error_threshold;
    match kernel {
        KernelKind::Axpy => run_cases(name, stream, &axpy_cases(config, rng), tol, |p| {
            AxpyTester::<T, D>::new(stream, p)
        }),
        KernelKind::Dot => run_cases(name, stream, &dot_cases(config, rng), tol, |p| {
            DotTester::<T, D>::new(stream, p)
        }),
        KernelKind::Copy => run_cases(name, stream, &copy_cases(config, rng), tol, |p| {
            CopyTester::<T, D>::new(stream, p)
        }),
        KernelKind::Iamax => run_cases(name, stream, &extremum_cases(config, rng), tol, |p| {
            ExtremumTester::<T, D>::new(stream, Extremum::Max, p)
        }),
        KernelKind::Iamin => run_cases(name, stream, &extremum_cases(config, rng), tol, |p| {
            ExtremumTester::<T, D>::new(stream, Extremum::Min, p)
        }),
        KernelKind::Gemv => run_cases(name, stream, &gemv_cases(config, rng), tol, |p| {
            GemvTester::<T, D>::new(stream, p)
        }),
        KernelKind::Gemm => run_cases(name, stream, &gemm_cases(config, rng), tol, |p| {
            GemmTester::<T, D>::new(stream, p)
        }),
        KernelKind::Gesv => run_cases(name, stream, &gesv_cases(config, rng), tol, |p| {
            GesvTester::<T, D>::new(stream, p)
        }),
    }
}

/// Create the section's stream and run one kernel at one precision on it.
pub fn run_section<D>(
    device: &Arc<D>,
    kernel: KernelKind,
    precision: Precision,
    use_default: bool,
    config: &HarnessConfig,
    rng: &mut impl Rng,
) -> SectionReport
where
    D: Device,
    D::Blas: BlasRoutines<D, f32> + BlasRoutines<D, f64>,
    D::Solver: SolverRoutines<D, f32> + SolverRoutines<D, f64>,
{
    let stream = match Stream::new(device, use_default) {
        Ok(stream) => stream,
        Err(e) => {
            error!("failed to create stream: {e}");
            return SectionReport {
                name: precision.routine_name(kernel),
                default_stream: use_default,
                instances: vec![InstanceOutcome {
                    params: "stream".to_string(),
                    outcome: Outcome::Error(e),
                }],
            };
        }
    };
    match precision {
        Precision::Single => kernel_section::<f32, D>(kernel, &stream, config, rng),
        Precision::Double => kernel_section::<f64, D>(kernel, &stream, config, rng),
    }
}

#[derive(Debug)]
pub struct SuiteReport {
    pub device: String,
    pub seed: u64,
    pub sections: Vec<SectionReport>,
}

impl SuiteReport {
    pub fn summary(&self) -> Summary {
        let mut s = Summary::default();
        for section in &self.sections {
            s.add(section.summary());
        }
        s
    }

    pub fn passed(&self) -> bool {
        self.summary().ok()
    }
}

/// Every configured kernel and precision, on every configured stream mode.
pub fn run_suite<D>(device: &Arc<D>, config: &HarnessConfig) -> SuiteReport
where
    D: Device,
    D::Blas: BlasRoutines<D, f32> + BlasRoutines<D, f64>,
    D::Solver: SolverRoutines<D, f32> + SolverRoutines<D, f64>,
{
    let seed = config.resolve_seed();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut sections = vec![];
    for use_default in config.streams.use_default_flags() {
        for &kernel in &config.kernels {
            for &precision in &config.precisions {
                sections.push(run_section(
                    device,
                    kernel,
                    precision,
                    use_default,
                    config,
                    &mut rng,
                ));
            }
        }
    }
    let report = SuiteReport {
        device: device.name(),
        seed,
        sections,
    };
    info!(seed, device = %report.device, "suite finished: {}", report.summary());
    report
}
