//! The three phase contract every kernel test follows, and the report its
//! check produces.

use std::{fmt, marker::PhantomData};

use tracing::{debug, warn};

use crate::{error::Result, scalar::BlasFloat};

/// One kernel, one problem instance, used once.
pub trait KernelTester {
    /// Routine under test, e.g. `sgemm`.
    fn name(&self) -> String;

    /// Fill operands on the host, enqueue their upload and synchronize.
    fn init(&mut self) -> Result<()>;

    /// Call the routine, enqueue the download of its results and synchronize.
    fn do_operation(&mut self) -> Result<()>;

    /// Compare every result element against its expected value.
    fn check(&self, tolerance: f64) -> CheckReport;
}

/// Relative error of `computed` against `expected`, or the absolute error when
/// `expected` is exactly zero.
pub fn relative_error<T: BlasFloat>(expected: T, computed: T) -> f64 {
    relative_error_f64(expected.as_f64(), computed.as_f64())
}

pub fn relative_error_f64(expected: f64, computed: f64) -> f64 {
    let delta = computed - expected;
    if expected != 0.0 {
        (delta / expected).abs()
    } else {
        delta.abs()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Scalar,
    Index(usize),
    Element(usize, usize),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Scalar => write!(f, "result"),
            Location::Index(i) => write!(f, "{i}"),
            Location::Element(r, c) => write!(f, "({r}, {c})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mismatch {
    Value {
        at: Location,
        expected: f64,
        actual: f64,
        error: f64,
    },
    /// The result had the wrong shape, every expected element counts as a mismatch.
    Shape {
        expected: (usize, usize),
        actual: (usize, usize),
    },
}

impl Mismatch {
    pub fn count(&self) -> usize {
        match self {
            Mismatch::Value { .. } => 1,
            Mismatch::Shape { expected, .. } => expected.0 * expected.1,
        }
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mismatch::Value {
                at,
                expected,
                actual,
                error,
            } => write!(
                f,
                "mismatch at {at}: expected {expected}, got {actual}, rerr: {error}"
            ),
            Mismatch::Shape { expected, actual } => write!(
                f,
                "shape mismatch: expected {}x{}, got {}x{}",
                expected.0, expected.1, actual.0, actual.1
            ),
        }
    }
}

/// What a check found. No mismatches and no skip reason is a pass.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckReport {
    pub kernel: String,
    pub checked: usize,
    pub mismatches: Vec<Mismatch>,
    pub skipped: Option<String>,
    /// Max-norm of `A·X - B` for linear solves.
    pub residual_norm: Option<f64>,
}

impl CheckReport {
    pub fn new(kernel: impl Into<String>) -> Self {
        Self {
            kernel: kernel.into(),
            checked: 0,
            mismatches: vec![],
            skipped: None,
            residual_norm: None,
        }
    }

    pub fn skipped(kernel: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            skipped: Some(reason.into()),
            ..Self::new(kernel)
        }
    }

    /// Compare one element. NaN never passes.
    pub fn compare(&mut self, at: Location, expected: f64, actual: f64, tolerance: f64) {
        self.checked += 1;
        let error = relative_error_f64(expected, actual);
        if error.is_nan() || error > tolerance {
            self.push(Mismatch::Value {
                at,
                expected,
                actual,
                error,
            });
        }
    }

    /// Exact comparison for integer results such as 1-based indices.
    pub fn compare_exact(&mut self, at: Location, expected: i64, actual: i64) {
        self.checked += 1;
        if expected != actual {
            self.push(Mismatch::Value {
                at,
                expected: expected as f64,
                actual: actual as f64,
                error: (actual - expected).unsigned_abs() as f64,
            });
        }
    }

    pub fn push(&mut self, mismatch: Mismatch) {
        warn!(kernel = %self.kernel, "{mismatch}");
        self.mismatches.push(mismatch);
    }

    pub fn mismatch_count(&self) -> usize {
        self.mismatches.iter().map(Mismatch::count).sum()
    }

    pub fn is_skipped(&self) -> bool {
        self.skipped.is_some()
    }

    pub fn passed(&self) -> bool {
        self.skipped.is_none() && self.mismatches.is_empty()
    }
}

impl fmt::Display for CheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(reason) = &self.skipped {
            return write!(f, "{}: skipped ({reason})", self.kernel);
        }
        write!(
            f,
            "{}: {} checked, {} mismatches",
            self.kernel,
            self.checked,
            self.mismatch_count()
        )?;
        if let Some(norm) = self.residual_norm {
            write!(f, ", residual {norm:.3e}")?;
        }
        Ok(())
    }
}

pub struct Constructed;
pub struct Initialized;
pub struct Executed;

/// Drives a tester through `init`, `do_operation` and `check` in that order
/// only, one state per type.
pub struct Lifecycle<K, S> {
    tester: K,
    _state: PhantomData<S>,
}

impl<K, S> Lifecycle<K, S> {
    pub fn tester(&self) -> &K {
        &self.tester
    }

    fn advance<N>(self) -> Lifecycle<K, N> {
        Lifecycle {
            tester: self.tester,
            _state: PhantomData,
        }
    }
}

impl<K: KernelTester> Lifecycle<K, Constructed> {
    pub fn new(tester: K) -> Self {
        Self {
            tester,
            _state: PhantomData,
        }
    }

    pub fn init(mut self) -> Result<Lifecycle<K, Initialized>> {
        debug!(kernel = %self.tester.name(), "init");
        self.tester.init()?;
        Ok(self.advance())
    }
}

impl<K: KernelTester> Lifecycle<K, Initialized> {
    pub fn execute(mut self) -> Result<Lifecycle<K, Executed>> {
        debug!(kernel = %self.tester.name(), "do operation");
        self.tester.do_operation()?;
        Ok(self.advance())
    }
}

impl<K: KernelTester> Lifecycle<K, Executed> {
    pub fn check(self, tolerance: f64) -> CheckReport {
        self.tester.check(tolerance)
    }
}

/// Run a tester through its whole lifecycle.
pub fn run<K: KernelTester>(tester: K, tolerance: f64) -> Result<CheckReport> {
    Ok(Lifecycle::new(tester).init()?.execute()?.check(tolerance))
}
