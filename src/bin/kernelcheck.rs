//! Command line driver: one GEMM instance, or the whole parameterized suite.

use std::{path::PathBuf, process::ExitCode, sync::Arc};

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use kernelcheck::prelude::*;
use tracing::error;

#[derive(Parser)]
#[command(name = "kernelcheck")]
#[command(about = "Correctness checks for accelerated BLAS and LAPACK routines")]
#[command(version)]
struct Cli {
    /// Accelerator to run on
    #[arg(long, value_enum, default_value_t = Backend::Sim, global = true)]
    backend: Backend,

    /// Device ordinal for the cuda backend
    #[arg(long, default_value_t = 0, global = true)]
    ordinal: usize,

    /// Log level (trace, debug, info, warn, error), overridden by RUST_LOG
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Host-side simulated accelerator
    Sim,
    /// CUDA driver with cuBLAS and cuSOLVER, needs the `cuda` feature
    Cuda,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one GEMM instance and check it
    Gemm {
        #[arg(long)]
        m: usize,
        #[arg(long)]
        n: usize,
        #[arg(long)]
        k: usize,
        #[arg(long, allow_negative_numbers = true)]
        alpha: f64,
        #[arg(long, allow_negative_numbers = true)]
        beta: f64,
        #[arg(long)]
        trans_a: bool,
        #[arg(long)]
        trans_b: bool,
        #[arg(long, default_value = "single")]
        precision: Precision,
        /// Dump A, B and C as read back from the device before and after
        #[arg(short, long)]
        verbose: bool,
        /// Relative error tolerance
        #[arg(long, default_value_t = 1e-4)]
        rel_error: f64,
    },
    /// Run the parameterized sections
    Suite {
        /// TOML configuration file
        #[arg(short, long, value_name = "PATH")]
        config: Option<PathBuf>,
        #[arg(long)]
        rel_error: Option<f64>,
        #[arg(long)]
        seed: Option<u64>,
        /// Only these kernels, may be repeated
        #[arg(long = "kernel", value_name = "KERNEL")]
        kernels: Vec<KernelKind>,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{} error{}: {}", .0.category(), code_suffix(.0), .0)]
    Device(#[from] Error),
    #[error("this build has no {0} backend")]
    Unsupported(&'static str),
}

fn code_suffix(e: &Error) -> String {
    e.code().map(|c| format!(" (code {c})")).unwrap_or_default()
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    kernelcheck::logging::init(&cli.log_level);

    let outcome = match cli.backend {
        Backend::Sim => dispatch(SimDevice::new(), cli.command),
        Backend::Cuda => dispatch_cuda(cli.ordinal, cli.command),
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e}");
            eprintln!("{} {e}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

#[cfg(feature = "cuda")]
fn dispatch_cuda(ordinal: usize, command: Commands) -> Result<bool, CliError> {
    let device = kernelcheck::device::cuda::CudaDevice::new(ordinal)?;
    dispatch(device, command)
}

#[cfg(not(feature = "cuda"))]
fn dispatch_cuda(_ordinal: usize, _command: Commands) -> Result<bool, CliError> {
    Err(CliError::Unsupported("cuda"))
}

fn dispatch<D>(device: Arc<D>, command: Commands) -> Result<bool, CliError>
where
    D: Device,
    D::Blas: BlasRoutines<D, f32> + BlasRoutines<D, f64>,
    D::Solver: SolverRoutines<D, f32> + SolverRoutines<D, f64>,
{
    match command {
        Commands::Gemm {
            m,
            n,
            k,
            alpha,
            beta,
            trans_a,
            trans_b,
            precision,
            verbose,
            rel_error,
        } => {
            let params = GemmParams {
                transa: trans_a.into(),
                transb: trans_b.into(),
                m,
                n,
                k,
                alpha,
                beta,
            };
            let report = match precision {
                Precision::Single => gemm_once::<f32, D>(&device, &params, verbose, rel_error)?,
                Precision::Double => gemm_once::<f64, D>(&device, &params, verbose, rel_error)?,
            };
            let status = if report.passed() {
                "PASSED".green().bold()
            } else {
                "FAILED".red().bold()
            };
            println!("{status} {params}: {report}");
            for mismatch in &report.mismatches {
                println!("  {mismatch}");
            }
            Ok(report.passed())
        }
        Commands::Suite {
            config,
            rel_error,
            seed,
            kernels,
        } => {
            let mut cfg = match config {
                Some(path) => HarnessConfig::load(&path)?,
                None => HarnessConfig::from_env()?,
            };
            if let Some(tol) = rel_error {
                cfg.rel_error_threshold = tol;
            }
            if seed.is_some() {
                cfg.seed = seed;
            }
            if !kernels.is_empty() {
                cfg.kernels = kernels;
            }
            cfg.validate()?;
            let report = run_suite(&device, &cfg);
            print_suite(&report);
            Ok(report.passed())
        }
    }
}

fn gemm_once<T, D>(
    device: &Arc<D>,
    params: &GemmParams,
    verbose: bool,
    tolerance: f64,
) -> Result<CheckReport, Error>
where
    T: BlasFloat,
    D: Device,
    D::Blas: BlasRoutines<D, T>,
{
    let stream = Stream::new(device, true)?;
    let tester = GemmTester::<T, D>::new(&stream, params)?;
    let initialized = Lifecycle::new(tester).init()?;
    if verbose {
        stream.synchronize()?;
        dump("before", initialized.tester())?;
    }
    let executed = initialized.execute()?;
    if verbose {
        stream.synchronize()?;
        dump("after", executed.tester())?;
    }
    Ok(executed.check(tolerance))
}

fn dump<T: BlasFloat, D: Device>(when: &str, tester: &GemmTester<'_, T, D>) -> Result<(), Error> {
    println!("{}", format!("-- {when} --").bold());
    println!("A: {}", tester.a().describe()?);
    println!("B: {}", tester.b().describe()?);
    println!("C: {}", tester.c().describe()?);
    Ok(())
}

fn print_suite(report: &SuiteReport) {
    println!(
        "{} on {} (seed {})",
        "kernelcheck".bold(),
        report.device,
        report.seed
    );
    for section in &report.sections {
        let summary = section.summary();
        let tag = if summary.ok() {
            "ok".green()
        } else {
            "FAIL".red().bold()
        };
        println!(
            "[{tag}] {} ({} stream): {summary}",
            section.name,
            section.stream_label()
        );
        for inst in &section.instances {
            if !inst.outcome.is_failure() {
                continue;
            }
            println!("    {}: {}", inst.params, inst.outcome);
            if let Some(r) = inst.outcome.report() {
                for mismatch in r.mismatches.iter().take(5) {
                    println!("      {mismatch}");
                }
            }
        }
    }
    let summary = report.summary();
    let line = format!("{summary}");
    if summary.ok() {
        println!("{}", line.green());
    } else {
        println!("{}", line.red());
    }
}
