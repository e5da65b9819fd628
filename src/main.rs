use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use matmul_offload::benchmark::run_configured;
use matmul_offload::error::EXIT_CONFIG;
use matmul_offload::{BackendKind, Config, MatmulError, Result};
use tracing_subscriber::EnvFilter;

/// Times A = B × C with a naive host loop and with a single device kernel.
#[derive(Debug, Parser)]
#[command(name = "matmul-offload", version, about)]
struct Cli {
    /// Matrix dimension N (matrices are N×N)
    #[arg(short = 'n', long)]
    dimension: Option<usize>,

    /// Work-group size used for the kernel launch
    #[arg(long)]
    work_group_size: Option<u32>,

    /// Seed for the random input matrices
    #[arg(long)]
    seed: Option<u64>,

    /// Path to the WGSL kernel source
    #[arg(long = "kernel", value_name = "PATH")]
    kernel_path: Option<PathBuf>,

    /// Kernel entry point
    #[arg(long)]
    entry_point: Option<String>,

    /// Device backend
    #[arg(long, value_enum)]
    backend: Option<BackendKind>,

    /// TOML file with default settings; flags take precedence
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log debug events to stderr
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if let Some(dimension) = self.dimension {
            config.dimension = dimension;
        }
        if let Some(size) = self.work_group_size {
            config.work_group_size = size;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(path) = self.kernel_path {
            config.kernel_path = path;
        }
        if let Some(entry_point) = self.entry_point {
            config.entry_point = entry_point;
        }
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Writes the diagnostic for a fatal error, once, and returns its exit code.
fn report_failure<W: Write>(err: &MatmulError, code: u8, stderr: &mut W) -> ExitCode {
    let _ = writeln!(stderr, "{err}");
    ExitCode::from(code)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match cli.into_config() {
        Ok(config) => config,
        Err(err) => return report_failure(&err, EXIT_CONFIG, &mut io::stderr()),
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match run_configured(&config, &mut out) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => report_failure(&err, err.exit_code(), &mut io::stderr()),
    }
}
