use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, Log, Metadata, Record};

use cpx_harness::suites::builtin_registry;
use cpx_harness::{CcProfile, HarnessConfig, SuiteContext, TestStatus};

#[derive(Parser)]
#[command(name = "cpx-difftest")]
#[command(about = "Differential tests for C-API probes against the host runtime.", long_about = None)]
struct Cli {
    /// Print the selected tests as JSON and exit.
    #[arg(long)]
    list: bool,

    /// Only run tests whose name contains this substring.
    #[arg(long)]
    filter: Option<String>,

    #[arg(long, default_value_t = 1)]
    jobs: usize,

    #[arg(long, value_enum, default_value_t = CcProfile::Default)]
    cc_profile: CcProfile,

    /// Keep the synthesized C next to each cached artifact.
    #[arg(long)]
    keep_c: bool,

    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Write the JSON suite report here instead of stdout.
    #[arg(long)]
    report_out: Option<PathBuf>,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            eprintln!("[{} {}] {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => std::env::var("CPX_LOG")
            .ok()
            .and_then(|v| LevelFilter::from_str(v.trim()).ok())
            .unwrap_or(LevelFilter::Warn),
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

fn main() -> std::process::ExitCode {
    let handle = std::thread::Builder::new()
        .name("cpx-difftest".to_string())
        .spawn(run);

    match handle {
        Ok(handle) => match handle.join() {
            Ok(code) => code,
            Err(panic) => {
                if let Some(message) = panic.downcast_ref::<&str>() {
                    eprintln!("cpx-difftest panicked: {message}");
                } else if let Some(message) = panic.downcast_ref::<String>() {
                    eprintln!("cpx-difftest panicked: {message}");
                } else {
                    eprintln!("cpx-difftest panicked");
                }
                std::process::ExitCode::from(2)
            }
        },
        Err(err) => {
            eprintln!("failed to spawn cpx-difftest thread: {err}");
            run()
        }
    }
}

fn run() -> std::process::ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            std::process::ExitCode::from(2)
        }
    }
}

fn try_main() -> Result<std::process::ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let registry = builtin_registry().context("register built-in suites")?;
    let filter = cli.filter.as_deref();

    if cli.list {
        println!("{}", serde_json::to_string_pretty(&registry.list(filter))?);
        return Ok(std::process::ExitCode::SUCCESS);
    }

    if registry.select(filter).is_empty() {
        anyhow::bail!("no tests match filter {:?}", filter.unwrap_or_default());
    }

    let mut config = HarnessConfig::from_env()
        .with_profile(cli.cc_profile)
        .with_keep_c(cli.keep_c);
    if let Some(dir) = &cli.cache_dir {
        config = config.with_cache_dir(dir);
    }
    std::fs::create_dir_all(&config.cache_dir)
        .with_context(|| format!("create native cache dir: {}", config.cache_dir.display()))?;

    let ctx = SuiteContext::new(config);
    let report = registry.run_parallel(&ctx, filter, cli.jobs);
    drop(ctx);

    for test in &report.tests {
        let label = match test.status {
            TestStatus::Passed => "PASS",
            TestStatus::Failed => "FAIL",
            TestStatus::ConfigError => "CONFIG",
            TestStatus::BuildError => "BUILD",
            TestStatus::HarnessError => "ERROR",
        };
        eprintln!("{label:<6} {}", test.name);
        for c in test.comparisons.iter().filter(|c| !c.passed) {
            eprintln!(
                "       {}: expected {}, got {}{}",
                c.args,
                c.expected,
                c.actual,
                c.diagnostic
                    .as_deref()
                    .map(|d| format!(" ({d})"))
                    .unwrap_or_default()
            );
        }
        if let Some(diag) = &test.diagnostic {
            eprintln!("       {}", diag.trim_end().replace('\n', "\n       "));
        }
    }
    eprintln!(
        "{} passed, {} failed, {} errors, {} builds",
        report.passed, report.failed, report.errors, report.builds
    );

    let json = serde_json::to_string_pretty(&report)?;
    match &cli.report_out {
        Some(path) => std::fs::write(path, json.as_bytes())
            .with_context(|| format!("write report: {}", path.display()))?,
        None => println!("{json}"),
    }

    Ok(if report.all_passed() {
        std::process::ExitCode::SUCCESS
    } else {
        std::process::ExitCode::from(1)
    })
}
