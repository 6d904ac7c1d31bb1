//! CTS harness CLI
//!
//! Entry point for the `cts-harness` command-line tool.

use clap::{Parser, Subcommand};
use cts_harness::case::registry::requirements_of;
use cts_harness::case::build_suite;
use cts_harness::config::{default_host_config_path, EffectiveConfig, SuiteConfig};
use cts_harness::platform::DeviceFile;
use cts_harness::runner::report_status;
use cts_harness::summary::SuiteSummary;
use cts_harness::{
    CancelToken, ExitCode, RunnerConfig, SignalHandler, SimPlatform, TestEnv, TestRunner,
};
use cts_report::{DirectoryCollector, ReportSink};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use tracing::{info, warn};

const SUMMARY_FILE: &str = "suite_summary.json";
const STATE_FILE: &str = "suite_state.json";
const PENDING_FILE: &str = "pending_reports.json";
const EFFECTIVE_CONFIG_FILE: &str = "effective_config.json";

#[derive(Parser)]
#[command(name = "cts-harness")]
#[command(about = "Device capability compliance test harness", version)]
struct Cli {
    /// Debug logging (overridden by RUST_LOG)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a suite against a simulated device
    Run {
        /// Suite file
        #[arg(long, short = 's')]
        suite: PathBuf,

        /// Device file (profile plus scripted responses)
        #[arg(long, short = 'd')]
        device: PathBuf,

        #[command(flatten)]
        overrides: Overrides,

        /// Output directory
        #[arg(long, short = 'o', default_value = "cts-out")]
        out: PathBuf,

        /// Print the suite summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Retry delivery of reports left by a failed flush
    Flush {
        /// Output directory of the earlier run
        #[arg(long, short = 'o', default_value = "cts-out")]
        out: PathBuf,

        /// Collector directory under the output directory (defaults to the run's report.dir)
        #[arg(long)]
        report_dir: Option<String>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List the tests a suite would run
    List {
        #[arg(long, short = 's')]
        suite: PathBuf,

        /// Device file; adds a runnable column
        #[arg(long, short = 'd')]
        device: Option<PathBuf>,

        #[command(flatten)]
        overrides: Overrides,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config {
        #[arg(long, short = 's')]
        suite: Option<PathBuf>,

        #[command(flatten)]
        overrides: Overrides,
    },
}

/// Flags that form the CLI config layer
#[derive(clap::Args)]
struct Overrides {
    /// Host config (default: ~/.config/cts-harness/config.toml)
    #[arg(long)]
    host_config: Option<PathBuf>,

    /// ABI to report metrics under
    #[arg(long)]
    abi: Option<String>,

    /// Per-test timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Only run tests matching these globs
    #[arg(long)]
    include: Vec<String>,

    /// Skip tests matching these globs
    #[arg(long)]
    exclude: Vec<String>,
}

impl Overrides {
    fn host_config_path(&self) -> Option<PathBuf> {
        self.host_config.clone().or_else(default_host_config_path)
    }

    fn to_value(&self) -> Option<serde_json::Value> {
        let mut suite = serde_json::Map::new();
        if let Some(abi) = &self.abi {
            suite.insert("abi".to_string(), abi.clone().into());
        }
        if let Some(timeout_ms) = self.timeout_ms {
            suite.insert("timeout_ms".to_string(), timeout_ms.into());
        }
        if !self.include.is_empty() {
            suite.insert("include".to_string(), self.include.clone().into());
        }
        if !self.exclude.is_empty() {
            suite.insert("exclude".to_string(), self.exclude.clone().into());
        }
        if suite.is_empty() {
            None
        } else {
            Some(serde_json::json!({ "suite": suite }))
        }
    }

    fn load(&self, suite: Option<&Path>) -> EffectiveConfig {
        let host = self.host_config_path();
        match EffectiveConfig::build(host.as_deref(), suite, self.to_value()) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Configuration error: {}", e);
                process::exit(ExitCode::Config.as_i32());
            }
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            suite,
            device,
            overrides,
            out,
            json,
        } => run_suite(&suite, &device, &overrides, &out, json),
        Commands::Flush {
            out,
            report_dir,
            json,
        } => run_flush(&out, report_dir.as_deref(), json),
        Commands::List {
            suite,
            device,
            overrides,
            json,
        } => run_list(&suite, device.as_deref(), &overrides, json),
        Commands::Config { suite, overrides } => run_config(suite.as_deref(), &overrides),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_device(path: &Path) -> DeviceFile {
    match DeviceFile::load(path) {
        Ok(device) => device,
        Err(e) => {
            eprintln!("Error loading device file: {}", e);
            process::exit(ExitCode::Config.as_i32());
        }
    }
}

fn suite_config(effective: &EffectiveConfig) -> SuiteConfig {
    match effective.suite_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(ExitCode::Config.as_i32());
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            process::exit(1);
        }
    }
}

fn run_suite(suite_path: &Path, device_path: &Path, overrides: &Overrides, out: &Path, json: bool) {
    let effective = overrides.load(Some(suite_path));
    let config = suite_config(&effective);
    let device = load_device(device_path);

    let entries = match config.selected_tests() {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(ExitCode::Config.as_i32());
        }
    };
    let cases = match build_suite(&entries) {
        Ok(cases) => cases,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(ExitCode::Config.as_i32());
        }
    };

    if let Err(e) = fs::create_dir_all(out) {
        eprintln!("Error creating {}: {}", out.display(), e);
        process::exit(ExitCode::Config.as_i32());
    }

    let cancel = CancelToken::new();
    if let Err(e) = SignalHandler::new(cancel.clone()).install() {
        warn!(error = %e, "could not install signal handler");
    }

    let abi = config
        .suite
        .abi
        .clone()
        .unwrap_or_else(|| device.device.abi.clone());
    let runner_config = RunnerConfig::new(config.suite.name.clone(), abi, config.timeouts());
    let runner = TestRunner::new(runner_config, cases)
        .with_cancel_token(cancel)
        .with_state_file(out.join(STATE_FILE));

    let env = TestEnv::new(device.device.clone(), Box::new(SimPlatform::from_device_file(&device)));
    let mut collector = DirectoryCollector::new(out.join(&config.report.dir));
    let mut run = runner.run(&env, &mut collector);
    run.summary.report.dir = Some(config.report.dir.clone());

    let effective = effective.with_suite_id(run.summary.suite_id.clone());
    if let Err(e) = effective.write_to_file(&out.join(EFFECTIVE_CONFIG_FILE)) {
        warn!(error = %e, "could not write effective config");
    }

    let pending = out.join(PENDING_FILE);
    if run.sink.unsent_count() > 0 {
        match run.sink.save(&pending) {
            Ok(()) => info!(path = %pending.display(), pending = run.sink.unsent_count(), "unsent reports saved"),
            Err(e) => warn!(error = %e, "could not save unsent reports"),
        }
    } else if pending.exists() {
        let _ = fs::remove_file(&pending);
    }

    if let Err(e) = run.summary.write_to_file(&out.join(SUMMARY_FILE)) {
        warn!(error = %e, "could not write suite summary");
    }

    if json {
        print_json(&run.summary);
    } else {
        print_results(&run.summary);
    }

    process::exit(run.exit_code().as_i32());
}

fn print_results(summary: &SuiteSummary) {
    for result in &summary.results {
        let detail = result.detail.as_deref().unwrap_or("");
        println!("{:<8} {:<48} {}", result.status.as_str(), result.id.to_string(), detail);
    }
    println!();
    println!("{}", summary.human_summary);
}

fn run_flush(out: &Path, report_dir: Option<&str>, json: bool) {
    let pending = out.join(PENDING_FILE);
    if !pending.exists() {
        println!("No pending reports in {}", out.display());
        process::exit(0);
    }

    let mut sink = match ReportSink::load(&pending) {
        Ok(sink) => sink,
        Err(e) => {
            eprintln!("Error loading {}: {}", pending.display(), e);
            process::exit(ExitCode::Config.as_i32());
        }
    };

    let summary_path = out.join(SUMMARY_FILE);
    let summary = SuiteSummary::from_file(&summary_path).ok();
    let previous = summary
        .as_ref()
        .map(|s| s.report.clone())
        .unwrap_or_default();
    let report_dir = previous.report_dir(report_dir);

    let mut collector = DirectoryCollector::new(out.join(&report_dir));
    let result = sink.flush(&mut collector);
    let mut status = report_status(&previous, &sink, &result);
    status.dir = Some(report_dir);

    if let Some(mut summary) = summary {
        summary.set_report(status.clone());
        if let Err(e) = summary.write_to_file(&summary_path) {
            warn!(error = %e, "could not update suite summary");
        }
    }

    if json {
        print_json(&status);
    }

    match result {
        Ok(receipt) => {
            let _ = fs::remove_file(&pending);
            if !json {
                println!(
                    "Flushed {} report log(s){}",
                    receipt.sent,
                    receipt
                        .location
                        .map(|l| format!(" to {}", l))
                        .unwrap_or_default()
                );
            }
            process::exit(0);
        }
        Err(e) => {
            if let Err(save_err) = sink.save(&pending) {
                warn!(error = %save_err, "could not re-save unsent reports");
            }
            if !json {
                eprintln!("Flush failed: {}", e);
            }
            process::exit(ExitCode::Transport.as_i32());
        }
    }
}

fn run_list(suite_path: &Path, device_path: Option<&Path>, overrides: &Overrides, json: bool) {
    let effective = overrides.load(Some(suite_path));
    let config = suite_config(&effective);
    let device = device_path.map(load_device);

    let entries = match config.selected_tests() {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(ExitCode::Config.as_i32());
        }
    };

    let mut rows = Vec::with_capacity(entries.len());
    for entry in &entries {
        let requires = match requirements_of(entry) {
            Ok(requires) => requires,
            Err(e) => {
                eprintln!("Configuration error: {}", e);
                process::exit(ExitCode::Config.as_i32());
            }
        };
        let missing = device
            .as_ref()
            .map(|d| d.device.missing(&requires))
            .unwrap_or_default();
        rows.push(serde_json::json!({
            "id": entry.id.to_string(),
            "kind": entry.kind.as_str(),
            "requires": requires,
            "runnable": device.as_ref().map(|_| missing.is_empty()),
            "missing": missing,
        }));
    }

    if json {
        print_json(&rows);
        return;
    }

    if rows.is_empty() {
        println!("No tests selected.");
        return;
    }
    for row in &rows {
        let runnable = match row["runnable"].as_bool() {
            Some(true) => "yes",
            Some(false) => "no",
            None => "-",
        };
        println!(
            "{:<48} {:<28} runnable: {:<3} requires: {}",
            row["id"].as_str().unwrap_or(""),
            row["kind"].as_str().unwrap_or(""),
            runnable,
            row["requires"]
                .as_array()
                .map(|a| a.iter().filter_map(|v| v.as_str()).collect::<Vec<_>>().join(", "))
                .unwrap_or_default()
        );
    }
}

fn run_config(suite_path: Option<&Path>, overrides: &Overrides) {
    let effective = overrides.load(suite_path);
    match effective.to_json() {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            process::exit(1);
        }
    }
}
