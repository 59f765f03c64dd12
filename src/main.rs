// pg-startup-profiler - main.rs
//
// Command-line entry point. Handles:
// 1. CLI argument parsing
// 2. config.toml loading and logging initialisation (debug mode support)
// 3. Rules loading (built-in, operator override, or --rules)
// 4. Running profiling sessions and writing reports to stdout

use pg_startup_profiler::app::rules_mgr::{self, RulesOrigin};
use pg_startup_profiler::app::session::{self, LineClock, SessionOptions, SessionReport};
use pg_startup_profiler::core::compare::compare_profiles;
use pg_startup_profiler::core::export;
use pg_startup_profiler::core::model::TrailingScriptPolicy;
use pg_startup_profiler::core::rules::Rules;
use pg_startup_profiler::platform::config::{self, AppConfig, PlatformPaths, ReportFormat};
use pg_startup_profiler::util::constants;
use pg_startup_profiler::util::error::{Result, SessionError};
use pg_startup_profiler::util::logging;

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// pg-startup-profiler - Measure where PostgreSQL container startup time goes.
///
/// Feeds container log output through an occurrence-aware rule set and
/// reports the startup timeline: total time to readiness, init script
/// durations, extension load offsets, and background worker starts.
#[derive(Parser, Debug)]
#[command(name = "pg-startup-profiler", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging (equivalent to RUST_LOG=debug).
    #[arg(short = 'd', long = "debug", global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Profile one startup log (file, or stdin when omitted or "-").
    Profile(ProfileArgs),

    /// Profile two captures with the same rules and report the difference.
    Compare(CompareArgs),

    /// Validate a rules document and print its normalised form.
    Rules(RulesArgs),
}

#[derive(Args, Debug)]
struct ProfileArgs {
    /// Log file to read; stdin when omitted or "-".
    input: Option<PathBuf>,

    /// Rules document to use instead of the built-in rules.
    #[arg(short = 'r', long = "rules")]
    rules: Option<PathBuf>,

    /// Emit the JSON report (default).
    #[arg(long, conflicts_with = "csv")]
    json: bool,

    /// Emit the event timeline as CSV.
    #[arg(long)]
    csv: bool,

    /// Include every event in the JSON report.
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Seconds to wait for the readiness event.
    #[arg(short = 't', long, value_parser = clap::value_parser!(u64)
        .range(constants::MIN_TIMEOUT_SECS..=constants::MAX_TIMEOUT_SECS))]
    timeout: Option<u64>,

    /// Record a synthetic process start event at the beginning of the timeline.
    #[arg(long)]
    mark_start: bool,

    /// Close the last init script at the readiness boundary instead of dropping it.
    #[arg(long)]
    close_trailing_script: bool,

    /// Exit with an error when no readiness event is observed.
    #[arg(long)]
    require_ready: bool,

    /// Label for the report (defaults to the input file name).
    #[arg(long)]
    image: Option<String>,

    /// Fallback clock for lines without a timestamp.
    /// Defaults to replay for files and wall for stdin.
    #[arg(long, value_enum)]
    clock: Option<ClockArg>,
}

#[derive(Args, Debug)]
struct CompareArgs {
    /// Baseline capture.
    #[arg(long)]
    baseline: PathBuf,

    /// Candidate capture.
    #[arg(long)]
    candidate: PathBuf,

    /// Rules document to use instead of the built-in rules.
    #[arg(short = 'r', long = "rules")]
    rules: Option<PathBuf>,

    /// Close the last init script at the readiness boundary instead of dropping it.
    #[arg(long)]
    close_trailing_script: bool,
}

#[derive(Args, Debug)]
struct RulesArgs {
    /// Rules document to validate; the effective rules when omitted.
    #[arg(short = 'r', long = "rules")]
    rules: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ClockArg {
    Wall,
    Replay,
}

impl From<ClockArg> for LineClock {
    fn from(c: ClockArg) -> Self {
        match c {
            ClockArg::Wall => LineClock::Wall,
            ClockArg::Replay => LineClock::Replay,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let platform_paths = PlatformPaths::resolve();
    let (app_config, config_warnings) = config::load_config(&platform_paths.config_dir);

    logging::init(cli.debug, app_config.log_level.as_deref());

    tracing::info!(
        version = constants::APP_VERSION,
        debug = cli.debug,
        "pg-startup-profiler starting"
    );

    // Warnings raised before the subscriber existed.
    for warning in &config_warnings {
        tracing::warn!("{warning}");
    }

    let cancel = install_interrupt_handler();

    let result = match cli.command {
        Command::Profile(args) => run_profile(args, &app_config, &platform_paths, cancel),
        Command::Compare(args) => run_compare(args, &app_config, &platform_paths, cancel),
        Command::Rules(args) => run_rules(args, &app_config, &platform_paths),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "Command failed");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Cancel flag raised on SIGINT/SIGTERM. The session then finalizes what
/// it has and the report is still written.
fn install_interrupt_handler() -> Arc<AtomicBool> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    if let Err(e) = ctrlc::set_handler(move || {
        tracing::info!("Interrupt received; finishing session");
        flag.store(true, Ordering::SeqCst);
    }) {
        tracing::warn!(error = %e, "Could not install interrupt handler");
    }
    cancel
}

/// Load rules: CLI flag > config `rules_file` > operator override > built-in.
fn load_rules(
    cli_rules: Option<&Path>,
    app_config: &AppConfig,
    paths: &PlatformPaths,
) -> Result<Rules> {
    let explicit = cli_rules.or(app_config.rules_file.as_deref());
    let (rules, origin) = rules_mgr::load_rules(explicit, Some(&paths.user_rules_file))?;
    if origin != RulesOrigin::Builtin {
        tracing::info!(origin = %origin, "Rules loaded");
    }
    Ok(rules)
}

fn trailing_policy(flag: bool, app_config: &AppConfig) -> TrailingScriptPolicy {
    if flag || app_config.close_trailing_script {
        TrailingScriptPolicy::CloseAtReady
    } else {
        TrailingScriptPolicy::Drop
    }
}

fn open_input(path: &Path) -> std::result::Result<BufReader<File>, SessionError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| SessionError::Io {
            path: path.to_path_buf(),
            source: e,
        })
}

fn run_profile(
    args: ProfileArgs,
    app_config: &AppConfig,
    paths: &PlatformPaths,
    cancel: Arc<AtomicBool>,
) -> Result<()> {
    let mut rules = load_rules(args.rules.as_deref(), app_config, paths)?;

    let file_input = args
        .input
        .as_ref()
        .filter(|p| p.as_os_str() != "-");

    let image = args.image.clone().unwrap_or_else(|| match file_input {
        Some(path) => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string()),
        None => "stdin".to_string(),
    });

    let default_clock = if file_input.is_some() {
        LineClock::Replay
    } else {
        LineClock::Wall
    };

    let options = SessionOptions {
        timeout: args
            .timeout
            .map(Duration::from_secs)
            .unwrap_or(app_config.timeout),
        trailing_scripts: trailing_policy(args.close_trailing_script, app_config),
        mark_start: args.mark_start.then(|| image.clone()),
        clock: args.clock.map(LineClock::from).unwrap_or(default_clock),
        cancel: Some(cancel),
    };

    let reader: Box<dyn BufRead + Send> = match file_input {
        Some(path) => Box::new(open_input(path)?),
        None => Box::new(BufReader::new(std::io::stdin())),
    };

    let report = session::run(&mut rules, reader, &options);
    log_summary(&image, &report);

    let report = if args.require_ready {
        report.require_ready()?
    } else {
        report
    };

    let format = if args.csv {
        ReportFormat::Csv
    } else if args.json {
        ReportFormat::Json
    } else {
        app_config.report_format
    };
    let verbose = args.verbose || app_config.verbose;

    let stdout = std::io::stdout();
    let out = stdout.lock();
    match format {
        ReportFormat::Json => export::export_json(&report.profile, &image, verbose, out)?,
        ReportFormat::Csv => {
            export::export_csv(&report.profile, out)?;
        }
    }
    Ok(())
}

fn run_compare(
    args: CompareArgs,
    app_config: &AppConfig,
    paths: &PlatformPaths,
    cancel: Arc<AtomicBool>,
) -> Result<()> {
    let mut rules = load_rules(args.rules.as_deref(), app_config, paths)?;

    let options = SessionOptions {
        timeout: app_config.timeout,
        trailing_scripts: trailing_policy(args.close_trailing_script, app_config),
        clock: LineClock::Replay,
        cancel: Some(cancel),
        ..Default::default()
    };

    let baseline = open_input(&args.baseline)?;
    let candidate = open_input(&args.candidate)?;
    let (base, cand) = session::run_pair(&mut rules, baseline, candidate, &options);

    let baseline_name = args.baseline.display().to_string();
    let candidate_name = args.candidate.display().to_string();
    log_summary(&baseline_name, &base);
    log_summary(&candidate_name, &cand);

    let cmp = compare_profiles(&base.profile, &cand.profile);
    tracing::info!(
        delta_ms = cmp.delta().num_milliseconds(),
        delta_pct = ?cmp.delta_percent(),
        "Comparison complete"
    );

    let stdout = std::io::stdout();
    export::export_comparison_json(&cmp, &baseline_name, &candidate_name, stdout.lock())?;
    Ok(())
}

fn run_rules(args: RulesArgs, app_config: &AppConfig, paths: &PlatformPaths) -> Result<()> {
    let rules = load_rules(args.rules.as_deref(), app_config, paths)?;
    let text = rules.to_toml()?;
    print!("{text}");
    Ok(())
}

fn log_summary(label: &str, report: &SessionReport) {
    tracing::info!(
        input = label,
        outcome = ?report.outcome,
        lines = report.lines_read,
        matched = report.lines_matched,
        events = report.profile.events.len(),
        total_ms = report.profile.total_duration.num_milliseconds(),
        degraded = report.profile.degraded,
        "Session finished"
    );
}
