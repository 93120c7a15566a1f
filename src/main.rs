//! Converge CLI entrypoint.
//!
//! This is the main entrypoint for the converge command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use convergence_harness::assertions::S3BucketProbe;
use convergence_harness::cli::{
    Cli, Commands, OutputFormatter, load_var_file, parse_var_assignments,
};
use convergence_harness::config::{
    ConfigParser, ConfigValidator, EngineSettings, ModuleOptions, RetrySettings, SuiteConfig,
    SuiteMeta, VarMap, find_config_file,
};
use convergence_harness::engine::{ProvisioningEngine, RetryPolicy, TerraformCli};
use convergence_harness::error::{ConvergeError, Result};
use convergence_harness::runner::{RunOptions, SuiteRunner};
use convergence_harness::state::{LocalReportStore, ReportStore, StateNamespace};
use convergence_harness::verifier::ConvergenceVerifier;

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Namespace group for one-off `plan` runs.
const ADHOC_SUITE: &str = "adhoc";

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<ExitCode> {
    let formatter = OutputFormatter::new(cli.output);
    let config_path = cli.config.as_ref();

    match cli.command {
        Commands::Init { path, force } => cmd_init(&path, force).map(|()| ExitCode::SUCCESS),
        Commands::Validate { warnings } => cmd_validate(config_path, warnings, &formatter),
        Commands::Run {
            short,
            filter,
            parallelism,
            keep_work_dir,
        } => {
            let options = RunOptions {
                short,
                filter,
                parallelism,
                keep_work_dir,
            };
            cmd_run(config_path, options, &formatter).await
        }
        Commands::Verify {
            module,
            state_dir,
            vars,
            var_file,
        } => {
            cmd_verify(
                config_path,
                &module,
                state_dir,
                &vars,
                var_file.as_deref(),
                &formatter,
            )
            .await
        }
        Commands::Plan { module, vars } => cmd_plan(config_path, &module, &vars, &formatter).await,
        Commands::Report => cmd_report(config_path, &formatter).await,
    }
}

/// Write a starter suite file.
fn cmd_init(path: &Path, force: bool) -> Result<()> {
    info!("Initializing convergence suite in: {}", path.display());

    let config_path = path.join("converge.yaml");
    let env_path = path.join(".env.example");
    let gitignore_path = path.join(".gitignore");

    if !force && config_path.exists() {
        eprintln!("Suite file already exists: {}", config_path.display());
        eprintln!("Use --force to overwrite.");
        return Ok(());
    }

    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }

    std::fs::write(&config_path, include_str!("../templates/converge.yaml"))?;
    eprintln!("Created: {}", config_path.display());

    std::fs::write(&env_path, include_str!("../templates/env.example"))?;
    eprintln!("Created: {}", env_path.display());

    if gitignore_path.exists() {
        let existing = std::fs::read_to_string(&gitignore_path)?;
        if !existing.contains(".converge") {
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(&gitignore_path)?;
            writeln!(file, "\n# Convergence harness")?;
            writeln!(file, ".converge/")?;
            eprintln!("Updated: {}", gitignore_path.display());
        }
    } else {
        std::fs::write(&gitignore_path, ".env\n.converge/\n")?;
        eprintln!("Created: {}", gitignore_path.display());
    }

    eprintln!("\nSuite initialized successfully!");
    eprintln!("Next steps:");
    eprintln!("  1. Point the cases in converge.yaml at your modules");
    eprintln!("  2. Run 'converge validate' to check the suite");
    eprintln!("  3. Run 'converge run --short' for the non-mutating cases");
    eprintln!("  4. Run 'converge run' to apply, verify and destroy every case");

    Ok(())
}

/// Validate the suite file.
fn cmd_validate(
    config_path: Option<&PathBuf>,
    show_warnings: bool,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let (config, _) = load_suite(config_path)?;

    let result = ConfigValidator::new().collect(&config);
    emit(&formatter.format_validation(&config, &result, show_warnings))?;

    Ok(if result.is_valid() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Run the suite.
async fn cmd_run(
    config_path: Option<&PathBuf>,
    options: RunOptions,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let (config, _) = load_suite(config_path)?;
    let validation = ConfigValidator::new().validate(&config)?;
    for warning in &validation.warnings {
        warn!("{warning}");
    }

    let store = LocalReportStore::with_base_dir(&config.engine.work_dir);
    let engine = engine_for(&config.engine, &config.retry);
    let probe = Arc::new(S3BucketProbe::new());

    let report = SuiteRunner::new(config, engine, probe)
        .with_run_options(options)
        .run()
        .await?;

    if let Err(e) = store.save(&report).await {
        warn!("Failed to save report: {e}");
    }

    emit(&formatter.format_report(&report))?;

    Ok(if report.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Verify an already-applied module converges.
async fn cmd_verify(
    config_path: Option<&PathBuf>,
    module: &Path,
    state_dir: PathBuf,
    raw_vars: &[String],
    var_file: Option<&Path>,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let (engine_settings, retry_settings) = load_settings(config_path)?;

    let mut vars = match var_file {
        Some(path) => load_var_file(path)?,
        None => VarMap::new(),
    };
    vars.extend(parse_var_assignments(raw_vars)?);

    let options = ModuleOptions::builder(module)
        .vars(vars)
        .namespace(StateNamespace::new(state_dir))
        .no_color(engine_settings.no_color)
        .build()?;

    let retry = RetryPolicy::from_settings(&retry_settings);
    let engine = engine_for(&engine_settings, &retry_settings);
    retry.run("init", || engine.init(&options)).await?;

    let verdict = ConvergenceVerifier::new(engine, retry)
        .verify_convergence(&options)
        .await?;
    emit(&formatter.format_verdict(&verdict))?;

    Ok(if verdict.is_converged() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Initialize and plan a module in a scratch namespace.
async fn cmd_plan(
    config_path: Option<&PathBuf>,
    module: &Path,
    raw_vars: &[String],
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let (engine_settings, retry_settings) = load_settings(config_path)?;

    let module_name = module
        .file_name()
        .map_or_else(|| String::from("module"), |n| n.to_string_lossy().into_owned());
    let namespace = StateNamespace::for_case(&engine_settings.work_dir, ADHOC_SUITE, &module_name);

    let options = ModuleOptions::builder(module)
        .vars(parse_var_assignments(raw_vars)?)
        .namespace(namespace)
        .no_color(engine_settings.no_color)
        .build()?;

    let retry = RetryPolicy::from_settings(&retry_settings);
    let engine = engine_for(&engine_settings, &retry_settings);

    let planned = async {
        retry.run("init", || engine.init(&options)).await?;
        retry.run("plan", || engine.plan(&options)).await
    }
    .await;

    if !engine_settings.keep_work_dir {
        if let Err(e) = options.namespace().remove().await {
            warn!("Failed to remove namespace {}: {e}", options.namespace().id());
        }
    }

    emit(&formatter.format_plan(&planned?))?;
    Ok(ExitCode::SUCCESS)
}

/// Show the last suite report.
async fn cmd_report(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<ExitCode> {
    let (engine_settings, _) = load_settings(config_path)?;
    let store = LocalReportStore::with_base_dir(&engine_settings.work_dir);
    debug!("Report backend: {}", store.backend_type());

    match store.load().await? {
        Some(report) => {
            emit(&formatter.format_report(&report))?;
            Ok(if report.success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        None => {
            emit(&formatter.format_message(
                "warning",
                &format!("No report found at {}", store.report_path().display()),
            ))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Resolves the suite file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

/// Loads the suite with `.env` and environment overrides applied.
fn load_suite(config_path: Option<&PathBuf>) -> Result<(SuiteConfig, PathBuf)> {
    let config_file = resolve_config_path(config_path)?;
    debug!("Loading suite from: {}", config_file.display());

    let parser = ConfigParser::new().with_base_path(
        config_file
            .parent()
            .unwrap_or_else(|| Path::new(".")),
    );
    parser.load_dotenv()?;

    let config = parser.load_with_env(&config_file)?;
    Ok((config, config_file))
}

/// Engine and retry settings for single-module commands.
///
/// Uses the suite file when one is given or found, defaults otherwise.
fn load_settings(config_path: Option<&PathBuf>) -> Result<(EngineSettings, RetrySettings)> {
    match load_suite(config_path) {
        Ok((config, _)) => Ok((config.engine, config.retry)),
        Err(ConvergeError::Config(e)) if config_path.is_none() => {
            debug!("No usable suite file ({e}), using default engine settings");
            let mut config = SuiteConfig {
                suite: SuiteMeta {
                    name: String::from(ADHOC_SUITE),
                },
                engine: EngineSettings::default(),
                retry: RetrySettings::default(),
                parallelism: 1,
                cases: Vec::new(),
            };
            ConfigParser::apply_overrides(&mut config, |name| std::env::var(name).ok())?;
            Ok((config.engine, config.retry))
        }
        Err(e) => Err(e),
    }
}

/// Builds the CLI engine with the suite's transient-error patterns.
fn engine_for(settings: &EngineSettings, retry: &RetrySettings) -> Arc<dyn ProvisioningEngine> {
    Arc::new(TerraformCli::new(settings).with_retry_policy(RetryPolicy::from_settings(retry)))
}

/// Writes command output to stdout.
fn emit(text: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{text}")?;
    Ok(())
}
