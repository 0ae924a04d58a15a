// fleetcast CLI - parallel fleet command runner

use std::io::{self, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use clap::Parser;
use colored::*;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use fleetcast::executor::{
    ConnectionMethod, LocalExecutor, NcExecutor, PingProber, Pipeline, PipelineConfig,
    PlinkExecutor, ProbeConfig, RemoteExecutor,
};
use fleetcast::inventory::{Credentials, HostDefaults, HostPool};
use fleetcast::output::{FleetError, OutputFormat, OutputWriter};
use fleetcast::precheck;

#[derive(Parser)]
#[command(
    name = "fleetcast",
    about = "Probe a fleet of hosts and run a command file on every host that answers",
    version,
    disable_colored_help = true,
    term_width = 0,
)]
struct Cli {
    /// Remote password (insecure - prefer --ask-pass)
    #[arg(short, long)]
    password: Option<String>,

    /// Prompt for the remote password
    #[arg(short = 'k', long)]
    ask_pass: bool,

    /// Number of concurrent liveness probes
    #[arg(long, default_value = "10")]
    probe_workers: usize,

    /// Number of concurrent command executions
    #[arg(long, default_value = "10")]
    exec_workers: usize,

    /// File with one host address per line
    #[arg(short = 'i', long, default_value = "ip_list.txt")]
    hosts_file: PathBuf,

    /// Command file, or a directory whose files are concatenated
    #[arg(short, long, default_value = "commands")]
    command: PathBuf,

    /// Connection method (plink, nc or local)
    #[arg(short, long, default_value = "plink")]
    method: String,

    /// Listener port on the targets when using nc
    #[arg(long, default_value = "4444")]
    nc_port: u16,

    /// Only probe hosts, do not run commands
    #[arg(long)]
    probe_only: bool,

    /// Per-host command timeout in seconds (0 = no limit)
    #[arg(short, long, default_value = "30")]
    timeout: u64,

    /// Probe retries per host before it counts as offline
    #[arg(long, default_value = "3")]
    max_retries: u32,

    /// Directory for reports and the latest/previous pointers
    #[arg(long, default_value = "reports")]
    reports_dir: PathBuf,

    /// Output format (text or json)
    #[arg(long, default_value = "text")]
    output_format: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode - only show errors
    #[arg(short, long)]
    quiet: bool,

    /// Skip the root privilege check
    #[arg(long)]
    allow_unprivileged: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Err(e) = run(cli).await {
        eprintln!("{}", e);
        // startup failures leave no report behind; later ones may leave a partial one
        std::process::exit(if e.is_startup_fatal() { 1 } else { 2 });
    }
}

/// Log to stderr so records do not collide with the progress bar.
/// `RUST_LOG` takes precedence over the verbosity flags.
fn init_tracing(verbose: bool, quiet: bool) {
    let default_level = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "warn"
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), FleetError> {
    let output_format = OutputFormat::from_str(&cli.output_format).unwrap_or_else(|_| {
        eprintln!("Invalid output format: {}. Using 'text'.", cli.output_format);
        OutputFormat::Text
    });

    let method = ConnectionMethod::from_str(&cli.method).map_err(|message| FleetError::Config {
        message,
        suggestion: Some("Use --method plink, --method nc or --method local".to_string()),
    })?;

    // Startup checks, in order; nothing is written before all of them pass
    precheck::ensure_privileged(cli.allow_unprivileged)?;

    let pool = HostPool::load(&cli.hosts_file, &HostDefaults::default())?;
    let ping = precheck::require_binary("ping")?;

    let executor = if cli.probe_only {
        None
    } else {
        Some(build_executor(method, cli.nc_port)?)
    };

    let probe = ProbeConfig {
        max_retries: cli.max_retries,
        ..ProbeConfig::default()
    };

    let config = PipelineConfig {
        probe_workers: cli.probe_workers,
        exec_workers: cli.exec_workers,
        probe,
        probe_only: cli.probe_only,
        reports_dir: cli.reports_dir.clone(),
        ..PipelineConfig::default()
    };

    let mut defaults = HostDefaults {
        timeout: cli.timeout,
        ping_wait: probe.base_wait,
        ..HostDefaults::default()
    };

    for advisory in config.validate(&defaults)? {
        warn!("{}", advisory);
    }

    if !cli.probe_only {
        defaults.command_file = Some(precheck::assemble_command_file(
            &cli.command,
            &cli.reports_dir,
        )?);

        let password = if cli.ask_pass {
            Some(prompt_password("Password: ")?)
        } else {
            cli.password
        };
        defaults.credentials = password.map(Credentials::new);
    }

    let mut pool = pool.with_defaults(&defaults);

    if pool.is_empty() {
        warn!(path = %cli.hosts_file.display(), "address source lists no hosts");
    }

    if method == ConnectionMethod::Local && !cli.probe_only {
        for host in pool.hosts() {
            if !LocalExecutor::is_local_address(host.hostname()) {
                warn!(host = %host.address, "local method runs commands on this machine, not on the host");
            }
        }
    }

    let mode = if cli.probe_only {
        "probe-only".to_string()
    } else {
        format!("command via {}", method)
    };

    let output = OutputWriter::new(output_format, cli.verbose, cli.quiet);
    output.print_run_header(&mode, pool.len());

    let mut pipeline = Pipeline::new(config, Arc::new(PingProber::new(ping)));
    if let Some(executor) = executor {
        pipeline = pipeline.with_executor(executor);
    }

    let progress = output.create_progress(pool.len());
    let result = pipeline.run(&mut pool, &progress).await;
    progress.finish_and_clear();

    let summary = result?;
    output.print_summary(&summary, &pool);

    Ok(())
}

/// Resolve the transport binary and build the executor for `method`
fn build_executor(
    method: ConnectionMethod,
    nc_port: u16,
) -> Result<Arc<dyn RemoteExecutor>, FleetError> {
    let binary = precheck::require_binary(method.binary())?;

    let executor: Arc<dyn RemoteExecutor> = match method {
        ConnectionMethod::Plink => Arc::new(PlinkExecutor::new(binary)),
        ConnectionMethod::Nc => Arc::new(NcExecutor::new(binary, nc_port)),
        ConnectionMethod::Local => Arc::new(LocalExecutor::new().with_shell(binary.to_string_lossy())),
    };

    Ok(executor)
}

fn prompt_password(prompt: &str) -> Result<String, FleetError> {
    // Print prompt to stderr so it appears even with redirected stdout
    eprint!("{}", prompt.cyan());
    io::stderr().flush().ok();

    // Read password with echo disabled
    let password = rpassword::read_password().map_err(|e| FleetError::Config {
        message: format!("Failed to read password: {}", e),
        suggestion: Some("Try using --password instead of --ask-pass".to_string()),
    })?;

    let password = password.trim().to_string();

    // Print newline after password entry (since echo was disabled)
    eprintln!();

    if password.is_empty() {
        return Err(FleetError::Config {
            message: "Empty password entered".to_string(),
            suggestion: Some("Enter a password, or omit --ask-pass for key-based auth".to_string()),
        });
    }

    Ok(password)
}
