//! psmodget - main entry point
//!
//! Thin command dispatcher over the resolution engine: parses flags, builds
//! the request and environment probe, runs the resolver, and renders the
//! aggregate result. Exit code 0 means the module is installed; 1 means the
//! environment failed validation or every strategy failed.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use psmodget::cli::{Cli, Commands};
use psmodget::{
    CancelToken, EnvironmentProbe, InstallRequest, InstallScope, Precondition,
    ProcessPackageSource, ResolutionResult, Resolver, ResolverConfig, TracingSink, default_chain,
};

/// Initialize the tracing subscriber with appropriate settings
fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            // RUST_LOG overrides the info default
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();
}

/// Main application entry point
fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    debug!("psmodget starting up");

    let cli = Cli::parse_args();

    match cli.command {
        Commands::Install {
            module,
            version,
            scope,
            repository,
            destination,
            trust_repository,
            disable_telemetry,
            force,
            config,
            json,
        } => {
            let request = build_request(
                module,
                version,
                scope,
                repository,
                destination,
                trust_repository,
                disable_telemetry,
                force,
                config,
            )?;
            run_install(&request, cli.dry_run, json)?;
        }
        Commands::Probe { json } => {
            run_probe(json)?;
        }
        Commands::Validate { config } => {
            run_validate(&config);
        }
    }

    Ok(())
}

/// Build the effective request from an optional request file plus flags.
///
/// Flags override file values; boolean flags can only turn options on, never
/// off, so a trusted-repository request file stays trusted.
#[allow(clippy::too_many_arguments)]
fn build_request(
    module: Option<String>,
    version: Option<String>,
    scope: Option<String>,
    repository: Option<String>,
    destination: Option<PathBuf>,
    trust_repository: bool,
    disable_telemetry: bool,
    force: bool,
    config: Option<PathBuf>,
) -> anyhow::Result<InstallRequest> {
    let mut request = match config {
        Some(path) => {
            info!("Loading request from: {:?}", path);
            InstallRequest::load_from_file(&path)?
        }
        None => {
            let module = module.clone().ok_or_else(|| {
                anyhow::anyhow!("--module is required when no request file is given")
            })?;
            InstallRequest::new(module)
        }
    };

    if let Some(module) = module {
        request.module = module;
    }
    if let Some(version) = version {
        request.version = Some(version);
    }
    if let Some(scope) = scope {
        request.scope = scope
            .parse::<InstallScope>()
            .map_err(|_| anyhow::anyhow!("Invalid scope {:?} (use currentuser or allusers)", scope))?;
    }
    if let Some(repository) = repository {
        request.repository = repository;
    }
    if let Some(destination) = destination {
        request.destination = Some(destination);
    }
    request.trust_repository |= trust_repository;
    request.disable_telemetry |= disable_telemetry;
    request.force |= force;

    request.validate()?;
    Ok(request)
}

/// Run a full resolution (or, in dry-run mode, just report the plan)
fn run_install(request: &InstallRequest, dry_run: bool, json: bool) -> anyhow::Result<()> {
    let config = ResolverConfig::default();
    let source = Arc::new(ProcessPackageSource::new(&config.pwsh_bin));

    let env = EnvironmentProbe::detect(source.as_ref(), &config);

    // Preflight: a destination we can write to must exist somewhere
    if request.destination.is_none() && !env.has_writable_path() {
        eprintln!("✗ No writable module path found and no --destination given");
        std::process::exit(1);
    }
    if !env.network.is_online() {
        warn!("Gallery appears unreachable; installs are likely to fail");
    }

    let candidates = default_chain(source);

    if dry_run {
        println!("Environment: {}", env);
        let mut would_attempt = None;
        for candidate in &candidates {
            match candidate.precondition(&env) {
                Precondition::Ready => {
                    if would_attempt.is_none() {
                        would_attempt = Some(candidate.name().to_string());
                        println!("  → {:<15} would be attempted first", candidate.name());
                    } else {
                        println!("  • {:<15} ready as fallback", candidate.name());
                    }
                }
                Precondition::Unmet(reason) => {
                    println!("  - {:<15} skipped ({})", candidate.name(), reason);
                }
            }
        }
        if would_attempt.is_none() {
            eprintln!("✗ No strategy is attemptable in this environment");
            std::process::exit(1);
        }
        return Ok(());
    }

    // Wire SIGINT to the cancellation token; resolution stops between
    // attempts, never mid-strategy
    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, finishing the current attempt...");
        handler_token.cancel();
    }) {
        warn!("Failed to install interrupt handler: {}", e);
        // Continue anyway - resolution just becomes non-cancellable
    }

    info!(
        "Resolving install of {} from {}",
        request.module, request.repository
    );
    let sink = TracingSink;
    let resolver = Resolver::with_cancel(&sink, cancel);
    let result = resolver.resolve(candidates, &env, request);

    render_result(&result, json)?;

    if !result.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

/// Render the aggregate result for the terminal (or as JSON for scripting)
fn render_result(result: &ResolutionResult, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    for attempt in &result.attempts {
        let symbol = if attempt.status.is_succeeded() {
            "✓"
        } else if attempt.status.is_failed() {
            "✗"
        } else if attempt.status.is_skipped() {
            "-"
        } else {
            "•"
        };
        println!("  {} {:<15} {}", symbol, attempt.name, attempt.status);
    }

    if result.is_success() {
        println!("\n✓ {}", result);
        if let Some(location) = &result.location {
            println!("  Module directory: {}", location.display());
        }
    } else {
        eprintln!("\n✗ {}", result);
    }
    Ok(())
}

/// Probe the environment and print what was detected
fn run_probe(json: bool) -> anyhow::Result<()> {
    let config = ResolverConfig::default();
    let source = ProcessPackageSource::new(&config.pwsh_bin);
    let env = EnvironmentProbe::detect(&source, &config);

    if json {
        println!("{}", serde_json::to_string_pretty(&env)?);
        return Ok(());
    }

    println!("Package clients:");
    if env.clients.is_empty() {
        println!("  (none detected)");
    }
    for client in &env.clients {
        println!("  ✓ {}", client);
    }
    println!("Module paths:");
    for mp in &env.module_paths {
        let marker = if mp.writable { "rw" } else { "ro" };
        println!("  [{}] {}", marker, mp.path.display());
    }
    println!("Network:   {}", env.network);
    println!("Elevation: {}", env.elevation);
    Ok(())
}

/// Validate a request file, mirroring the behavior of `install --config`
fn run_validate(path: &std::path::Path) {
    info!("Validating request file: {:?}", path);
    match InstallRequest::load_from_file(path) {
        Ok(request) => match request.validate() {
            Ok(()) => {
                println!("✓ Request file is valid: {:?}", path);
            }
            Err(e) => {
                eprintln!("✗ Request validation failed: {}", e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("✗ Failed to load request file: {}", e);
            std::process::exit(1);
        }
    }
}
