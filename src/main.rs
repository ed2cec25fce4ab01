use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use tracing_subscriber::{fmt, EnvFilter};

use verdict::policy::defaults::default_rules;
use verdict::policy::loader::{load_overrides, validate_overrides};
use verdict::policy::overrides::Overrides;
use verdict::policy::sample::{render_sample, SampleFormat};
use verdict::policy::web::{router, PolicyState};
use verdict::policy::{Enforcer, PolicyError, RequestContext, ScopeType};
use verdict::settings::Settings;

#[derive(Parser, Debug)]
#[command(
    name = "verdict",
    version,
    about = "Check-string authorization policy engine"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the policy API (default)
    Serve,
    /// Decide a single request and print the decision as JSON
    Check {
        /// Operation name, e.g. identity:get_credential
        operation: String,
        #[arg(long)]
        user_id: String,
        #[arg(long, default_value = "project")]
        scope: ScopeType,
        #[arg(long = "role")]
        roles: Vec<String>,
        #[arg(long)]
        project_id: Option<String>,
        #[arg(long)]
        domain_id: Option<String>,
        /// Target attribute as path=value, e.g. credential.user_id=u1
        #[arg(long = "target", value_parser = parse_target)]
        targets: Vec<(String, String)>,
    },
    /// Print a sample override file or JSON reference of every default rule
    Sample {
        #[arg(long, value_enum, default_value = "kdl")]
        format: SampleFormat,
    },
    /// Validate an override file against the registered rules
    Validate { file: PathBuf },
}

fn parse_target(s: &str) -> Result<(String, String), String> {
    let (path, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected path=value, got `{s}`"))?;
    let path = path.strip_prefix("target.").unwrap_or(path);
    if path.is_empty() {
        return Err(format!("empty target path in `{s}`"));
    }
    Ok((path.to_string(), value.to_string()))
}

/// Keep each problem's code and help when it is rendered.
fn diagnostics(problems: Vec<PolicyError>) -> Vec<miette::Report> {
    problems.into_iter().map(miette::Report::new).collect()
}

fn build_enforcer(settings: &Settings) -> Result<Enforcer> {
    let overrides = match &settings.policy.overrides_file {
        Some(path) => load_overrides(path)?,
        None => Overrides::new(),
    };
    let enforcer = Enforcer::from_definitions(
        &default_rules(),
        &overrides,
        settings.policy.enforcer_options(),
    )?;
    Ok(enforcer)
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    let settings = Settings::load(&cli.config)?;
    tracing::debug!(?settings, "Loaded configuration");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(settings).await,
        Command::Check {
            operation,
            user_id,
            scope,
            roles,
            project_id,
            domain_id,
            targets,
        } => {
            let enforcer = build_enforcer(&settings)?;
            let mut ctx = RequestContext::new(user_id, scope);
            ctx.roles.extend(roles);
            ctx.project_id = project_id;
            ctx.domain_id = domain_id;
            ctx.target.extend(targets);

            let decision = enforcer.enforce(&operation, &ctx)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&decision).into_diagnostic()?
            );
            Ok(())
        }
        Command::Sample { format } => {
            let enforcer = build_enforcer(&settings)?;
            let sample = render_sample(&enforcer.list_rules(), format).into_diagnostic()?;
            print!("{sample}");
            Ok(())
        }
        Command::Validate { file } => {
            let overrides = load_overrides(&file)?;
            let problems = validate_overrides(&default_rules(), &overrides);
            if problems.is_empty() {
                println!("{}: {} override(s) OK", file.display(), overrides.len());
                return Ok(());
            }
            let count = problems.len();
            for report in diagnostics(problems) {
                eprintln!("{report:?}");
            }
            Err(miette::miette!(
                "{} problem(s) found in {}",
                count,
                file.display()
            ))
        }
    }
}

async fn serve(settings: Settings) -> Result<()> {
    let enforcer = Arc::new(build_enforcer(&settings)?);
    let state = PolicyState {
        enforcer,
        overrides_file: settings.policy.overrides_file.clone(),
    };

    let options = state.enforcer.options();
    let addr = settings.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .into_diagnostic()?;
    tracing::info!(
        %addr,
        enforce_scope = options.enforce_scope,
        enforce_new_defaults_only = options.enforce_new_defaults_only,
        "Policy API listening"
    );
    axum::serve(listener, router(state)).await.into_diagnostic()?;
    Ok(())
}
