//! hoist - single-VM provisioning and application bootstrap on Google Cloud.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use dialoguer::{theme::ColorfulTheme, Confirm};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use hoist_cloud::gcp::Gcp;
use hoist_cloud::CloudProvider;
use hoist_provision::config::{AppConfig, ConfigFile, DeployConfig};
use hoist_provision::firewall::ports;
use hoist_provision::host::{Bootstrapper, HealthChecker, SystemRunner, Updater};
use hoist_provision::plan::{apply, plan, plan_destroy, Action};
use hoist_provision::scripts::ScriptRenderer;
use hoist_provision::{Blueprint, Provisioner, Teardown};

mod gcloud;
mod ui;

/// Provision a VM with its network perimeter and bootstrap a compose application onto it.
#[derive(Parser)]
#[command(name = "hoist", version)]
#[command(about = "Provision a single GCP VM and bootstrap a docker compose application")]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// TOML file with default settings; environment variables take precedence.
    #[arg(short, long, global = true, env = "HOIST_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create every missing resource, skipping those that exist.
    Setup,

    /// Delete the VM, static IP, firewall rules, service account and DNS record.
    Cleanup {
        /// Do not ask for confirmation.
        #[arg(short, long)]
        yes: bool,
    },

    /// Show what `apply` would change.
    Plan {
        /// Plan the removal of every existing resource instead.
        #[arg(long)]
        destroy: bool,
    },

    /// Reconcile live resources with the configuration.
    Apply,

    /// Show which resources exist and how to reach the VM.
    Status,

    /// Print the VM startup script.
    RenderStartupScript {
        /// Write to a file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Install docker, sync the source, write the env file and start containers (run on the VM).
    Bootstrap,

    /// Restart containers that are not running (run on the VM).
    Health,

    /// Pull the latest source and recreate containers (run on the VM).
    Update,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("info,hoist=debug,hoist_provision=debug,hoist_cloud=debug")
        } else {
            EnvFilter::new("warn,hoist_provision=info,hoist_cloud=info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let file = load_config_file(cli.config.as_deref())?;

    match cli.command {
        Commands::Setup => setup(&deploy_config(file)?).await,
        Commands::Cleanup { yes } => cleanup(&deploy_config(file)?, yes).await,
        Commands::Plan { destroy } => show_plan(&deploy_config(file)?, destroy).await,
        Commands::Apply => apply_changes(&deploy_config(file)?).await,
        Commands::Status => status(&deploy_config(file)?).await,
        Commands::RenderStartupScript { output } => {
            render_startup_script(&deploy_config(file)?, output.as_deref())
        }
        Commands::Bootstrap => bootstrap(app_config(&file)?),
        Commands::Health => health(app_config(&file)?),
        Commands::Update => update(app_config(&file)?),
    }
}

fn load_config_file(path: Option<&Path>) -> Result<ConfigFile> {
    match path {
        Some(path) => Ok(ConfigFile::load(path)?),
        None => Ok(ConfigFile::default()),
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn deploy_config(mut file: ConfigFile) -> Result<DeployConfig> {
    if env_var("PROJECT_ID").is_none() && file.project_id.is_none() {
        file.project_id = gcloud::default_project();
        if let Some(project) = &file.project_id {
            debug!(project = %project, "Using gcloud default project");
        }
    }
    Ok(DeployConfig::resolve(&file, &env_var)?)
}

fn app_config(file: &ConfigFile) -> Result<AppConfig> {
    Ok(AppConfig::resolve(file, &env_var)?)
}

fn provider(config: &DeployConfig) -> Result<Arc<dyn CloudProvider>> {
    let token = match env_var("GCP_ACCESS_TOKEN").filter(|t| !t.is_empty()) {
        Some(token) => token,
        None => gcloud::access_token().context("No GCP_ACCESS_TOKEN set and gcloud fallback failed")?,
    };
    let gcp = Gcp::new(&config.project_id, token, &config.zone)
        .context("Failed to create GCP client")?;
    Ok(Arc::new(gcp))
}

/// Blueprint with the startup script when a repository is configured.
fn blueprint(config: &DeployConfig) -> Result<Blueprint> {
    let script = if config.app.repo_url.is_some() {
        Some(ScriptRenderer::new()?.startup_script(config)?)
    } else {
        ui::print_warning("REPO_URL is not set; the startup script is not managed");
        None
    };
    Ok(Blueprint::from_config(config, script))
}

fn print_target(config: &DeployConfig) {
    ui::print_field("Project", &config.project_id);
    ui::print_field("Zone", &config.zone);
    ui::print_field("Instance", &config.instance_name);
    ui::print_field("Machine type", &config.machine_type);
    println!();
}

fn print_access(config: &DeployConfig, external_ip: Option<&str>) {
    let Some(ip) = external_ip else {
        ui::print_warning("External IP not known yet");
        return;
    };
    let host = config.dns.as_ref().map_or(ip, |dns| dns.domain.as_str());

    ui::print_field("External IP", ip);
    ui::print_field("Frontend", &format!("http://{host}:{}", ports::FRONTEND));
    ui::print_field("Backend", &format!("http://{host}:{}", ports::BACKEND));
    ui::print_field(
        "SSH",
        &format!(
            "gcloud compute ssh {} --zone {} --project {}",
            config.instance_name, config.zone, config.project_id
        ),
    );
    ui::print_field(
        "Boot log",
        &format!("sudo tail -f /var/log/{}-startup.log", config.app.name),
    );
}

fn warn_if_open(config: &DeployConfig) {
    if config.is_open_to_internet() {
        ui::print_warning(
            "Firewall rules are open to 0.0.0.0/0; set ALLOWED_SOURCE_RANGES before production use",
        );
    }
}

async fn setup(config: &DeployConfig) -> Result<()> {
    ui::print_section("Provisioning");
    print_target(config);
    warn_if_open(config);

    let report = Provisioner::for_config(provider(config)?, config)?
        .run()
        .await?;

    for id in &report.existing {
        ui::print_info(&format!("{id} already exists, skipped"));
    }
    for id in &report.created {
        ui::print_success(&format!("Created {id}"));
    }

    ui::print_section("Access");
    print_access(config, report.external_ip.as_deref());
    println!();
    ui::print_info("The startup script keeps running after setup returns; containers start once it completes.");
    Ok(())
}

async fn cleanup(config: &DeployConfig, yes: bool) -> Result<()> {
    ui::print_section("Cleanup");
    print_target(config);

    let teardown = Teardown::new(provider(config)?, config);
    for id in teardown.targets() {
        ui::print_step(&id.to_string());
    }
    println!();

    if !yes {
        let proceed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt("Delete these resources?")
            .default(false)
            .interact()?;
        if !proceed {
            println!("{}", "Cleanup cancelled.".yellow());
            return Ok(());
        }
    }

    let report = teardown.run().await?;
    for id in &report.absent {
        ui::print_info(&format!("{id} not found, skipped"));
    }
    for id in &report.deleted {
        ui::print_success(&format!("Deleted {id}"));
    }
    ui::print_info("Enabled APIs were left untouched.");
    Ok(())
}

async fn show_plan(config: &DeployConfig, destroy: bool) -> Result<()> {
    let provider = provider(config)?;
    let (title, result) = if destroy {
        let blueprint = Blueprint::from_config(config, None);
        ("Destroy plan", plan_destroy(&blueprint, provider.as_ref()).await?)
    } else {
        ("Plan", plan(&blueprint(config)?, provider.as_ref()).await?)
    };

    ui::print_section(title);
    for change in &result.changes {
        ui::print_change(change);
    }
    println!();
    ui::print_step(&result.summary());
    if result.drift().next().is_some() {
        ui::print_warning("Drifted resources cannot be changed in place; delete and re-apply them to converge");
    }
    Ok(())
}

async fn apply_changes(config: &DeployConfig) -> Result<()> {
    let provider = provider(config)?;
    let blueprint = blueprint(config)?;

    ui::print_section("Apply");
    print_target(config);
    warn_if_open(config);
    let planned = plan(&blueprint, provider.as_ref()).await?;
    for change in planned
        .changes
        .iter()
        .filter(|c| c.action != Action::NoChange)
    {
        ui::print_change(change);
    }

    if planned.is_empty() {
        ui::print_success("No changes. Live resources match the configuration.");
        print_access(config, planned.outputs.external_ip.as_deref());
        return Ok(());
    }

    ui::print_step(&planned.summary());
    let outputs = apply(&planned, &blueprint, provider.as_ref()).await?;
    ui::print_success("Apply complete");
    println!();
    print_access(config, outputs.external_ip.as_deref());
    Ok(())
}

async fn status(config: &DeployConfig) -> Result<()> {
    let provider = provider(config)?;
    let result = plan(&blueprint(config)?, provider.as_ref()).await?;

    ui::print_section("Status");
    print_target(config);
    for change in &result.changes {
        let state = match &change.action {
            Action::Create => "missing".red(),
            Action::NoChange => "ok".green(),
            Action::Update(_) => "out of date".yellow(),
            Action::Drift(_) => "drifted".magenta(),
            Action::Delete => "present".normal(),
        };
        println!("  {:<44} {state}", change.resource.to_string());
    }
    println!();

    if let Some(status) = &result.outputs.instance_status {
        ui::print_field("Instance status", &status.to_string());
    }
    print_access(config, result.outputs.external_ip.as_deref());
    Ok(())
}

fn render_startup_script(config: &DeployConfig, output: Option<&Path>) -> Result<()> {
    let script = ScriptRenderer::new()?.startup_script(config)?;
    match output {
        Some(path) => {
            std::fs::write(path, &script)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            ui::print_success(&format!("Startup script written to {}", path.display()));
        }
        None => print!("{script}"),
    }
    Ok(())
}

fn bootstrap(app: AppConfig) -> Result<()> {
    ui::print_section("Bootstrap");
    let report = Bootstrapper::new(app, Arc::new(SystemRunner)).run()?;

    if report.runtime_installed {
        ui::print_success("Docker installed");
    }
    ui::print_success(&format!("Source {:?}", report.source).to_lowercase());
    ui::print_info(&format!("Environment file {:?}", report.env_file).to_lowercase());
    for path in &report.addons {
        ui::print_success(&format!("Installed {}", path.display()));
    }
    Ok(())
}

fn health(app: AppConfig) -> Result<()> {
    let report = HealthChecker::new(app, Arc::new(SystemRunner)).run()?;
    if report.started_stack {
        ui::print_warning("No containers were running; started the stack");
    } else if report.restarted.is_empty() {
        ui::print_success(&format!("{} containers running", report.services.len()));
    } else {
        ui::print_warning(&format!("Restarted: {}", report.restarted.join(", ")));
    }
    Ok(())
}

fn update(app: AppConfig) -> Result<()> {
    ui::print_section("Update");
    let report = Updater::new(app, Arc::new(SystemRunner)).run()?;
    ui::print_success(&format!("Source {:?}, containers recreated", report.source).to_lowercase());
    Ok(())
}
