//! memgrid - Memory Integrity Grid command line
//!
//! Operator commands for honeyfact tripwires, incidents, quarantine and
//! configuration, plus `serve` for the HTTP API.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use memgrid::{
    api,
    config::GridConfig,
    containment::{ContainmentResult, QuarantineRequest, TargetType},
    grid::{MemoryIntegrityGrid, DEFAULT_TENANT},
    tripwire::{DetectionSource, Incident, IncidentStatus, TripwireResult},
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "memgrid")]
#[command(author = "A3S Lab Team")]
#[command(version)]
#[command(about = "Memory Integrity Grid - honeyfact tripwires and containment for agent memory")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "MEMGRID_CONFIG")]
    config: Option<PathBuf>,

    /// Tenant to act on
    #[arg(short, long, env = "MEMGRID_TENANT", default_value = DEFAULT_TENANT)]
    tenant: String,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show grid status
    Status,

    /// Plant honeyfacts
    Seed {
        /// Number of honeyfacts (defaults to the configured count)
        #[arg(long)]
        count: Option<usize>,
    },

    /// Expire active honeyfacts and plant replacements
    Rotate,

    /// List incidents, newest first
    ListIncidents {
        /// Only incidents in this status
        #[arg(long)]
        status: Option<IncidentStatus>,
    },

    /// Show one incident
    ShowIncident {
        /// Incident id
        id: String,
    },

    /// Quarantine a memory or an agent
    Quarantine {
        /// Memory id, or agent id with --agent
        target: String,

        /// Target is an agent
        #[arg(long)]
        agent: bool,

        /// Act immediately regardless of policy
        #[arg(long)]
        force: bool,

        /// Reason recorded in the audit trail
        #[arg(long, default_value = "manual quarantine")]
        reason: String,

        /// Operator performing the action
        #[arg(long)]
        user: Option<String>,
    },

    /// Release a quarantined memory or agent
    Release {
        /// Memory id, or agent id with --agent
        target: String,

        /// Target is an agent
        #[arg(long)]
        agent: bool,

        /// Reason recorded in the audit trail
        #[arg(long, default_value = "manual release")]
        reason: String,

        /// Operator performing the action
        #[arg(long)]
        user: Option<String>,
    },

    /// Print the effective configuration
    GetConfig,

    /// Change one setting and save it to the configuration file
    SetConfig {
        /// Setting key, e.g. containment.policy
        key: String,

        /// New value
        value: String,
    },

    /// Dry-run text through the tripwire; nothing is recorded
    TestInput {
        /// Text to scan
        content: String,

        /// Where the text is treated as coming from
        #[arg(long, default_value = "output")]
        source: DetectionSource,
    },

    /// Remove every honeyfact of the tenant
    ClearHoneyfacts,

    /// Serve the HTTP API
    Serve {
        /// Host to bind to (defaults to api.host)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (defaults to api.port)
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so --json output stays machine readable
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("memgrid={},tower_http=debug", log_level).into());
    let (json_layer, text_layer) = if cli.log_json {
        (Some(fmt::layer().json().with_writer(std::io::stderr)), None)
    } else {
        (None, Some(fmt::layer().with_writer(std::io::stderr)))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(GridConfig::default_path);
    let config = if config_path.exists() {
        GridConfig::load(&config_path)
            .with_context(|| format!("loading {}", config_path.display()))?
    } else {
        tracing::debug!(path = %config_path.display(), "No configuration file, using defaults");
        GridConfig::default()
    };

    let grid = MemoryIntegrityGrid::new(config.clone())?;
    let tenant = cli.tenant.as_str();
    let json = cli.json;

    let ok = match cli.command {
        Commands::Status => {
            let status = grid.status(tenant).await?;
            emit(json, &status, || {
                println!("Memory Integrity Grid ({})", status.tenant);
                println!("  tripwire:    {}", on_off(status.enabled));
                println!(
                    "  fuzzy:       {} (threshold {})",
                    on_off(status.fuzzy_enabled),
                    status.fuzzy_threshold
                );
                println!(
                    "  policy:      {} (integrity {}{})",
                    status.containment.policy,
                    status.policy_version,
                    if status.strict_mode { ", strict" } else { "" }
                );
                println!(
                    "  honeyfacts:  {} active / {} total",
                    status.honeyfacts_active, status.honeyfacts_total
                );
                println!(
                    "  incidents:   {} total, {} open",
                    status.incidents.total, status.incidents.open
                );
                println!(
                    "  quarantine:  {} memories, {} agents, {} pending approvals",
                    status.containment.active_memory_quarantines,
                    status.containment.active_agent_quarantines,
                    status.containment.pending_approvals
                );
            })?;
            true
        }
        Commands::Seed { count } => {
            let result = grid.seed(tenant, count).await?;
            emit(json, &result, || {
                println!("{}", result.message);
                for template in &result.seeded {
                    println!("  {} [{}] {}", template.id, template.category, template.content);
                }
            })?;
            result.success
        }
        Commands::Rotate => {
            let summary = grid.rotate(tenant).await?;
            emit(json, &summary, || {
                println!(
                    "Expired {} honeyfacts, planted {}",
                    summary.expired,
                    summary.seeded.len()
                );
            })?;
            true
        }
        Commands::ListIncidents { status } => {
            let incidents = grid.list_incidents(tenant, status).await?;
            emit(json, &incidents, || {
                if incidents.is_empty() {
                    println!("No incidents");
                }
                for incident in &incidents {
                    print_incident_line(incident);
                }
            })?;
            true
        }
        Commands::ShowIncident { id } => {
            let result = grid.show_incident(tenant, &id).await?;
            emit(json, &result, || match &result.incident {
                Some(incident) => print_incident(incident),
                None => println!("{}", result.message),
            })?;
            result.success
        }
        Commands::Quarantine {
            target,
            agent,
            force,
            reason,
            user,
        } => {
            let mut request = QuarantineRequest::new(target, reason).with_force(force);
            if let Some(user) = user {
                request = request.with_initiator(user);
            }
            let result = grid.quarantine(tenant, target_type(agent), request).await?;
            emit(json, &result, || print_containment(&result))?;
            result.success
        }
        Commands::Release {
            target,
            agent,
            reason,
            user,
        } => {
            let result = grid
                .release(tenant, target_type(agent), &target, user.as_deref(), &reason)
                .await?;
            emit(json, &result, || print_containment(&result))?;
            result.success
        }
        Commands::GetConfig => {
            let config = grid.get_config().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                print!("{}", config.to_toml()?);
            }
            true
        }
        Commands::SetConfig { key, value } => {
            let change = grid.set_config(&key, &value).await?;
            if change.success {
                grid.get_config()
                    .await
                    .save(&config_path)
                    .with_context(|| format!("saving {}", config_path.display()))?;
            }
            emit(json, &change, || println!("{}", change.message))?;
            change.success
        }
        Commands::TestInput { content, source } => {
            let result = grid.test_input(tenant, &content, source).await?;
            emit(json, &result, || print_tripwire(&result))?;
            true
        }
        Commands::ClearHoneyfacts => {
            let result = grid.clear_honeyfacts(tenant).await?;
            emit(json, &result, || println!("{}", result.message))?;
            result.success
        }
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.api.host.clone());
            let port = port.unwrap_or(config.api.port);
            serve(Arc::new(grid), &host, port, &config.api.cors_origins).await?;
            true
        }
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

async fn serve(grid: Arc<MemoryIntegrityGrid>, host: &str, port: u16, cors: &[String]) -> Result<()> {
    let app = api::build_app(grid, cors);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;

    tracing::info!("Memory Integrity Grid API listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down...");
        })
        .await?;
    Ok(())
}

fn target_type(agent: bool) -> TargetType {
    if agent {
        TargetType::Agent
    } else {
        TargetType::Memory
    }
}

/// Print `value` as JSON, or run the human-readable printer.
fn emit<T: Serialize>(json: bool, value: &T, human: impl FnOnce()) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        human();
    }
    Ok(())
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "enabled"
    } else {
        "disabled"
    }
}

fn print_incident_line(incident: &Incident) {
    println!(
        "{}  {:<8}  {:<14}  {} event(s)  {}",
        incident.id,
        incident.severity.to_string(),
        incident.status.to_string(),
        incident.events.len(),
        incident.created_at.format("%Y-%m-%d %H:%M:%S")
    );
}

fn print_incident(incident: &Incident) {
    println!("Incident {}", incident.id);
    println!("  severity:  {}", incident.severity);
    println!("  status:    {}", incident.status);
    println!("  created:   {}", incident.created_at);
    if let Some(notes) = &incident.resolution_notes {
        println!("  notes:     {}", notes);
    }
    if let Some(by) = &incident.resolved_by {
        println!("  by:        {}", by);
    }
    for event in &incident.events {
        println!(
            "  - {} via {} (confidence {:.2}): {}",
            event.honeyfact_id, event.source, event.confidence, event.snippet
        );
    }
}

fn print_tripwire(result: &TripwireResult) {
    match &result.incident {
        Some(incident) => {
            println!("Tripwire triggered ({} severity)", incident.severity);
            print_incident(incident);
        }
        None => println!("No honeyfacts detected"),
    }
}

fn print_containment(result: &ContainmentResult) {
    println!("{}", result.message);
    if let Some(approval) = &result.approval_id {
        println!("  approval: {}", approval);
    }
}
