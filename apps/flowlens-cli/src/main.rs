mod ui;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use flowlens_diagram::{DiagramBuilder, DiagramRenderer, MermaidRenderer, TextRenderer};
use flowlens_network::{HttpFederationGateway, HttpProjectionGateway};
use flowlens_ops::{ensure_report_dir, init_tracing, write_report, DashboardStore};
use flowlens_orchestrator::{CreateReport, Orchestrator};
use flowlens_types::{
    config::FlowlensConfig, metrics::MetricsSnapshot, person::NewPerson, Architecture,
};
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::ui::{UiCommand, UiMessage};

type HttpOrchestrator = Orchestrator<HttpFederationGateway, HttpProjectionGateway>;

#[derive(Parser)]
#[command(
    name = "flowlens",
    version,
    about = "Measure and diagram GraphQL federation vs. event-driven projection latency"
)]
struct Cli {
    /// TOML configuration file.
    #[arg(long, env = "FLOWLENS_CONFIG")]
    config: Option<PathBuf>,
    /// Write the final dashboard state as a JSON report.
    #[arg(long, global = true)]
    report: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Read one person through one or both architectures.
    Query {
        /// Defaults to the configured person.
        person: Option<String>,
        #[arg(long, short)]
        architecture: Option<Architecture>,
    },
    /// Create a person and measure write and propagation time.
    Create {
        name: String,
        email: String,
        #[arg(long, short)]
        architecture: Option<Architecture>,
    },
    /// Probe both architectures.
    Health,
    /// List persons known to the projection.
    Persons,
    /// Run one operation and print the resulting timing diagram.
    Diagram {
        architecture: Architecture,
        #[arg(long)]
        person: Option<String>,
        /// Create this person first and draw the write flow.
        #[arg(long)]
        create: Option<String>,
        #[arg(long, value_enum, default_value_t = DiagramFormat::Mermaid)]
        format: DiagramFormat,
        /// Show ratio-based estimates while no stage timing is reported.
        #[arg(long)]
        estimate: bool,
    },
    /// Interactive terminal dashboard (default).
    Dashboard,
}

#[derive(Clone, Copy, ValueEnum)]
enum DiagramFormat {
    Mermaid,
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.clone());
    let command = cli.command.unwrap_or(Command::Dashboard);
    if matches!(command, Command::Dashboard) && config.ops.log_file.is_none() {
        config.ops.log_file = Some("flowlens.log".into());
    }
    init_tracing(&config.ops)?;

    let store = DashboardStore::new(&config.dashboard);
    let orchestrator = Arc::new(
        Orchestrator::connect(&config, store.clone()).context("failed to set up gateways")?,
    );

    match command {
        Command::Query {
            person,
            architecture,
        } => {
            let id = person.unwrap_or_else(|| config.dashboard.default_person.clone());
            match architecture {
                Some(architecture) => print_metrics(&orchestrator.query(architecture, &id).await),
                None => {
                    let (federated, projected) = orchestrator.query_both(&id).await;
                    print_metrics(&federated);
                    print_metrics(&projected);
                    let comparison = store.snapshot().await.comparison();
                    if let Some(diff) = comparison.latency_diff_percent {
                        println!("federation vs projection: {diff:+}%");
                    }
                }
            }
        }
        Command::Create {
            name,
            email,
            architecture,
        } => {
            let person = NewPerson::new(name, email);
            match architecture {
                Some(architecture) => print_create(&orchestrator.create(architecture, &person).await),
                None => {
                    let (federated, projected) = orchestrator.create_both(&person).await;
                    print_create(&federated);
                    print_create(&projected);
                    if let Some(comparison) = store.snapshot().await.write_comparison() {
                        println!("federation write: {}", comparison.describe());
                    }
                }
            }
        }
        Command::Health => {
            let health = orchestrator.refresh_health().await;
            println!("{}: {}", Architecture::SyncFederated.title(), up_down(health.federated));
            println!("{}: {}", Architecture::AsyncProjected.title(), up_down(health.projected));
        }
        Command::Persons => {
            for person in orchestrator.refresh_persons().await? {
                println!("{}\t{}", person.id, person.name);
            }
        }
        Command::Diagram {
            architecture,
            person,
            create,
            format,
            estimate,
        } => {
            if let Some(name) = create {
                let email = format!("{}@example.com", name.to_lowercase().replace(' ', "."));
                orchestrator
                    .create(architecture, &NewPerson::new(name, email))
                    .await;
            } else {
                let id = person.unwrap_or_else(|| config.dashboard.default_person.clone());
                orchestrator.query(architecture, &id).await;
            }
            let builder = if estimate {
                DiagramBuilder::with_estimation(config.estimation.clone())
            } else {
                DiagramBuilder::from_config(&config.estimation)
            };
            let state = store.snapshot().await;
            let side = state.architecture(architecture);
            let mut spec = builder.build(
                architecture,
                &side.metrics.stage_timing,
                side.mutation.as_ref(),
            );
            if spec.subject.is_none() {
                spec.subject = side.metrics.last_entity.clone();
            }
            match format {
                DiagramFormat::Mermaid => print!("{}", MermaidRenderer.render(&spec)),
                DiagramFormat::Text => print!("{}", TextRenderer.render(&spec)),
                DiagramFormat::Json => println!("{}", serde_json::to_string_pretty(&spec)?),
            }
        }
        Command::Dashboard => run_dashboard(orchestrator.clone(), &config).await?,
    }

    if cli.report {
        let dir = ensure_report_dir(&config.ops.report_dir)?;
        let path = write_report(&dir, &store.snapshot().await)?;
        println!("report written to {}", path.display());
    }
    Ok(())
}

async fn run_dashboard(orchestrator: Arc<HttpOrchestrator>, config: &FlowlensConfig) -> Result<()> {
    let store = orchestrator.store().clone();
    let (ui_tx, ui_rx) = std::sync::mpsc::channel();
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();

    // Initial load, then every store change is forwarded as a full state.
    {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            if let Err(err) = orchestrator.refresh_persons().await {
                warn!("initial person refresh failed: {err}");
            }
            orchestrator.refresh_health().await;
        });
    }
    let forwarder = {
        let store = store.clone();
        let ui_tx = ui_tx.clone();
        tokio::spawn(async move {
            let _ = ui_tx.send(UiMessage::State(Box::new(store.snapshot().await)));
            let mut events = store.subscribe();
            while events.next().await.is_some() {
                if ui_tx
                    .send(UiMessage::State(Box::new(store.snapshot().await)))
                    .is_err()
                {
                    break;
                }
            }
        })
    };

    let builder = DiagramBuilder::from_config(&config.estimation);
    let ui_handle = tokio::task::spawn_blocking(move || ui::run(ui_rx, cmd_tx, builder));

    while let Some(command) = cmd_rx.recv().await {
        let orchestrator = orchestrator.clone();
        match command {
            UiCommand::QueryBoth => {
                tokio::spawn(async move {
                    let id = orchestrator.store().selected_person().await;
                    orchestrator.query_both(&id).await;
                });
            }
            UiCommand::CreateDemo => {
                tokio::spawn(async move {
                    let stamp = Utc::now().format("%H%M%S");
                    let person = NewPerson::new(
                        format!("Demo Person {stamp}"),
                        format!("demo.{stamp}@example.com"),
                    );
                    orchestrator.create_both(&person).await;
                });
            }
            UiCommand::Health => {
                tokio::spawn(async move {
                    orchestrator.refresh_health().await;
                });
            }
            UiCommand::SelectNext => {
                let store = orchestrator.store();
                let persons = store.persons().await;
                if !persons.is_empty() {
                    let current = store.selected_person().await;
                    let next = persons
                        .iter()
                        .position(|p| p.id == current)
                        .map(|i| (i + 1) % persons.len())
                        .unwrap_or(0);
                    store.select_person(persons[next].id.clone()).await;
                    let _ = ui_tx.send(UiMessage::State(Box::new(store.snapshot().await)));
                }
            }
            UiCommand::Quit => break,
        }
    }

    let _ = ui_tx.send(UiMessage::Shutdown);
    drop(ui_tx);
    forwarder.abort();
    ui_handle.await??;
    info!("dashboard closed");
    Ok(())
}

fn load_config(path: Option<PathBuf>) -> FlowlensConfig {
    let path = path.unwrap_or_else(|| PathBuf::from("configs/dev.toml"));
    match FlowlensConfig::from_file(&path) {
        Ok(cfg) => {
            if let Err(err) = cfg.validate() {
                eprintln!(
                    "Invalid config in '{}': {err}. Falling back to internal defaults.",
                    path.display()
                );
                FlowlensConfig::default()
            } else {
                cfg
            }
        }
        Err(err) => {
            eprintln!(
                "Failed to load config from '{}': {err}. Falling back to internal defaults.",
                path.display()
            );
            FlowlensConfig::default()
        }
    }
}

fn up_down(up: bool) -> &'static str {
    if up {
        "up"
    } else {
        "down"
    }
}

fn ms(value: Option<u64>) -> String {
    value.map(|v| format!("{v}ms")).unwrap_or_else(|| "-".into())
}

fn print_metrics(metrics: &MetricsSnapshot) {
    println!(
        "{}: latency {} (queries {}, errors {}, freshness {})",
        metrics.architecture.title(),
        ms(metrics.latency_ms),
        metrics.query_count,
        metrics.error_count,
        metrics.freshness_label()
    );
}

fn print_create(report: &CreateReport) {
    let timing = &report.timing;
    println!(
        "{}: {:?} mutation {} propagation {} total {} ({})",
        report.architecture.title(),
        report.outcome,
        ms(timing.mutation_ms),
        ms(timing.propagation_ms),
        ms(timing.total_ms),
        timing.propagation.describe()
    );
}
