use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use dataguard_compliance::{
    ComplianceHookChain, ConsentLedger, DashboardAggregator, DpiaAssessor, JsonlAssessmentStore,
    RetentionEngine,
};
use dataguard_core::{DataguardError, DataguardResult};
use dataguard_store::{MemoryStore, Snapshot};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod settings;

use settings::{parse_config, DataguardConfig};

#[derive(Parser)]
#[command(name = "dataguard", about = "Dataguard GDPR compliance engine")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "dataguard.toml")]
    config: PathBuf,

    /// Store snapshot to operate on (overrides `[storage] snapshot`)
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Retention policies and sweeps
    Retention {
        #[command(subcommand)]
        action: RetentionAction,
    },
    /// Data Protection Impact Assessments
    Dpia {
        #[command(subcommand)]
        action: DpiaAction,
    },
    /// Consent ledger reports
    Consent {
        #[command(subcommand)]
        action: ConsentAction,
    },
    /// Print the tenant compliance dashboard
    Dashboard {
        #[arg(long)]
        tenant: String,
    },
}

#[derive(Subcommand)]
enum RetentionAction {
    /// Execute every due policy (all tenants unless --tenant is given)
    Run {
        #[arg(long)]
        tenant: Option<String>,
    },
    /// Create default policies for data types the tenant has none for
    Init {
        #[arg(long)]
        tenant: String,
    },
    /// Data inventory and overdue policies
    Report {
        #[arg(long)]
        tenant: String,
    },
}

#[derive(Subcommand)]
enum DpiaAction {
    /// Assess one processing activity and record it in the history
    Assess {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        activity: Uuid,
        #[arg(long, default_value = "cli")]
        actor: String,
    },
    /// Assess every active processing activity of the tenant
    Report {
        #[arg(long)]
        tenant: String,
    },
    /// Recorded assessments of one activity, oldest first
    History {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        activity: Uuid,
    },
}

#[derive(Subcommand)]
enum ConsentAction {
    /// Grant/withdrawal statistics per purpose over a trailing window
    Report {
        #[arg(long)]
        tenant: String,
        #[arg(long, default_value_t = 30)]
        days: i64,
    },
}

/// Every service wired over one in-memory store.
struct Services {
    store: Arc<MemoryStore>,
    dpia: Arc<DpiaAssessor>,
    consent: Arc<ConsentLedger>,
    retention: Arc<RetentionEngine>,
    dashboard: DashboardAggregator,
}

impl Services {
    fn build(store: MemoryStore, config: &DataguardConfig) -> anyhow::Result<Self> {
        let store = Arc::new(store);
        let history = Arc::new(JsonlAssessmentStore::new(&config.storage.dpia_history));

        let dpia = Arc::new(DpiaAssessor::new(
            store.clone(),
            store.clone(),
            history,
            config.compliance.dpia.clone(),
        ));
        let consent = Arc::new(ConsentLedger::new(
            store.clone(),
            store.clone(),
            Arc::new(ComplianceHookChain::new()),
            config.compliance.consent.clone(),
        ));
        let retention = Arc::new(RetentionEngine::new(
            store.clone(),
            store.clone(),
            store.clone(),
            config.compliance.retention.clone(),
        )?);
        let dashboard = DashboardAggregator::new(
            store.clone(),
            store.clone(),
            store.clone(),
            dpia.clone(),
            consent.clone(),
            retention.clone(),
        );

        Ok(Self {
            store,
            dpia,
            consent,
            retention,
            dashboard,
        })
    }
}

/// Start of a report window reaching `days` back from `to`.
fn window_start(to: DateTime<Utc>, days: i64) -> DataguardResult<DateTime<Utc>> {
    if days < 0 {
        return Err(DataguardError::Validation(format!("--days must not be negative, got {days}")));
    }
    Duration::try_days(days)
        .and_then(|window| to.checked_sub_signed(window))
        .ok_or_else(|| DataguardError::Validation(format!("--days {days} is out of range")))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let mut config = parse_config(&cli.config)?;
    let config_dir = cli
        .config
        .parent()
        .unwrap_or_else(|| std::path::Path::new("."))
        .to_path_buf();
    config.resolve_paths(&config_dir);
    if let Some(data) = cli.data {
        config.storage.snapshot = data;
    }

    let snapshot_path = config.storage.snapshot.clone();
    let snapshot = Snapshot::load(&snapshot_path).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to load snapshot '{}': {}",
            snapshot_path.display(),
            e
        )
    })?;
    let services = Services::build(MemoryStore::from_snapshot(snapshot), &config)?;

    let mutated = match cli.command {
        Commands::Retention { action } => match action {
            RetentionAction::Run { tenant } => {
                let now = Utc::now();
                let batch = services
                    .retention
                    .execute_retention_policies_at(tenant.as_deref(), now)
                    .await?;
                info!(
                    next_sweep = %services.retention.next_sweep_after(now),
                    "Next scheduled sweep"
                );
                print_json(&batch)?;
                true
            }
            RetentionAction::Init { tenant } => {
                let created = services.retention.initialize_tenant_policies(&tenant).await?;
                print_json(&created)?;
                !created.is_empty()
            }
            RetentionAction::Report { tenant } => {
                let report = services.retention.generate_retention_report(&tenant).await?;
                print_json(&report)?;
                false
            }
        },
        Commands::Dpia { action } => match action {
            DpiaAction::Assess {
                tenant,
                activity,
                actor,
            } => {
                let assessment = services.dpia.perform_dpia(&tenant, activity, &actor).await?;
                print_json(&assessment)?;
                true
            }
            DpiaAction::Report { tenant } => {
                let report = services.dpia.generate_dpia_report(&tenant).await?;
                print_json(&report)?;
                false
            }
            DpiaAction::History { tenant, activity } => {
                let history = services.dpia.assessment_history(&tenant, activity).await?;
                print_json(&history)?;
                false
            }
        },
        Commands::Consent { action } => match action {
            ConsentAction::Report { tenant, days } => {
                let to = Utc::now();
                let from = window_start(to, days)?;
                let report = services
                    .consent
                    .generate_consent_report(&tenant, from, to)
                    .await?;
                print_json(&report)?;
                false
            }
        },
        Commands::Dashboard { tenant } => {
            let dashboard = services.dashboard.generate_dashboard(&tenant).await;
            print_json(&dashboard)?;
            false
        }
    };

    if mutated {
        services.store.snapshot().await.save(&snapshot_path).await?;
        info!(path = %snapshot_path.display(), "Snapshot saved");
    }

    Ok(())
}
