//! maintq CLI: operator interface to the maintenance tracker core.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use maintq::analytics::Analytics;
use maintq::auth::Credential;
use maintq::config::Config;
use maintq::error::Error;
use maintq::intake::{CreateRequest, Intake};
use maintq::lifecycle::Lifecycle;
use maintq::mirror::Mirror;
use maintq::model::{Equipment, EquipmentId, Request, RequestId, Status, Team};
use maintq::store::Store;
use maintq::store::pg::PgStore;
use maintq::telemetry::{TelemetryConfig, init_telemetry};
use secrecy::ExposeSecret;

#[derive(Parser)]
#[command(name = "maintq", about = "Maintenance tracker core")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run pending database migrations
    Migrate,
    /// Follow the live change feed and periodic risk analytics
    Watch {
        /// Act as this user (resolved by email)
        #[arg(long = "as")]
        as_email: String,
    },
    /// Request operations
    Request {
        #[command(subcommand)]
        action: RequestAction,
    },
    /// Equipment risk analytics
    Stats {
        /// Act as this user (resolved by email)
        #[arg(long = "as")]
        as_email: String,
        /// Restrict to one equipment id
        #[arg(long)]
        equipment_id: Option<uuid::Uuid>,
    },
}

#[derive(Subcommand)]
enum RequestAction {
    /// Create a new maintenance request
    Create {
        /// Equipment the request is raised against
        equipment_id: uuid::Uuid,
        /// "Corrective" or "Preventive"
        #[arg(value_name = "TYPE")]
        kind: String,
        title: String,
        #[arg(long)]
        description: Option<String>,
        /// Scheduled date (YYYY-MM-DD), for preventive work
        #[arg(long)]
        scheduled_date: Option<chrono::NaiveDate>,
        /// Act as this user (resolved by email)
        #[arg(long = "as")]
        as_email: String,
    },
    /// Transition a request's status
    SetStatus {
        /// Request ID (full UUID or prefix)
        id: String,
        /// Target status
        status: String,
        /// Repair duration in hours (required for Repaired)
        #[arg(long)]
        duration_hours: Option<f64>,
        /// Act as this user (resolved by email)
        #[arg(long = "as")]
        as_email: String,
    },
    /// List requests
    List {
        /// Filter by status
        #[arg(long)]
        status: Option<String>,
        /// Maximum rows to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::from_env()?;
    let store = Arc::new(PgStore::connect(config.database_url.expose_secret()).await?);

    match cli.command {
        Command::Migrate => {
            store.migrate().await?;
            println!("migrations applied");
            Ok(())
        }
        Command::Watch { as_email } => cmd_watch(&config, store, &as_email).await,
        Command::Request { action } => match action {
            RequestAction::Create {
                equipment_id,
                kind,
                title,
                description,
                scheduled_date,
                as_email,
            } => {
                cmd_request_create(
                    store,
                    equipment_id,
                    kind,
                    title,
                    description,
                    scheduled_date,
                    &as_email,
                )
                .await
            }
            RequestAction::SetStatus {
                id,
                status,
                duration_hours,
                as_email,
            } => cmd_request_set_status(store, &id, &status, duration_hours, &as_email).await,
            RequestAction::List { status, limit } => cmd_request_list(store, status, limit).await,
        },
        Command::Stats {
            as_email,
            equipment_id,
        } => cmd_stats(store, &as_email, equipment_id).await,
    }
}

/// Resolve a caller identity by email. Credential validation proper lives
/// with the identity provider; the CLI only looks the profile up.
async fn credential_for(store: &Arc<PgStore>, email: &str) -> anyhow::Result<Credential> {
    let profile = store
        .profile_by_email(email)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no user with email {email}"))?;
    Ok(Credential::new(profile))
}

async fn cmd_watch(config: &Config, store: Arc<PgStore>, as_email: &str) -> anyhow::Result<()> {
    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "maintq".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let credential = credential_for(&store, as_email).await?;
    let store: Arc<dyn Store> = store;

    let teams = Mirror::<Team>::start(Arc::clone(&store)).await?;
    let equipment = Mirror::<Equipment>::start(Arc::clone(&store)).await?;
    let requests = Mirror::<Request>::start(Arc::clone(&store)).await?;

    let analytics = Analytics::new(Arc::clone(&store));
    let refresh = analytics.spawn_refresh(credential, config.analytics_refresh);
    let mut snapshots = refresh.snapshots();

    println!(
        "watching: {} team(s), {} equipment, {} request(s). ctrl-c to stop",
        teams.len(),
        equipment.len(),
        requests.len()
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let stats = snapshots.borrow_and_update().clone();
                let high_risk: Vec<_> = stats.iter().filter(|s| s.is_high_risk).collect();
                println!(
                    "[analytics] {} equipment, {} high-risk, {} open request(s) mirrored",
                    stats.len(),
                    high_risk.len(),
                    requests.len()
                );
                for stat in high_risk {
                    println!(
                        "  HIGH RISK {:<24} breakdowns={} avg_repair={}h active={}",
                        stat.equipment_name,
                        stat.breakdown_count,
                        stat.avg_repair_time,
                        stat.active_request_count
                    );
                }
            }
        }
    }

    refresh.stop().await;
    teams.stop();
    equipment.stop();
    requests.stop();
    Ok(())
}

async fn cmd_request_create(
    store: Arc<PgStore>,
    equipment_id: uuid::Uuid,
    kind: String,
    title: String,
    description: Option<String>,
    scheduled_date: Option<chrono::NaiveDate>,
    as_email: &str,
) -> anyhow::Result<()> {
    let credential = credential_for(&store, as_email).await?;

    let mut payload = CreateRequest::new(EquipmentId(equipment_id), kind.parse()?, title);
    if let Some(description) = description {
        payload = payload.description(description);
    }
    if let Some(date) = scheduled_date {
        payload = payload.scheduled_date(date);
    }

    let intake = Intake::new(store);
    let request = intake.create(Some(&credential), payload).await?;
    println!(
        "Created: {} ({} / {}) for equipment {}",
        request.id, request.kind, request.status, request.equipment_id
    );
    Ok(())
}

async fn cmd_request_set_status(
    store: Arc<PgStore>,
    id_str: &str,
    status: &str,
    duration_hours: Option<f64>,
    as_email: &str,
) -> anyhow::Result<()> {
    let credential = credential_for(&store, as_email).await?;
    let target: Status = status.parse()?;
    let id = resolve_request_id(store.as_ref(), id_str).await?;

    let lifecycle = Lifecycle::new(store);
    let request = lifecycle
        .transition(Some(&credential), id, target, duration_hours)
        .await?;

    print!("{} → {}", request.id, request.status);
    if let Some(hours) = request.duration_hours {
        print!(" ({hours}h)");
    }
    println!();
    Ok(())
}

async fn cmd_request_list(
    store: Arc<PgStore>,
    status: Option<String>,
    limit: usize,
) -> anyhow::Result<()> {
    let status_filter: Option<Status> = status.map(|s| s.parse()).transpose()?;
    let requests = store.list_requests().await?;
    let rows: Vec<&Request> = requests
        .iter()
        .filter(|r| status_filter.is_none_or(|s| r.status == s))
        .take(limit)
        .collect();

    if rows.is_empty() {
        println!("No requests found.");
        return Ok(());
    }

    println!(
        "{:<8}  {:<12}  {:<11}  {:<30}  CREATED",
        "ID", "TYPE", "STATUS", "TITLE"
    );
    println!("{}", "-".repeat(80));
    for request in &rows {
        let title = truncate_chars(&request.title, 30);
        println!(
            "{:<8}  {:<12}  {:<11}  {:<30}  {}",
            request.id.to_string(),
            request.kind.to_string(),
            request.status.to_string(),
            title,
            request.created_at.format("%Y-%m-%d %H:%M")
        );
    }
    println!("\n{} request(s)", rows.len());
    Ok(())
}

async fn cmd_stats(
    store: Arc<PgStore>,
    as_email: &str,
    equipment_id: Option<uuid::Uuid>,
) -> anyhow::Result<()> {
    let credential = credential_for(&store, as_email).await?;
    let analytics = Analytics::new(store);

    let stats = match equipment_id {
        Some(id) => vec![
            analytics
                .stats_for(Some(&credential), EquipmentId(id))
                .await?,
        ],
        None => analytics.stats_all(Some(&credential)).await?,
    };

    println!(
        "{:<24}  {:<10}  {:<12}  {:<7}  RISK",
        "EQUIPMENT", "BREAKDOWNS", "AVG REPAIR", "ACTIVE"
    );
    println!("{}", "-".repeat(70));
    for stat in &stats {
        println!(
            "{:<24}  {:<10}  {:<12}  {:<7}  {}",
            stat.equipment_name,
            stat.breakdown_count,
            format!("{}h", stat.avg_repair_time),
            stat.active_request_count,
            if stat.is_high_risk { "HIGH" } else { "-" }
        );
    }
    Ok(())
}

/// Cut `text` to at most `max_chars` characters, on a char boundary.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Support prefix matching: find the request whose ID starts with the
/// given string.
async fn resolve_request_id(store: &PgStore, id_str: &str) -> anyhow::Result<RequestId> {
    if id_str.len() >= 36 {
        return Ok(RequestId(uuid::Uuid::parse_str(id_str)?));
    }

    let requests = store.list_requests().await?;
    let matches: Vec<_> = requests
        .iter()
        .filter(|r| r.id.0.to_string().starts_with(id_str))
        .collect();
    match matches.len() {
        0 => Err(Error::NotFound(format!("no request matching prefix '{id_str}'")).into()),
        1 => Ok(matches[0].id),
        n => anyhow::bail!("{n} requests match prefix '{id_str}', be more specific"),
    }
}
