/// Cadence - sync the music library with the backend
use cadence_cli::{App, AppConfig, StatusReport};
use cadence_migration::MigrationReport;
use cadence_sync::{CycleOutcome, CycleReport};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "Local-first music library sync", long_about = None)]
struct Cli {
    /// Configuration file path (defaults to ./cadence.toml if present)
    #[arg(short, long, global = true, env = "CADENCE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sync cycle and print its report
    Sync,
    /// Keep syncing in the background until Ctrl-C
    Watch,
    /// Upload the data of the pre-sync app
    Migrate {
        /// Delete the legacy data if every record was migrated
        #[arg(long)]
        clear: bool,
    },
    /// Show cursors, pending uploads and recent sync errors
    Status {
        /// Number of recent errors to show
        #[arg(short, long, default_value_t = 10)]
        errors: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "cadence_cli=info,cadence_sync=info,cadence_migration=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref())?;
    config.validate()?;
    let app = App::init(config).await?;

    match cli.command {
        Commands::Sync => {
            let outcome = app.sync_once().await?;
            print_outcome(&outcome);
        }
        Commands::Watch => {
            tracing::info!("Watching for changes, press Ctrl-C to stop");
            app.watch(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                }
            })
            .await?;
        }
        Commands::Migrate { clear } => match app.migrate(clear).await? {
            Some(report) => print_migration(&report, app.config.migration.max_errors, clear),
            None => println!("No legacy data found"),
        },
        Commands::Status { errors } => {
            let status = app.status(errors).await?;
            print_status(&status);
        }
    }

    Ok(())
}

fn print_outcome(outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Completed(report) => print_report(report),
        CycleOutcome::Coalesced => println!("A sync cycle is already running"),
        CycleOutcome::Suspended => println!("Not signed in, sync suspended"),
    }
}

fn print_report(report: &CycleReport) {
    println!(
        "Cycle {} ({}): {} applied, {} pushed",
        report.cycle_id,
        report.trigger,
        report.applied(),
        report.pushed()
    );
    for table in &report.tables {
        match &table.error {
            Some(error) => println!("  {:<16} failed: {}", table.table.as_str(), error),
            None => println!(
                "  {:<16} pulled {}, applied {}, kept {}, skipped {}, pushed {}, rejected {}, removed {}",
                table.table.as_str(),
                table.pulled,
                table.applied,
                table.kept_local,
                table.skipped,
                table.pushed,
                table.rejected,
                table.removed
            ),
        }
    }
}

fn print_migration(report: &MigrationReport, max_errors: usize, clear: bool) {
    println!("{}", report.summary(max_errors));
    if clear && !report.success {
        println!("Legacy data kept because some records failed");
    } else if clear {
        println!("Legacy data cleared");
    }
}

fn print_status(status: &StatusReport) {
    let Some(user_id) = &status.user_id else {
        println!("Not signed in");
        return;
    };

    println!("User: {user_id}");
    println!("Pending uploads: {}", status.pending_uploads);

    if status.cursors.is_empty() {
        println!("Never synced");
    } else {
        println!("Cursors:");
        for (table, cursor) in &status.cursors {
            println!("  {:<16} {}", table.as_str(), cursor.to_rfc3339());
        }
    }

    if !status.recent_errors.is_empty() {
        println!("Recent errors:");
        for entry in &status.recent_errors {
            let table = entry.table.map_or("-", |t| t.as_str());
            println!(
                "  {} {:<16} [{}] {}",
                entry.occurred_at.to_rfc3339(),
                table,
                entry.kind,
                entry.message
            );
        }
    }
}
