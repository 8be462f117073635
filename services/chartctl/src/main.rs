use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mark_sync::{
    ChartSession, ChartSurface, ClearOutcome, EntityId, HttpClient, MarkSync, MarkVisibility,
    SurfaceError,
};
use model::Resolution;
use serde_json::{json, Value};
use tracing::Level;

#[derive(Parser, Debug)]
#[command(name = "chartctl", about = "Command-line client for chartd")]
struct Cli {
    #[arg(long, env = "CHARTD_URL", default_value = "http://127.0.0.1:3000")]
    url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(subcommand)]
    Marks(MarksCommand),
    #[command(subcommand)]
    Charts(ChartsCommand),
}

#[derive(Subcommand, Debug)]
enum MarksCommand {
    List {
        symbol: String,
    },
    /// Mark a calendar day, aligned to the chart resolution.
    Add {
        symbol: String,
        date: String,
        #[arg(long, default_value = "1D")]
        resolution: Resolution,
    },
    Delete {
        symbol: String,
        timestamp: i64,
    },
    Clear {
        symbol: String,
    },
}

#[derive(Subcommand, Debug)]
enum ChartsCommand {
    List,
    Get {
        id: String,
    },
    /// Save the chart state stored as JSON in `file`.
    Save {
        title: String,
        file: PathBuf,
    },
}

/// Hands out ids for the marks the session draws; nothing is rendered.
#[derive(Default)]
struct HeadlessSurface {
    next: u64,
}

impl ChartSurface for HeadlessSurface {
    fn create_mark_shape(&mut self, _timestamp: i64) -> Result<EntityId, SurfaceError> {
        self.next += 1;
        Ok(format!("mark-{}", self.next))
    }

    fn remove_entity(&mut self, _id: &EntityId) -> Result<(), SurfaceError> {
        Ok(())
    }

    fn mark_state_changed(&mut self, timestamp: i64, state: MarkVisibility) {
        tracing::debug!(timestamp, ?state, "mark state");
    }
}

fn session_json(session: &ChartSession<HeadlessSurface>) -> Value {
    let marks: Vec<Value> = session
        .marks()
        .iter()
        .map(|m| json!({ "id": m.id, "timestamp": m.timestamp }))
        .collect();
    json!({ "symbol": session.symbol(), "marks": marks })
}

async fn run(cli: Cli) -> Result<Value> {
    let client = Arc::new(HttpClient::new(&cli.url)?);
    let sync = MarkSync::new(client.clone());

    let out = match cli.command {
        Command::Marks(MarksCommand::List { symbol }) => {
            let marks = sync.list(&symbol).await?;
            json!({ "success": true, "marks": marks })
        }
        Command::Marks(MarksCommand::Add {
            symbol,
            date,
            resolution,
        }) => {
            let mut session = ChartSession::new(sync, HeadlessSurface::default(), symbol, resolution);
            let state = session.mark_date(&date).await?;
            let mut out = session_json(&session);
            out["state"] = json!(format!("{state:?}"));
            out
        }
        Command::Marks(MarksCommand::Delete { symbol, timestamp }) => {
            sync.delete(&symbol, timestamp).await?;
            json!({ "success": true, "symbol": symbol, "timestamp": timestamp })
        }
        Command::Marks(MarksCommand::Clear { symbol }) => match sync.delete_all_with_retry(&symbol).await? {
            ClearOutcome::Cleared(deleted) => json!({ "success": true, "deletedCount": deleted }),
            ClearOutcome::AlreadyEmpty => {
                json!({ "success": true, "deletedCount": 0, "message": "no marks stored" })
            }
        },
        Command::Charts(ChartsCommand::List) => {
            let charts: Vec<Value> = client
                .list_charts()
                .await?
                .into_iter()
                .map(|(id, summary)| json!({ "id": id, "title": summary.title, "savedAt": summary.saved_at }))
                .collect();
            json!({ "success": true, "charts": charts })
        }
        Command::Charts(ChartsCommand::Get { id }) => client.get_chart(&id).await?,
        Command::Charts(ChartsCommand::Save { title, file }) => {
            let raw = fs::read_to_string(&file)
                .with_context(|| format!("reading chart state from {}", file.display()))?;
            let state: Value = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not valid JSON", file.display()))?;
            let id = client.save_chart(&title, &state).await?;
            json!({ "success": true, "id": id })
        }
    };
    Ok(out)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::WARN)
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let out = run(cli).await?;
    println!("{}", serde_json::to_string(&out)?);
    Ok(())
}
