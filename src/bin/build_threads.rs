use std::fs;
use std::io::{self, Read, Write};

use clap::{ArgGroup, Parser};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;

use archive_server::access::normalize_list_id;
use archive_server::models::{MessageRecord, Participant, ThreadNode};
use archive_server::store::{PgRecordStore, RecordQuery, RecordStore};
use archive_server::threading::{TOP_PARTICIPANTS, build_threads};

#[derive(Parser, Debug)]
#[command(
    name = "build_threads",
    about = "Build the thread forest for a batch of archived messages",
    group(ArgGroup::new("source").required(true).args(["input", "list"]))
)]
struct Args {
    /// JSON file holding an array of message records (`-` for stdin).
    #[arg(long)]
    input: Option<String>,

    /// Scan this list (`name@domain`) from the database at `DATABASE_URL`.
    #[arg(long)]
    list: Option<String>,

    /// Lower epoch bound for `--list` scans.
    #[arg(long)]
    since: Option<i64>,

    /// Upper epoch bound for `--list` scans.
    #[arg(long)]
    until: Option<i64>,

    /// Number of top participants to report.
    #[arg(long, default_value_t = TOP_PARTICIPANTS)]
    top: usize,
}

#[derive(Serialize)]
struct Output {
    hits: usize,
    threads: Vec<ThreadNode>,
    participants: Vec<Participant>,
}

fn read_input(path: &str) -> Result<Vec<MessageRecord>, Box<dyn std::error::Error>> {
    let raw = if path == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(path)?
    };
    Ok(serde_json::from_str(&raw)?)
}

async fn scan_list(args: &Args, list: &str) -> Result<Vec<MessageRecord>, Box<dyn std::error::Error>> {
    let database_url = std::env::var("DATABASE_URL")?;
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await?;

    let store = PgRecordStore::new(pool);
    let query = RecordQuery {
        list_id: Some(normalize_list_id(list)),
        since_epoch: args.since,
        until_epoch: args.until,
        limit: None,
    };
    Ok(store.scan(&query).await?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = Args::parse();

    let records = match (&args.input, &args.list) {
        (Some(path), _) => read_input(path)?,
        (None, Some(list)) => scan_list(&args, list).await?,
        (None, None) => {
            writeln!(io::stderr(), "error: either --input or --list is required")?;
            std::process::exit(1);
        }
    };

    log::info!("threading {} records", records.len());
    let forest = build_threads(&records);

    let output = Output {
        hits: records.len(),
        participants: forest.top_participants(args.top),
        threads: forest.threads,
    };

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    serde_json::to_writer_pretty(&mut handle, &output)?;
    writeln!(handle)?;

    Ok(())
}
