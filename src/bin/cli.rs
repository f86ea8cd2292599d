//! simstor CLI
//!
//! Inspect and edit a single string-keyed, string-valued table.

use clap::{Parser, Subcommand};
use simstor::{Record, StoreConfig, StoreRegistry, StringCodec};
use tracing_subscriber::{fmt, EnvFilter};

/// simstor CLI
#[derive(Parser, Debug)]
#[command(name = "simstor-cli")]
#[command(about = "CLI for simstor slot-file tables")]
#[command(version)]
struct Args {
    /// Directory holding the table files
    #[arg(short, long, default_value = "./simstor_data")]
    dir: String,

    /// Table name
    #[arg(short, long)]
    table: String,

    /// Slot width multiplier (slot width = increment * 1000 bytes)
    #[arg(short, long, default_value = "1")]
    increment: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List stored IDs
    Ids,

    /// Read a record by ID
    Get {
        /// The ID to read
        id: String,
    },

    /// Insert a new record
    Put {
        /// The ID to insert
        id: String,

        /// The value to store
        value: String,
    },

    /// Overwrite an existing record
    Set {
        /// The ID to update
        id: String,

        /// The new value
        value: String,
    },

    /// Print every readable record in slot order
    Dump,

    /// Rewrite the table from its readable records
    Compact,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,simstor=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> simstor::Result<()> {
    let config = StoreConfig::builder(&args.table)
        .directory(&args.dir)
        .increment(args.increment)
        .build()?;

    let registry: StoreRegistry<String, String> =
        StoreRegistry::open([config], StringCodec, StringCodec)?;
    let table = args.table.as_str();

    let outcome = match args.command {
        Commands::Ids => registry.list_ids(table).map(|mut ids| {
            ids.sort();
            for id in ids {
                println!("{}", id);
            }
        }),
        Commands::Get { id } => registry
            .read(table, &id)
            .map(|record| println!("{}", record.value)),
        Commands::Put { id, value } => registry.insert(table, &Record::new(id, value)),
        Commands::Set { id, value } => registry.update(table, &Record::new(id, value)),
        Commands::Dump => registry.read_all(table).map(|records| {
            for record in records {
                println!("{}={}", record.id, record.value);
            }
        }),
        Commands::Compact => registry
            .read_all(table)
            .and_then(|records| registry.rewrite(table, &records)),
    };

    let closed = registry.close();
    outcome.and(closed)
}
