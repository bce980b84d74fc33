//! aostore CLI
//!
//! Command-line interface for inspecting and poking at an aostore
//! storage directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use aostore::storage::IdAllocator;
use aostore::{
    Config, DataType, Engine, MapKind, MapOptions, RecoveryPolicy, StorageMap, StringType,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

/// aostore CLI
#[derive(Parser, Debug)]
#[command(name = "aostore-cli")]
#[command(about = "Inspect and modify aostore map storage")]
#[command(version)]
struct Args {
    /// Storage directory
    #[arg(short, long, default_value = "./aostore_data")]
    storage: PathBuf,

    /// Skip artifacts with malformed ids instead of failing
    #[arg(long)]
    skip_malformed: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the maps recovered from the storage directory
    Maps,

    /// Store a string value under a string key
    Put {
        map: String,
        key: String,
        value: String,

        /// Map kind (adaptive, direct, buffered, inmemory)
        #[arg(short, long)]
        kind: Option<String>,
    },

    /// Print the value stored under a key
    Get {
        map: String,
        key: String,

        #[arg(short, long)]
        kind: Option<String>,
    },

    /// Print every entry of a map in key order
    Dump {
        map: String,

        #[arg(short, long)]
        kind: Option<String>,
    },

    /// Drive an in-memory adaptive map through a write burst and a read
    /// burst, printing what each background tick did
    Workload {
        /// Operations per burst
        #[arg(short, long, default_value = "1000")]
        ops: usize,
    },
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,aostore=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> aostore::Result<()> {
    let policy = if args.skip_malformed {
        RecoveryPolicy::Skip
    } else {
        RecoveryPolicy::Abort
    };

    match args.command {
        Commands::Maps => {
            if !args.storage.exists() {
                println!("(no storage at {})", args.storage.display());
                return Ok(());
            }
            let ids = IdAllocator::recover(&args.storage, policy)?;
            for (name, id) in ids.assignments() {
                println!("{:>6}  {}", id, name);
            }
            println!("last id: {}", ids.last_id());
        }

        Commands::Put {
            map,
            key,
            value,
            kind,
        } => {
            let engine = open_engine(&args.storage, policy)?;
            let map = open_string_map(&engine, &map, kind.as_deref())?;
            let previous = map.put(key.into_bytes(), value.into_bytes())?;
            engine.close()?;

            match previous {
                Some(old) => println!("OK (replaced {:?})", String::from_utf8_lossy(&old)),
                None => println!("OK"),
            }
        }

        Commands::Get { map, key, kind } => {
            let engine = open_engine(&args.storage, policy)?;
            let map = open_string_map(&engine, &map, kind.as_deref())?;
            match map.get(key.as_bytes())? {
                Some(value) => println!("{}", String::from_utf8_lossy(&value)),
                None => println!("(nil)"),
            }
            engine.close()?;
        }

        Commands::Dump { map, kind } => {
            let engine = open_engine(&args.storage, policy)?;
            let map = open_string_map(&engine, &map, kind.as_deref())?;
            for (key, value) in map.entries()? {
                println!(
                    "{}\t{}",
                    String::from_utf8_lossy(&key),
                    String::from_utf8_lossy(&value)
                );
            }
            engine.close()?;
        }

        Commands::Workload { ops } => workload(ops)?,
    }

    Ok(())
}

fn open_engine(storage: &Path, policy: RecoveryPolicy) -> aostore::Result<Engine> {
    let config = Config::builder()
        .storage_name(storage)
        .recovery_policy(policy)
        .build();
    Engine::open(config)
}

fn open_string_map(
    engine: &Engine,
    name: &str,
    kind: Option<&str>,
) -> aostore::Result<Arc<dyn StorageMap>> {
    let string_type: Arc<dyn DataType> = Arc::new(StringType);
    engine.open_map(
        name,
        MapKind::from_tag(kind),
        Arc::clone(&string_type),
        string_type,
        MapOptions::default(),
    )
}

fn workload(ops: usize) -> aostore::Result<()> {
    // Ticks are driven by hand below.
    let config = Config::builder()
        .in_memory(true)
        .background_interval(Duration::from_secs(3600))
        .build();
    let engine = Engine::open(config)?;

    let string_type: Arc<dyn DataType> = Arc::new(StringType);
    let map = engine.open_adaptive_map("workload", Arc::clone(&string_type), string_type)?;

    for i in 0..ops {
        map.put(format!("key{:08}", i).into_bytes(), b"value".to_vec())?;
    }
    println!("after writes: {:?}", engine.run_background_tick());
    println!("mode: {:?}", map.mode());

    for i in 0..ops {
        map.put(format!("key{:08}", i).into_bytes(), b"rewritten".to_vec())?;
    }
    println!("pending before merge: {}", map.pending_count());
    println!("after rewrites: {:?}", engine.run_background_tick());
    println!("pending after merge: {}", map.pending_count());

    for i in 0..ops {
        map.get(format!("key{:08}", i).as_bytes())?;
    }
    println!("after reads: {:?}", engine.run_background_tick());
    println!("mode: {:?}", map.mode());
    println!("entries: {}", map.len()?);

    engine.close()
}
