//! flashkv CLI
//!
//! Command-line interface for inspecting and editing a flash image file.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use flashkv::{format_region, Config, FileFlash, NvmStore, Snapshot};
use tracing_subscriber::{fmt, EnvFilter};

/// flashkv CLI
#[derive(Parser, Debug)]
#[command(name = "flashkv-cli")]
#[command(about = "CLI for the flashkv NVM record store")]
#[command(version)]
struct Args {
    /// Flash image file (created erased if missing)
    #[arg(short, long, default_value = "./flash.img")]
    image: PathBuf,

    /// Device size in bytes
    #[arg(long, default_value = "65536")]
    size: u32,

    /// Erase sector size in bytes
    #[arg(long, default_value = "4096")]
    sector_size: u32,

    /// Start address of the log region
    #[arg(long, default_value = "0", value_parser = parse_u32)]
    start: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Open the image, running recovery if needed
    Init,

    /// Print the payload stored under an id
    Get {
        /// Record id (decimal or 0x-prefixed hex)
        #[arg(value_parser = parse_u64)]
        id: u64,

        /// Print the payload as hex
        #[arg(long)]
        hex: bool,
    },

    /// Store a value under an id
    Put {
        /// Record id (decimal or 0x-prefixed hex)
        #[arg(value_parser = parse_u64)]
        id: u64,

        /// The value to store
        value: String,
    },

    /// Tombstone an id
    Del {
        /// Record id (decimal or 0x-prefixed hex)
        #[arg(value_parser = parse_u64)]
        id: u64,
    },

    /// Erase every used sector
    EraseAll,

    /// Erase the whole region, even if it cannot be opened
    Format,

    /// List every header in log order
    List,

    /// Show space usage
    Stats,

    /// Check headers and payloads without modifying the image
    Verify,

    /// Save every live record to a snapshot file
    Export {
        /// Snapshot file to write
        path: PathBuf,
    },

    /// Write every record of a snapshot file
    Import {
        /// Snapshot file to read
        path: PathBuf,
    },
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,flashkv=info"));

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> flashkv::Result<()> {
    let config = Config::builder().start_address(args.start).build();
    let mut flash = FileFlash::open(&args.image, args.size, args.sector_size)?;

    if let Commands::Format = args.command {
        format_region(&mut flash, &config)?;
        println!("Formatted {}", args.image.display());
        return Ok(());
    }

    let mut store = NvmStore::open(flash, config)?;

    match args.command {
        Commands::Init => {
            let report = store.init_report();
            match report.recovered_from {
                Some(address) => println!(
                    "Recovered from corruption at {:#010x} ({} sectors erased)",
                    address, report.sectors_erased
                ),
                None => println!(
                    "{} live, {} tombstones, cursor {:#010x}",
                    report.live_records, report.tombstones, report.cursor
                ),
            }
        }
        Commands::Get { id, hex } => match store.get(id)? {
            Some(data) if hex => println!("{}", to_hex(&data)),
            Some(data) => println!("{}", String::from_utf8_lossy(&data)),
            None => println!("(not found)"),
        },
        Commands::Put { id, value } => {
            let outcome = store.write(id, value.as_bytes())?;
            if outcome.is_appended() {
                println!("Written at {:#010x}", outcome.address());
            } else {
                println!("Unchanged");
            }
            if outcome.is_near_full() {
                println!("Warning: region is full");
            }
        }
        Commands::Del { id } => {
            if store.erase(id)? {
                println!("Deleted");
            } else {
                println!("(not found)");
            }
        }
        Commands::EraseAll => {
            store.erase_all()?;
            println!("Erased");
        }
        Commands::List => {
            for record in store.records()? {
                let state = if record.live { "live" } else { "tombstone" };
                println!(
                    "{:#010x}  {:>9}  id={:<20} len={}",
                    record.address, state, record.id, record.len
                );
            }
        }
        Commands::Stats => {
            let stats = store.stats()?;
            println!("live records : {}", stats.live_records);
            println!("tombstones   : {}", stats.tombstones);
            println!("used bytes   : {}", stats.used_bytes);
            println!("dead bytes   : {}", stats.dead_bytes);
            println!("capacity     : {}", stats.capacity);
            println!("remaining    : {}", stats.remaining);
        }
        Commands::Verify => {
            let report = store.verify()?;
            println!(
                "{} live, {} tombstones, log ends at {:#010x}",
                report.live_records, report.tombstones, report.end_address
            );
            if let Some(address) = report.corrupt_at {
                println!("Corrupted header at {:#010x}", address);
            }
            for address in &report.payload_errors {
                println!("Bad payload at {:#010x}", address);
            }
            if report.is_clean() {
                println!("OK");
            }
        }
        Commands::Export { path } => {
            let snapshot = store.export()?;
            snapshot.save(&path)?;
            println!("Exported {} records to {}", snapshot.len(), path.display());
        }
        Commands::Import { path } => {
            let snapshot = Snapshot::load(&path)?;
            let summary = store.import(&snapshot)?;
            println!(
                "Imported {} records ({} unchanged)",
                summary.written, summary.unchanged
            );
        }
        // Formatted before open
        Commands::Format => {}
    }

    Ok(())
}

fn parse_u64(s: &str) -> Result<u64, String> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    }
    .map_err(|e| format!("invalid number '{}': {}", s, e))
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let value = parse_u64(s)?;
    u32::try_from(value).map_err(|_| format!("'{}' does not fit in 32 bits", s))
}

fn to_hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02x}", b)).collect()
}
