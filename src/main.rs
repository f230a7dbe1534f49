//! Binary entrypoint for the mumemap CLI.
//!
//! Commands:
//! - `init` - write a starter `mumemap.toml`
//! - `status` - load the map metadata and print bounds and counters
//! - `lookup --name <n> --desc <d>` - hash a room and print its candidate coordinates
//! - `room <x> <y> <z>` - fetch one room from the zone data
//! - `replay <file> [--chunk-size <n>] [--assume-markup]` - run a captured session log
//!   through the tag filter and path machine
//!
//! See the library crate docs for module‑level details: `mumemap::`.
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{debug, info, warn};
use std::sync::Arc;

use mumemap::config::Config;
use mumemap::logutil::escape_log;
use mumemap::mapper::normalize::{chunk_of, hash_name_desc, normalize};
use mumemap::mapper::{
    DirSource, MapDataSource, MapDisplay, MapSession, Room, RoomCoords, RoomIndexCache,
    ZoneDataCache,
};
use mumemap::metrics;

#[derive(Parser)]
#[command(name = "mumemap")]
#[command(about = "Live map companion for MUME")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "mumemap.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,
    /// Load map metadata and show status
    Status,
    /// Look up a room by its name and description
    Lookup {
        /// Room name as shown by the game
        #[arg(short, long)]
        name: String,
        /// Room description; `\n` sequences become line breaks
        #[arg(short, long)]
        desc: String,
    },
    /// Show the room at the given coordinates
    Room {
        #[arg(allow_negative_numbers = true)]
        x: i32,
        #[arg(allow_negative_numbers = true)]
        y: i32,
        #[arg(allow_negative_numbers = true)]
        z: i32,
    },
    /// Feed a captured session log through the mapper
    Replay {
        /// Raw server output, as logged by the client
        file: String,
        /// Bytes per chunk handed to the filter
        #[arg(long, default_value_t = 512)]
        chunk_size: usize,
        /// The log starts after XML mode was negotiated
        #[arg(long)]
        assume_markup: bool,
    },
}

/// Display that only logs, for the command line.
struct LogDisplay;

impl MapDisplay for LogDisplay {
    fn on_movement(&self, here: RoomCoords) {
        info!("Player moved to {}", here);
    }

    fn on_rooms(&self, rooms: &[Arc<Room>]) {
        info!("{} rooms available for display", rooms.len());
        for room in rooms {
            debug!("  {} {} ({})", room.coords(), escape_log(room.name()), room.sector());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Init = cli.command {
        init_logging(None, cli.verbose);
        if std::path::Path::new(&cli.config).exists() {
            println!("Configuration already exists at {}", cli.config);
            return Ok(());
        }
        Config::create_default(&cli.config).await?;
        println!("Created default configuration at {}", cli.config);
        println!("Edit [mapper] to point at a local mirror or another data URL.");
        return Ok(());
    }

    let config = Config::load(&cli.config).await?;
    init_logging(Some(&config), cli.verbose);
    let source = open_source(&config)?;
    let source_name = source.describe();
    info!("Map data source: {}", source_name);

    match cli.command {
        Commands::Init => {}
        Commands::Status => {
            let zones = ZoneDataCache::load(source).await?;
            let meta = zones.metadata();
            println!("Map data: {}", source_name);
            println!("Rooms: {}", meta.rooms_count);
            println!(
                "Bounds: x {}..{}  y {}..{}  z {}..{}",
                meta.min_x, meta.max_x, meta.min_y, meta.max_y, meta.min_z, meta.max_z
            );
            println!("View radius: {}", config.mapper.view_radius);
            println!("Counters: {}", metrics::snapshot());
        }
        Commands::Lookup { name, desc } => {
            let desc = desc.replace("\\n", "\n");
            let hash = hash_name_desc(&name, &desc);
            println!("Normalized name: {:?}", normalize(&name));
            println!("Normalized desc: {:?}", normalize(&desc));
            println!("Hash: {} (chunk {})", hash, chunk_of(&hash));
            let index = RoomIndexCache::new(source);
            match index.find_pos_by_name_desc(&name, &desc).await? {
                Some(candidates) => {
                    for c in candidates {
                        println!("  {}", c);
                    }
                }
                None => println!("Room not in index"),
            }
        }
        Commands::Room { x, y, z } => {
            let zones = ZoneDataCache::load(source).await?;
            let here = RoomCoords::new(x, y, z);
            match zones.get_room_at(here).await {
                Some(room) => {
                    let data = &room.data;
                    println!("{} #{} {}", here, data.id, data.name);
                    println!("Sector: {}", data.sector);
                    print!("{}", data.desc);
                    let open = data.exits.iter().filter(|e| e.is_open()).count();
                    println!("Exits: {} open of {}", open, data.exits.len());
                }
                None => println!("No room at {}", here),
            }
        }
        Commands::Replay {
            file,
            chunk_size,
            assume_markup,
        } => {
            replay(source, &config, &file, chunk_size, assume_markup).await?;
        }
    }

    Ok(())
}

async fn replay(
    source: Arc<dyn MapDataSource>,
    config: &Config,
    file: &str,
    chunk_size: usize,
    assume_markup: bool,
) -> Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .map_err(|e| anyhow!("Failed to read session log {}: {}", file, e))?;
    let text = String::from_utf8_lossy(&bytes);

    let mut session =
        MapSession::open(source, Arc::new(LogDisplay), config.mapper.view_radius).await?;
    if assume_markup {
        session.assume_markup();
    } else {
        session.connected();
    }

    let mut rest: &str = &text;
    let chunk_size = chunk_size.max(1);
    while !rest.is_empty() {
        let mut end = chunk_size.min(rest.len());
        while !rest.is_char_boundary(end) {
            end += 1;
        }
        let (chunk, tail) = rest.split_at(end);
        rest = tail;
        match session.feed(chunk).await {
            Ok(shown) => print!("{}", shown),
            Err(e) => warn!("Replay: {}", e),
        }
        for request in session.take_outbound() {
            info!("Replay: would send {}", escape_log(&request));
        }
    }
    println!();
    match session.current() {
        Some(here) => println!("Final position: {}", here),
        None => println!("Final position: unknown"),
    }
    println!("Counters: {}", metrics::snapshot());
    Ok(())
}

fn open_source(config: &Config) -> Result<Arc<dyn MapDataSource>> {
    if let Some(dir) = config.mapper.data_dir() {
        return Ok(Arc::new(DirSource::new(dir)));
    }
    http_source(config)
}

#[cfg(feature = "http")]
fn http_source(config: &Config) -> Result<Arc<dyn MapDataSource>> {
    let source =
        mumemap::mapper::HttpSource::new(&config.mapper.base_url, config.mapper.timeout())?;
    Ok(Arc::new(source))
}

#[cfg(not(feature = "http"))]
fn http_source(_config: &Config) -> Result<Arc<dyn MapDataSource>> {
    Err(anyhow!(
        "built without the `http` feature; set mapper.data_dir to a local mirror"
    ))
}

fn init_logging(config: Option<&Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let base_level = match verbosity {
        0 => config
            .and_then(|cfg| cfg.logging.level.parse().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config
        .and_then(|cfg| cfg.logging.file.as_ref())
        .and_then(|file| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
                .ok()
        });

    if let Some(f) = log_file {
        let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
        // Mirror to the console only when someone is watching it
        let is_tty = atty::is(atty::Stream::Stderr);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = write_mutex.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            writeln!(
                fmt,
                "{} [{}] {}",
                chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                record.level(),
                record.args()
            )
        });
    }
    let _ = builder.try_init();
}
