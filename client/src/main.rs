use clap::Parser;
use client::command::TileSpec;
use client::events::{EventBus, RoomEvent};
use client::network::Client;
use client::room::RoomConfig;
use log::{info, warn};
use shared::TileCatalog;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Room authority address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Name to join with
    #[arg(short = 'n', long, default_value = "bot")]
    name: String,

    /// Room to join
    #[arg(short = 'r', long)]
    room: String,

    /// Foreground tile catalog (JSON)
    #[arg(short = 'f', long, default_value = "foregrounds.json")]
    foregrounds: String,

    /// Background tile catalog (JSON)
    #[arg(short = 'b', long, default_value = "backgrounds.json")]
    backgrounds: String,

    /// Quiet period before a batch of edits is sent, in milliseconds
    #[arg(short = 'd', long, default_value_t = shared::MODIFICATION_DELAY_MS)]
    flush_delay: u64,

    /// How long to wait for the room snapshot, in seconds
    #[arg(short = 't', long, default_value = "10")]
    join_timeout: u64,

    /// Foreground tile to place once joined, as X,Y,TILE (repeatable)
    #[arg(short = 'p', long = "place", value_parser = parse_placement)]
    placements: Vec<Placement>,
}

#[derive(Debug, Clone)]
struct Placement {
    x: i32,
    y: i32,
    tile: TileSpec,
}

fn parse_placement(s: &str) -> Result<Placement, String> {
    let mut parts = s.splitn(3, ',');
    let (Some(x), Some(y), Some(tile)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(format!("expected X,Y,TILE, got '{}'", s));
    };
    let x = x.trim().parse().map_err(|e| format!("bad x '{}': {}", x, e))?;
    let y = y.trim().parse().map_err(|e| format!("bad y '{}': {}", y, e))?;
    let tile = match tile.trim().parse::<u16>() {
        Ok(id) => TileSpec::Id(id),
        Err(_) => TileSpec::from(tile.trim()),
    };
    Ok(Placement { x, y, tile })
}

fn describe(event: &RoomEvent) {
    match event {
        RoomEvent::ForegroundChanged { by, x, y, tile } => {
            info!("Foreground ({}, {}) -> #{} by {:?}", x, y, tile, by)
        }
        RoomEvent::ParticipantJoined { name, .. } => info!("{} joined", name),
        RoomEvent::ParticipantLeft { name, .. } => info!("{} left", name),
        RoomEvent::Kicked { reason } => info!("Kicked: {}", reason),
        other => info!("{:?}", other),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);

    let catalog = TileCatalog::from_json(
        &std::fs::read_to_string(&args.foregrounds)?,
        &std::fs::read_to_string(&args.backgrounds)?,
    )?;

    let config = RoomConfig {
        flush_delay: Duration::from_millis(args.flush_delay),
    };

    let (events, mut rx) = EventBus::channel();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            describe(&event);
        }
    });

    let mut client = Client::new(
        &args.server,
        &args.name,
        &args.room,
        Arc::new(catalog),
        config,
        events,
    )
    .await?;

    client
        .join(Duration::from_secs(args.join_timeout))
        .await?;

    let room = client.handle();
    let placements = args.placements;
    let painter = async move {
        for Placement { x, y, tile } in placements {
            if let Err(e) = room.set_foreground(x, y, tile).await {
                warn!("Could not place tile at ({}, {}): {}", x, y, e);
            }
        }
    };

    tokio::select! {
        (result, ()) = async { tokio::join!(client.run(), painter) } => result?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    client.disconnect().await?;

    Ok(())
}
