use clap::Parser;
use log::{error, info};
use server::config::{BroadcastCadence, ServerConfig, SpawnPolicy, WorldBounds};
use server::network::Server;
use shared::{DEFAULT_PORT, DEFAULT_STEP};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Distance covered by a single move command
    #[arg(long, default_value_t = DEFAULT_STEP)]
    step: f32,

    /// Broadcast on a fixed tick (updates per second) instead of on every change
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..=1000))]
    tick_rate: Option<u32>,

    /// Maximum number of concurrent connections
    #[arg(short, long, default_value = "256")]
    max_clients: usize,

    /// Seconds without any traffic before a connection is dropped
    #[arg(long, default_value = "30", value_parser = clap::value_parser!(u64).range(1..))]
    timeout: u64,

    /// Seconds between WebSocket pings
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(u64).range(1..))]
    heartbeat: u64,

    /// Frames queued for a connection before it is dropped as too slow
    #[arg(long, default_value = "64", value_parser = clap::value_parser!(u64).range(1..))]
    outbox_capacity: u64,

    /// Spawn players at random positions instead of the origin
    #[arg(long)]
    scatter: bool,

    /// Clamp positions into MIN_X,MIN_Y,MAX_X,MAX_Y
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    bounds: Option<Vec<f32>>,

    /// Treat a move from a connection without a role as joining as a player
    #[arg(long)]
    promote_on_move: bool,
}

impl Args {
    fn into_config(self) -> Result<ServerConfig, String> {
        let cadence = match self.tick_rate {
            Some(rate) => BroadcastCadence::Interval(Duration::from_secs_f64(1.0 / rate as f64)),
            None => BroadcastCadence::OnChange,
        };
        let spawn = if self.scatter {
            SpawnPolicy::Scatter
        } else {
            SpawnPolicy::default()
        };
        let bounds = match self.bounds.as_deref() {
            None => None,
            Some([min_x, min_y, max_x, max_y]) => {
                Some(WorldBounds::new(*min_x, *min_y, *max_x, *max_y))
            }
            Some(other) => {
                return Err(format!(
                    "--bounds takes four values MIN_X,MIN_Y,MAX_X,MAX_Y, got {}",
                    other.len()
                ))
            }
        };

        let config = ServerConfig {
            step: self.step,
            spawn,
            bounds,
            cadence,
            max_clients: self.max_clients,
            client_timeout: Duration::from_secs(self.timeout),
            heartbeat_interval: Duration::from_secs(self.heartbeat),
            outbox_capacity: self.outbox_capacity as usize,
            promote_on_move: self.promote_on_move,
        };
        config.validate().map_err(|e| e.to_string())?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let address = format!("{}:{}", args.host, args.port);
    let config = args.into_config()?;

    info!("Starting server on {}", address);
    info!(
        "Step {}, cadence {:?}, bounds {:?}, max {} connections",
        config.step, config.cadence, config.bounds, config.max_clients
    );

    let server = Server::bind(&address, config).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped with error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
