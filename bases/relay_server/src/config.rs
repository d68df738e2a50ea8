// bases/relay_server/src/config.rs
use crate::error::ServerError;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Relay configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Port to listen on
    pub port: u16,

    /// Static files for the web client
    pub serve_dir: PathBuf,

    /// `host:port` of the player's control socket
    pub player_address: String,

    pub poll_interval: Duration,

    /// How long to wait for the player to answer a command
    pub reply_deadline: Duration,

    /// How long to wait for the player to accept a connection
    pub connect_timeout: Duration,

    pub queue_capacity: usize,

    pub playlist_file: PathBuf,

    pub save_cooldown: Duration,
}

/// Player Relay - web control for a networked media player
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Directory with the web client's static files
    #[arg(env = "RELAY_SERVE_DIR", default_value = "./public")]
    pub serve_dir: PathBuf,

    /// HTTP port to listen on
    #[arg(env = "RELAY_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Address of the player's control socket
    #[arg(long, env = "RELAY_PLAYER", default_value = "127.0.0.1:33333")]
    pub player: String,

    /// How often to ask the player for its state, in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub poll_interval_ms: u64,

    /// How long to wait for a reply to each command, in milliseconds
    #[arg(long, default_value_t = 50)]
    pub reply_timeout_ms: u64,

    /// How long to wait for the player to accept a connection, in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub connect_timeout_ms: u64,

    /// Commands that may wait for the player before submitters block
    #[arg(long, default_value_t = 100)]
    pub queue_capacity: usize,

    /// Where playlists are kept
    #[arg(long, env = "RELAY_PLAYLIST_FILE", default_value = "playlists.json")]
    pub playlist_file: PathBuf,

    /// Minimum time between two saves, in seconds
    #[arg(long, default_value_t = 300)]
    pub save_cooldown_secs: u64,
}

impl Config {
    /// Create configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ServerError> {
        if args.poll_interval_ms == 0 {
            return Err(ServerError::config("poll interval must be at least 1 ms"));
        }
        if args.connect_timeout_ms == 0 {
            return Err(ServerError::config("connect timeout must be at least 1 ms"));
        }
        if args.queue_capacity == 0 {
            return Err(ServerError::config("queue capacity must be at least 1"));
        }
        let player_address = args.player.trim().to_string();
        if player_address.is_empty() {
            return Err(ServerError::config("player address is empty"));
        }

        Ok(Self {
            port: args.port,
            serve_dir: args.serve_dir,
            player_address,
            poll_interval: Duration::from_millis(args.poll_interval_ms),
            reply_deadline: Duration::from_millis(args.reply_timeout_ms),
            connect_timeout: Duration::from_millis(args.connect_timeout_ms),
            queue_capacity: args.queue_capacity,
            playlist_file: args.playlist_file,
            save_cooldown: Duration::from_secs(args.save_cooldown_secs),
        })
    }

    pub fn listen_address(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}
