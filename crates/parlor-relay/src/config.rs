//! Command-line / environment configuration.

use std::path::PathBuf;

use clap::Parser;

use crate::router::RelayOptions;

#[derive(Debug, Clone, Parser)]
#[command(name = "parlor-relay", version, about = "WebSocket chat relay with whispers and IP bans")]
pub struct Config {
    /// Address to listen on.
    #[arg(long, env = "PARLOR_LISTEN_ADDR", default_value = "0.0.0.0:3000")]
    pub listen_addr: String,

    /// JSON file holding banned origin addresses.
    #[arg(long, env = "PARLOR_BAN_FILE", default_value = "bans.json")]
    pub ban_file: PathBuf,

    /// Display name allowed to ban and unban.
    #[arg(long, env = "PARLOR_ADMIN_NAME", default_value = "admin")]
    pub admin_name: String,

    /// Longest accepted display name, in characters.
    #[arg(long, env = "PARLOR_MAX_NAME_LEN", default_value_t = 32)]
    pub max_name_len: usize,

    /// Largest accepted WebSocket message, in bytes (images travel inline).
    #[arg(long, env = "PARLOR_MAX_FRAME_BYTES", default_value_t = 5 * 1024 * 1024)]
    pub max_frame_bytes: usize,

    /// Take the client address from X-Forwarded-For (only behind a proxy you control).
    #[arg(long, env = "PARLOR_TRUST_FORWARDED_FOR")]
    pub trust_forwarded_for: bool,

    /// Emit logs as JSON lines.
    #[arg(long, env = "PARLOR_LOG_JSON")]
    pub log_json: bool,
}

impl Config {
    pub fn relay_options(&self) -> RelayOptions {
        RelayOptions {
            max_name_len: self.max_name_len,
            max_frame_bytes: self.max_frame_bytes,
            trust_forwarded_for: self.trust_forwarded_for,
        }
    }
}
