//! sentinelmc/src/config.rs
//! Command-line configuration surface, mirroring the original `golem`
//! binary's flag names and defaults.

use clap::Parser;

/// Lazy-activation reverse proxy for a Minecraft Java Edition server.
#[derive(Parser, Debug, Clone)]
#[command(name = "sentinelmc", version, about)]
pub struct Config {
    /// TCP address the proxy listens on for client connections.
    #[arg(long, default_value = ":25565")]
    pub proxy_addr: String,

    /// TCP address of the real Minecraft server to bridge to once running.
    #[arg(long, default_value = ":25566")]
    pub server_addr: String,

    /// Whitespace-split argv used to launch the server. Empty disables
    /// autostart/stop and selects the dummy controller.
    #[arg(long, default_value = "")]
    pub server_start: String,

    /// Working directory for the spawned server process.
    #[arg(long, default_value = "")]
    pub server_directory: String,

    /// Seconds to wait after the last player disconnects before stopping
    /// the server. Only meaningful when `server_start` is non-empty.
    #[arg(long, default_value_t = 60)]
    pub stop_timeout: u64,

    /// Minecraft version name reported in the status response.
    #[arg(long, default_value = "1.17.1")]
    pub version_name: String,

    /// Minecraft protocol number reported in the status response.
    #[arg(long, default_value_t = 756)]
    pub version_protocol: i32,

    /// Maximum player count reported in the status response.
    #[arg(long, default_value_t = 20)]
    pub players_max: i32,

    /// Log every byte read/written on the client-side framed stream.
    #[arg(long, default_value_t = false)]
    pub debug: bool,

    /// Substring pair a stdout line must contain to be treated as the
    /// server's readiness marker. Vendor-specific and locale-fragile by
    /// nature, so it is exposed here rather than hard-coded.
    #[arg(long, num_args = 2, default_values = ["INFO", "Done"])]
    pub done_markers: Vec<String>,
}

impl Config {
    /// Whether autostart/stop is enabled, i.e. a real server start
    /// command was configured.
    pub fn autostart_enabled(&self) -> bool {
        !self.server_start.trim().is_empty()
    }

    /// The tokenized argv for launching the server.
    pub fn server_argv(&self) -> Vec<String> {
        self.server_start
            .split_whitespace()
            .map(str::to_owned)
            .collect()
    }

    /// The configured readiness marker pair, falling back to the
    /// original `("INFO", "Done")` default if malformed.
    pub fn done_markers(&self) -> (String, String) {
        match self.done_markers.as_slice() {
            [a, b] => (a.clone(), b.clone()),
            _ => ("INFO".to_string(), "Done".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_server_start_disables_autostart() {
        let cfg = Config::parse_from(["sentinelmc"]);
        assert!(!cfg.autostart_enabled());
        assert!(cfg.server_argv().is_empty());
    }

    #[test]
    fn server_start_is_whitespace_tokenized() {
        let cfg = Config::parse_from(["sentinelmc", "--server-start", "java -jar server.jar"]);
        assert!(cfg.autostart_enabled());
        assert_eq!(cfg.server_argv(), vec!["java", "-jar", "server.jar"]);
    }

    #[test]
    fn default_done_markers() {
        let cfg = Config::parse_from(["sentinelmc"]);
        assert_eq!(cfg.done_markers(), ("INFO".to_string(), "Done".to_string()));
    }
}
