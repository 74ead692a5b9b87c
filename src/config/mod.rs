use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::UdpSocket;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub jobs: JobsConfig,

    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Externally reachable base URL used to build download/share links.
    /// When unset, the outbound interface address is probed at startup.
    #[serde(default)]
    pub public_url: Option<String>,

    /// Optional directory with the web UI, served as-is at `/`.
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// One subdirectory per job, holding `meta.json` and the artifact files.
    #[serde(default = "default_downloads_dir")]
    pub downloads_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobsConfig {
    /// Number of pipeline workers consuming the job queue.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Capacity of the bounded job queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_extract_timeout")]
    pub extract_timeout_secs: u64,

    #[serde(default = "default_transcode_timeout")]
    pub transcode_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(default = "default_yt_dlp")]
    pub yt_dlp: String,

    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: None,
            static_dir: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            downloads_dir: default_downloads_dir(),
        }
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            extract_timeout_secs: default_extract_timeout(),
            transcode_timeout_secs: default_transcode_timeout(),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            yt_dlp: default_yt_dlp(),
            ffmpeg: default_ffmpeg(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_downloads_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    64
}

fn default_extract_timeout() -> u64 {
    1800
}

fn default_transcode_timeout() -> u64 {
    600
}

fn default_yt_dlp() -> String {
    "yt-dlp".to_string()
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./config.toml",
        "./mediafetch.toml",
        "~/.config/mediafetch/config.toml",
        "/etc/mediafetch/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    if config.jobs.workers == 0 {
        anyhow::bail!("At least one pipeline worker is required");
    }

    if config.jobs.queue_capacity == 0 {
        anyhow::bail!("Job queue capacity cannot be 0");
    }

    if let Some(ref url) = config.server.public_url {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            anyhow::bail!("public_url must start with http:// or https://");
        }
    }

    Ok(())
}

/// Resolve the base URL used to construct all absolute links returned to
/// clients. Resolved exactly once at startup; the result is passed explicitly
/// to the components that need it.
pub fn resolve_public_url(config: &Config) -> String {
    if let Some(ref url) = config.server.public_url {
        return url.trim_end_matches('/').to_string();
    }

    // Connecting a UDP socket sends no packets; it only selects the outbound
    // interface, whose address is what clients on the LAN can reach.
    let probed = UdpSocket::bind("0.0.0.0:0").and_then(|socket| {
        socket.connect("8.8.8.8:80")?;
        socket.local_addr()
    });

    match probed {
        Ok(addr) => format!("http://{}:{}", addr.ip(), config.server.port),
        Err(_) => format!("http://127.0.0.1:{}", config.server.port),
    }
}
