use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Largest accepted upload body in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

fn default_max_upload_bytes() -> usize {
    512 * 1024 * 1024
}

/// Conversion engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Parent directory of the per-request workspaces.
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,
    /// Where converted files are placed.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Where uploaded source files are stored.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    /// Worker pool size for blocking library calls (0 = host CPU count).
    #[serde(default)]
    pub max_workers: usize,
    /// Timeout tier for document, image, archive and rasterization tools.
    #[serde(default = "default_document_timeout")]
    pub document_timeout_secs: u64,
    /// Timeout tier for audio/video transcoding.
    #[serde(default = "default_media_timeout")]
    pub media_timeout_secs: u64,
    /// Maximum length of diagnostic text (e.g. tool stderr) included in errors.
    #[serde(default = "default_diagnostic_limit")]
    pub diagnostic_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workspace_root: default_workspace_root(),
            output_dir: default_output_dir(),
            upload_dir: default_upload_dir(),
            max_workers: 0,
            document_timeout_secs: default_document_timeout(),
            media_timeout_secs: default_media_timeout(),
            diagnostic_limit: default_diagnostic_limit(),
        }
    }
}

impl EngineConfig {
    /// Effective worker pool size.
    pub fn worker_count(&self) -> usize {
        if self.max_workers == 0 {
            num_cpus::get().max(1)
        } else {
            self.max_workers
        }
    }
}

fn default_workspace_root() -> PathBuf {
    std::env::temp_dir().join("omniconv-work")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("converted_files")
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_document_timeout() -> u64 {
    120
}

fn default_media_timeout() -> u64 {
    600 // 10 minutes
}

fn default_diagnostic_limit() -> usize {
    300
}

/// External tool overrides. A configured path wins over host discovery.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soffice: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ffmpeg: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magick: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rsvg_convert: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inkscape: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdftoppm: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdftotext: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seven_zip: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub powershell: Option<PathBuf>,
    /// Directories searched in addition to `PATH`.
    #[serde(default)]
    pub extra_search_paths: Vec<PathBuf>,
}
