use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::error;

const DEFAULT_PORT: u16 = 4400;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_TRANSLATE_ENDPOINT: &str = "https://mt.cn-hangzhou.aliyuncs.com";
const DEFAULT_TOKEN_ENDPOINT: &str =
    "https://nls-meta.ap-southeast-1.aliyuncs.com/pop/2018-05-18/tokens";
const DEFAULT_TTS_ENDPOINT: &str =
    "https://nls-gateway-ap-southeast-1.aliyuncs.com/stream/v1/tts";
const DEFAULT_ASR_ENDPOINT: &str =
    "https://nls-gateway-ap-southeast-1.aliyuncs.com/stream/v1/asr";
const DEFAULT_VIDEO_SUBMIT_URL: &str =
    "https://dashscope-intl.aliyuncs.com/api/v1/services/aigc/video-generation/video-synthesis";
const DEFAULT_VIDEO_TASKS_URL: &str = "https://dashscope-intl.aliyuncs.com/api/v1/tasks";

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

// ─── VendorCredentials ────────────────────────────────────────────────────────

/// Vendor credentials (`[vendor]` in config.toml).
///
/// Every field can also come from an environment variable, which wins over
/// the file. Missing credentials do not stop the gateway from starting; the
/// affected routes fail upstream instead.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct VendorCredentials {
    /// RPC access key id (STUDYGATE_ACCESS_KEY_ID env var).
    pub access_key_id: Option<String>,
    /// RPC access key secret (STUDYGATE_ACCESS_KEY_SECRET env var).
    pub access_key_secret: Option<String>,
    /// Bearer key for the generation service (STUDYGATE_DASHSCOPE_API_KEY env var).
    pub dashscope_api_key: Option<String>,
    /// Project appkey for the speech gateway (STUDYGATE_NLS_APPKEY env var).
    pub nls_appkey: Option<String>,
}

// ─── EndpointConfig ───────────────────────────────────────────────────────────

/// Vendor endpoint overrides (`[endpoints]` in config.toml).
///
/// Defaults target the vendor's production regions. Tests point these at a
/// local stub server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Signed translation RPC endpoint.
    pub translate: String,
    /// Token metadata endpoint (issues the speech service token).
    pub token: String,
    /// Speech synthesis endpoint.
    pub tts: String,
    /// Speech recognition endpoint.
    pub asr: String,
    /// Video generation submission endpoint.
    pub video_submit: String,
    /// Video task status base URL; the task id is appended as a path segment.
    pub video_tasks: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            translate: DEFAULT_TRANSLATE_ENDPOINT.to_string(),
            token: DEFAULT_TOKEN_ENDPOINT.to_string(),
            tts: DEFAULT_TTS_ENDPOINT.to_string(),
            asr: DEFAULT_ASR_ENDPOINT.to_string(),
            video_submit: DEFAULT_VIDEO_SUBMIT_URL.to_string(),
            video_tasks: DEFAULT_VIDEO_TASKS_URL.to_string(),
        }
    }
}

// ─── VideoSettings ────────────────────────────────────────────────────────────

/// Video generation settings (`[video]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VideoSettings {
    /// Generation model identifier. Default: "wanx2.1-t2v-turbo".
    pub model: String,
    /// Frame size applied when the request does not set one. Default: "1280*720".
    pub default_size: Option<String>,
    /// Maximum status checks before a wait gives up. Default: 60.
    pub poll_max: u32,
    /// Seconds between status checks. Default: 5.
    pub poll_interval_secs: u64,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            model: "wanx2.1-t2v-turbo".to_string(),
            default_size: Some("1280*720".to_string()),
            poll_max: 60,
            poll_interval_secs: 5,
        }
    }
}

// ─── SpeechSettings ───────────────────────────────────────────────────────────

/// Speech defaults (`[speech]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SpeechSettings {
    /// Synthesis voice. Default: "xiaoyun".
    pub voice: String,
    /// Synthesis output format. Default: "mp3".
    pub format: String,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            voice: "xiaoyun".to_string(),
            format: "mp3".to_string(),
        }
    }
}

// ─── TOML config file ─────────────────────────────────────────────────────────

/// `{data_dir}/config.toml` — all fields are optional overrides.
/// Priority: CLI / env var  >  TOML  >  built-in default.
#[derive(Deserialize, Default)]
struct TomlConfig {
    /// HTTP server port (default: 4400).
    port: Option<u16>,
    /// Bind address (default: "127.0.0.1"; use "0.0.0.0" for LAN access).
    bind_address: Option<String>,
    /// Log level filter string, e.g. "debug", "info,studygate=trace" (default: "info").
    log: Option<String>,
    /// Log output format: "pretty" (default, human-readable) | "json" (structured for log aggregators).
    log_format: Option<String>,
    /// Timeout for each upstream vendor request, in seconds (default: 30).
    request_timeout_secs: Option<u64>,
    /// Vendor credentials (`[vendor]`).
    vendor: Option<VendorCredentials>,
    /// Vendor endpoint overrides (`[endpoints]`).
    endpoints: Option<EndpointConfig>,
    /// Video generation settings (`[video]`).
    video: Option<VideoSettings>,
    /// Speech defaults (`[speech]`).
    speech: Option<SpeechSettings>,
}

fn load_toml(data_dir: &std::path::Path) -> Option<TomlConfig> {
    let path = data_dir.join("config.toml");
    let contents = std::fs::read_to_string(&path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            error!(path = %path.display(), err = %e, "failed to parse config.toml — using defaults");
            None
        }
    }
}

// ─── GatewayConfig ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub port: u16,
    pub bind_address: String,
    pub data_dir: PathBuf,
    pub log: String,
    /// Log output format: "pretty" (default) | "json".
    pub log_format: String,
    /// Timeout applied to every upstream vendor request.
    pub request_timeout: Duration,
    pub vendor: VendorCredentials,
    pub endpoints: EndpointConfig,
    pub video: VideoSettings,
    pub speech: SpeechSettings,
}

impl GatewayConfig {
    /// Build config from CLI/env args + optional TOML file.
    ///
    /// Priority (highest to lowest):
    ///   1. CLI / env — passed as `Some(value)` from clap
    ///   2. TOML file at `{data_dir}/config.toml`
    ///   3. Built-in defaults
    pub fn new(
        port: Option<u16>,
        data_dir: Option<PathBuf>,
        log: Option<String>,
        bind_address: Option<String>,
    ) -> Self {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);

        // Load TOML as the lowest-priority override layer
        let toml = load_toml(&data_dir).unwrap_or_default();

        let port = port.or(toml.port).unwrap_or(DEFAULT_PORT);
        let log = log.or(toml.log).unwrap_or_else(|| "info".to_string());

        let bind_address = bind_address
            .or(std::env::var("STUDYGATE_BIND").ok().filter(|s| !s.is_empty()))
            .or(toml.bind_address)
            .unwrap_or_else(default_bind_address);

        let log_format = std::env::var("STUDYGATE_LOG_FORMAT")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.log_format)
            .unwrap_or_else(|| "pretty".to_string());

        let request_timeout = Duration::from_secs(
            toml.request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        );

        let mut vendor = toml.vendor.unwrap_or_default();
        vendor.access_key_id = std::env::var("STUDYGATE_ACCESS_KEY_ID")
            .ok()
            .filter(|s| !s.is_empty())
            .or(vendor.access_key_id);
        vendor.access_key_secret = std::env::var("STUDYGATE_ACCESS_KEY_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .or(vendor.access_key_secret);
        vendor.dashscope_api_key = std::env::var("STUDYGATE_DASHSCOPE_API_KEY")
            .ok()
            .filter(|s| !s.is_empty())
            .or(vendor.dashscope_api_key);
        vendor.nls_appkey = std::env::var("STUDYGATE_NLS_APPKEY")
            .ok()
            .filter(|s| !s.is_empty())
            .or(vendor.nls_appkey);

        let endpoints = toml.endpoints.unwrap_or_default();
        let video = toml.video.unwrap_or_default();
        let speech = toml.speech.unwrap_or_default();

        Self {
            port,
            bind_address,
            data_dir,
            log,
            log_format,
            request_timeout,
            vendor,
            endpoints,
            video,
            speech,
        }
    }

    /// Names of credentials that are still unset, for the startup warning.
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.vendor.access_key_id.is_none() {
            missing.push("access_key_id");
        }
        if self.vendor.access_key_secret.is_none() {
            missing.push("access_key_secret");
        }
        if self.vendor.dashscope_api_key.is_none() {
            missing.push("dashscope_api_key");
        }
        if self.vendor.nls_appkey.is_none() {
            missing.push("nls_appkey");
        }
        missing
    }
}

fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        // ~/Library/Application Support/studygate
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("studygate");
        }
    }
    #[cfg(target_os = "linux")]
    {
        // $XDG_DATA_HOME/studygate or ~/.local/share/studygate
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            return PathBuf::from(xdg).join("studygate");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("studygate");
        }
    }
    #[cfg(target_os = "windows")]
    {
        // %APPDATA%\studygate
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("studygate");
        }
    }
    // Fallback
    PathBuf::from(".studygate")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &std::path::Path, contents: &str) {
        std::fs::write(dir.join("config.toml"), contents).unwrap();
    }

    #[test]
    fn defaults_apply_without_a_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = GatewayConfig::new(None, Some(dir.path().to_path_buf()), None, None);
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.bind_address, "127.0.0.1");
        assert_eq!(cfg.request_timeout, Duration::from_secs(30));
        assert_eq!(cfg.video.model, "wanx2.1-t2v-turbo");
        assert_eq!(cfg.video.poll_max, 60);
        assert_eq!(cfg.speech.voice, "xiaoyun");
        assert!(cfg.endpoints.translate.starts_with("https://mt."));
    }

    #[test]
    fn toml_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            r#"
port = 9100
request_timeout_secs = 10

[video]
model = "wanx2.2-t2v-plus"
poll_interval_secs = 2

[endpoints]
video_tasks = "http://127.0.0.1:9999/api/v1/tasks"
"#,
        );
        let cfg = GatewayConfig::new(None, Some(dir.path().to_path_buf()), None, None);
        assert_eq!(cfg.port, 9100);
        assert_eq!(cfg.request_timeout, Duration::from_secs(10));
        assert_eq!(cfg.video.model, "wanx2.2-t2v-plus");
        assert_eq!(cfg.video.poll_interval_secs, 2);
        assert_eq!(cfg.endpoints.video_tasks, "http://127.0.0.1:9999/api/v1/tasks");
    }

    #[test]
    fn cli_args_beat_toml() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "port = 9100\nlog = \"debug\"\n");
        let cfg = GatewayConfig::new(
            Some(9200),
            Some(dir.path().to_path_buf()),
            Some("trace".to_string()),
            None,
        );
        assert_eq!(cfg.port, 9200);
        assert_eq!(cfg.log, "trace");
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "[video]\nmodel = \"other-model\"\n");
        let cfg = GatewayConfig::new(None, Some(dir.path().to_path_buf()), None, None);
        assert_eq!(cfg.video.model, "other-model");
        assert_eq!(cfg.video.poll_max, 60, "unset fields keep their defaults");
        assert_eq!(cfg.video.default_size.as_deref(), Some("1280*720"));
    }

    #[test]
    fn malformed_toml_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "port = \"not a number");
        let cfg = GatewayConfig::new(None, Some(dir.path().to_path_buf()), None, None);
        assert_eq!(cfg.port, DEFAULT_PORT);
    }

    #[test]
    fn missing_credentials_are_reported_by_name() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            "[vendor]\naccess_key_id = \"ak\"\naccess_key_secret = \"sk\"\n",
        );
        let cfg = GatewayConfig::new(None, Some(dir.path().to_path_buf()), None, None);
        let missing = cfg.missing_credentials();
        assert!(!missing.contains(&"access_key_id"));
        assert!(missing.contains(&"dashscope_api_key"));
        assert!(missing.contains(&"nls_appkey"));
    }
}
