pub mod config;
pub mod error;
pub mod rest;
pub mod signing;
pub mod speech;
pub mod token;
pub mod translate;
pub mod video;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

use config::GatewayConfig;
use signing::Signer;
use speech::SpeechClient;
use token::{HttpTokenIssuer, SystemClock, TokenCache};
use translate::TranslateClient;
use video::{PollConfig, VideoClient};

/// Shared application state passed to every route handler.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<GatewayConfig>,
    pub video: VideoClient,
    pub translate: TranslateClient,
    pub speech: SpeechClient,
    pub started_at: Instant,
}

impl AppContext {
    /// Wire the vendor clients from config.
    ///
    /// One reqwest client, carrying the configured request timeout, is shared
    /// by every consumer. Credentials may be absent; the gateway still starts
    /// and the affected routes surface upstream auth failures.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        let creds = &config.vendor;
        let signer = Signer::new(
            creds.access_key_id.clone().unwrap_or_default(),
            creds.access_key_secret.clone().unwrap_or_default(),
        );
        let issuer = HttpTokenIssuer::new(
            http.clone(),
            config.endpoints.token.clone(),
            creds.access_key_id.clone().unwrap_or_default(),
            creds.access_key_secret.clone().unwrap_or_default(),
        );
        let tokens = Arc::new(TokenCache::new(Arc::new(issuer), Arc::new(SystemClock)));

        let video = VideoClient::new(
            http.clone(),
            creds.dashscope_api_key.clone().unwrap_or_default(),
            config.endpoints.video_submit.clone(),
            config.endpoints.video_tasks.clone(),
            config.video.model.clone(),
            config.video.default_size.clone(),
        );
        let translate =
            TranslateClient::new(http.clone(), signer, config.endpoints.translate.clone());
        let speech = SpeechClient::new(
            http,
            tokens,
            creds.nls_appkey.clone().unwrap_or_default(),
            config.endpoints.tts.clone(),
            config.endpoints.asr.clone(),
            config.speech.voice.clone(),
            config.speech.format.clone(),
        );

        Ok(Self {
            config: Arc::new(config),
            video,
            translate,
            speech,
            started_at: Instant::now(),
        })
    }

    /// Poll budget built from the configured knobs.
    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            max_polls: self.config.video.poll_max,
            interval: Duration::from_secs(self.config.video.poll_interval_secs),
        }
    }
}
