//! Speech synthesis and transcription via the vendor's NLS gateway.
//!
//! Both directions authenticate with the short-lived service token from
//! [`TokenCache`], passed in the `X-NLS-Token` header. Synthesis answers with
//! raw audio bytes on success and a JSON error body on failure, so the
//! content type decides how the response is read. Transcription takes raw
//! PCM; browser recordings arrive as WAV, whose 44-byte header is stripped
//! before upload.

use std::sync::Arc;

use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tracing::debug;

use crate::error::GatewayError;
use crate::token::TokenCache;

/// NLS status code for a successful transcription.
const ASR_SUCCESS_STATUS: i64 = 20_000_000;
/// Canonical WAV header length preceding the PCM samples.
const WAV_HEADER_LEN: usize = 44;
/// Upload format and rate the recorder produces.
const ASR_FORMAT: &str = "pcm";
const ASR_SAMPLE_RATE: u32 = 16_000;

/// Client for the vendor's speech gateway (TTS and ASR).
#[derive(Clone)]
pub struct SpeechClient {
    client: reqwest::Client,
    tokens: Arc<TokenCache>,
    appkey: String,
    tts_endpoint: String,
    asr_endpoint: String,
    default_voice: String,
    default_format: String,
}

/// Synthesized audio plus the content type to serve it under.
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Result of a transcription call.
#[derive(Debug, Clone)]
pub struct Transcription {
    pub task_id: Option<String>,
    /// Recognized text. Empty when the audio held no speech.
    pub text: String,
}

impl SpeechClient {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: reqwest::Client,
        tokens: Arc<TokenCache>,
        appkey: impl Into<String>,
        tts_endpoint: impl Into<String>,
        asr_endpoint: impl Into<String>,
        default_voice: impl Into<String>,
        default_format: impl Into<String>,
    ) -> Self {
        Self {
            client,
            tokens,
            appkey: appkey.into(),
            tts_endpoint: tts_endpoint.into(),
            asr_endpoint: asr_endpoint.into(),
            default_voice: default_voice.into(),
            default_format: default_format.into(),
        }
    }

    /// Synthesize `text` to audio. `voice` and `format` fall back to the
    /// configured defaults.
    pub async fn synthesize(
        &self,
        text: &str,
        voice: Option<&str>,
        format: Option<&str>,
    ) -> Result<SynthesizedAudio, GatewayError> {
        if text.trim().is_empty() {
            return Err(GatewayError::InvalidRequest(
                "text must not be empty".to_string(),
            ));
        }

        let voice = voice.unwrap_or(&self.default_voice);
        let format = format.unwrap_or(&self.default_format);
        let token = self.tokens.get().await?;
        debug!(voice, format, chars = text.chars().count(), "synthesis request");

        let resp = self
            .client
            .post(&self.tts_endpoint)
            .header("X-NLS-Token", token)
            .json(&serde_json::json!({
                "appkey": self.appkey,
                "text": text,
                "format": format,
                "voice": voice,
            }))
            .send()
            .await?;

        let status = resp.status();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        // The gateway signals failure with a JSON body; audio only ever
        // arrives under an audio content type.
        if !status.is_success() || content_type.contains("application/json") {
            let body = resp.text().await?;
            return Err(GatewayError::UpstreamFailed {
                message: vendor_error_message(&body),
            });
        }

        let bytes = resp.bytes().await?.to_vec();
        if bytes.is_empty() {
            return Err(GatewayError::UnexpectedPayload {
                context: "synthesis",
                detail: "empty audio body".to_string(),
            });
        }
        Ok(SynthesizedAudio {
            bytes,
            content_type: if content_type.is_empty() {
                "audio/mpeg".to_string()
            } else {
                content_type
            },
        })
    }

    /// Transcribe recorded audio. WAV input is reduced to its PCM samples;
    /// anything else is uploaded as-is.
    pub async fn transcribe(&self, audio: &[u8]) -> Result<Transcription, GatewayError> {
        let pcm = strip_wav_header(audio)?;
        if pcm.is_empty() {
            return Err(GatewayError::InvalidRequest(
                "audio payload holds no samples".to_string(),
            ));
        }

        let token = self.tokens.get().await?;
        let url = format!(
            "{}?appkey={}&format={}&sample_rate={}",
            self.asr_endpoint, self.appkey, ASR_FORMAT, ASR_SAMPLE_RATE
        );
        debug!(bytes = pcm.len(), "transcription request");

        let resp = self
            .client
            .post(&url)
            .header("X-NLS-Token", token)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(pcm.to_vec())
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(GatewayError::UpstreamFailed {
                message: format!("speech endpoint returned {status}: {}", vendor_error_message(&body)),
            });
        }
        decode_transcription_payload(&body)
    }
}

/// Drop the 44-byte WAV container header when present. Raw PCM (no RIFF
/// magic) passes through untouched. A RIFF fragment shorter than its own
/// header is refused; uploading it as samples would feed the vendor header
/// bytes.
fn strip_wav_header(audio: &[u8]) -> Result<&[u8], GatewayError> {
    if !audio.starts_with(b"RIFF") {
        return Ok(audio);
    }
    if audio.len() < WAV_HEADER_LEN {
        return Err(GatewayError::InvalidRequest(
            "WAV payload is shorter than its own header".to_string(),
        ));
    }
    Ok(&audio[WAV_HEADER_LEN..])
}

// ─── Payload decoding ────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct AsrEnvelope {
    task_id: Option<String>,
    result: Option<String>,
    status: Option<i64>,
    message: Option<String>,
}

fn decode_transcription_payload(body: &str) -> Result<Transcription, GatewayError> {
    let envelope: AsrEnvelope =
        serde_json::from_str(body).map_err(|e| GatewayError::UnexpectedPayload {
            context: "transcription",
            detail: format!("not valid JSON: {e}"),
        })?;

    let status = envelope.status.ok_or(GatewayError::UnexpectedPayload {
        context: "transcription",
        detail: "missing status".to_string(),
    })?;
    if status != ASR_SUCCESS_STATUS {
        return Err(GatewayError::UpstreamFailed {
            message: envelope
                .message
                .unwrap_or_else(|| format!("transcription rejected with status {status}")),
        });
    }

    let text = envelope.result.ok_or(GatewayError::UnexpectedPayload {
        context: "transcription",
        detail: "status is success but result is missing".to_string(),
    })?;
    Ok(Transcription {
        task_id: envelope.task_id,
        text,
    })
}

#[derive(Deserialize)]
struct SpeechErrorBody {
    message: Option<String>,
    error_message: Option<String>,
    status: Option<i64>,
}

/// Pull a readable message out of an NLS error body, falling back to the raw
/// text when it is not the documented JSON shape.
fn vendor_error_message(body: &str) -> String {
    if let Ok(err) = serde_json::from_str::<SpeechErrorBody>(body) {
        if let Some(message) = err.message.or(err.error_message) {
            return match err.status {
                Some(status) => format!("{message} (status {status})"),
                None => message,
            };
        }
    }
    body.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{Clock, IssuedToken, TokenIssuer};
    use async_trait::async_trait;

    struct FrozenClock;

    impl Clock for FrozenClock {
        fn now_ms(&self) -> i64 {
            0
        }
    }

    struct RefusingIssuer;

    #[async_trait]
    impl TokenIssuer for RefusingIssuer {
        async fn issue(&self) -> Result<IssuedToken, GatewayError> {
            Err(GatewayError::AuthToken("issuer should not be called".to_string()))
        }
    }

    fn client() -> SpeechClient {
        let tokens = Arc::new(TokenCache::new(Arc::new(RefusingIssuer), Arc::new(FrozenClock)));
        SpeechClient::new(
            reqwest::Client::new(),
            tokens,
            "test-appkey",
            "https://nls.example/stream/v1/tts",
            "https://nls.example/stream/v1/asr",
            "xiaoyun",
            "mp3",
        )
    }

    #[test]
    fn wav_header_is_stripped() {
        let mut wav = b"RIFF".to_vec();
        wav.extend(std::iter::repeat(0u8).take(40)); // rest of the header
        wav.extend_from_slice(&[1, 2, 3, 4]);
        assert_eq!(strip_wav_header(&wav).unwrap(), &[1, 2, 3, 4]);
    }

    #[test]
    fn raw_pcm_passes_through() {
        let pcm = [9u8, 8, 7, 6];
        assert_eq!(strip_wav_header(&pcm).unwrap(), &pcm);
    }

    #[test]
    fn header_only_wav_yields_no_samples() {
        let mut wav = b"RIFF".to_vec();
        wav.extend(std::iter::repeat(0u8).take(40));
        assert!(strip_wav_header(&wav).unwrap().is_empty());
    }

    #[test]
    fn truncated_wav_header_is_refused() {
        let wav = b"RIFF\x24\x00\x00\x00WAVE";
        let err = strip_wav_header(wav).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidRequest(_)), "{err}");
    }

    #[test]
    fn decode_successful_transcription() {
        let body = r#"{"task_id":"t1","result":"hello world","status":20000000,"message":"SUCCESS"}"#;
        let t = decode_transcription_payload(body).unwrap();
        assert_eq!(t.text, "hello world");
        assert_eq!(t.task_id.as_deref(), Some("t1"));
    }

    #[test]
    fn decode_allows_empty_result_for_silence() {
        let body = r#"{"task_id":"t1","result":"","status":20000000,"message":"SUCCESS"}"#;
        assert_eq!(decode_transcription_payload(body).unwrap().text, "");
    }

    #[test]
    fn decode_error_status_keeps_vendor_message() {
        let body = r#"{"task_id":"t1","status":41010101,"message":"unsupported sample rate"}"#;
        let err = decode_transcription_payload(body).unwrap_err();
        assert!(matches!(err, GatewayError::UpstreamFailed { .. }));
        assert!(err.to_string().contains("unsupported sample rate"));
    }

    #[test]
    fn decode_rejects_missing_status() {
        let err = decode_transcription_payload(r#"{"result":"hi"}"#).unwrap_err();
        assert!(matches!(
            err,
            GatewayError::UnexpectedPayload {
                context: "transcription",
                ..
            }
        ));
    }

    #[test]
    fn error_message_prefers_json_fields() {
        assert_eq!(
            vendor_error_message(r#"{"status":40000001,"message":"token expired"}"#),
            "token expired (status 40000001)"
        );
        assert_eq!(
            vendor_error_message(r#"{"error_message":"bad appkey"}"#),
            "bad appkey"
        );
        assert_eq!(vendor_error_message("<xml>err</xml>"), "<xml>err</xml>");
    }

    #[tokio::test]
    async fn empty_text_is_rejected_before_token_fetch() {
        let err = client().synthesize("  ", None, None).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidRequest(_)), "{err}");
    }

    #[tokio::test]
    async fn empty_audio_is_rejected_before_token_fetch() {
        let err = client().transcribe(&[]).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidRequest(_)), "{err}");
    }

    #[tokio::test]
    async fn truncated_wav_is_rejected_before_token_fetch() {
        let err = client().transcribe(b"RIFFWAVE").await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidRequest(_)), "{err}");
    }
}
