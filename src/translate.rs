//! Text translation through the vendor's signed RPC endpoint.
//!
//! Translation is the one capability that still uses the canonical signing
//! scheme: every request is a GET whose query string is built and signed by
//! [`Signer`](crate::signing::Signer). The vendor reports errors in-band with
//! a `Code`/`Message` pair, so a 200 response still has to be inspected.

use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::GatewayError;
use crate::signing::Signer;

const ACTION: &str = "TranslateGeneral";
const API_VERSION: &str = "2018-10-12";
const SCENE: &str = "general";

/// A completed translation, as served to API clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Translation {
    pub translated: String,
    /// Vendor-reported word count, passed through verbatim when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub word_count: Option<String>,
}

/// Client for the vendor's machine-translation RPC.
#[derive(Clone)]
pub struct TranslateClient {
    client: reqwest::Client,
    signer: Signer,
    endpoint: String,
}

impl TranslateClient {
    pub fn new(client: reqwest::Client, signer: Signer, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            signer,
            endpoint: endpoint.into(),
        }
    }

    /// Translate `text` between the given language codes.
    pub async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<Translation, GatewayError> {
        if text.trim().is_empty() {
            return Err(GatewayError::InvalidRequest(
                "text must not be empty".to_string(),
            ));
        }

        let signed = self
            .signer
            .sign("GET", &self.request_parameters(text, source, target))?;
        let url = signed.url(&self.endpoint);
        debug!(source, target, chars = text.chars().count(), "translation request");

        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(GatewayError::UpstreamFailed {
                message: format!("translation endpoint returned {status}: {body}"),
            });
        }
        decode_translation_payload(&body)
    }

    /// Action-specific parameters. The fresh nonce and timestamp make each
    /// call's signature unique; the signer adds the auth parameters on top.
    fn request_parameters(&self, text: &str, source: &str, target: &str) -> BTreeMap<String, String> {
        let now = Utc::now();
        [
            ("Action", ACTION.to_string()),
            ("Format", "JSON".to_string()),
            ("Version", API_VERSION.to_string()),
            ("Scene", SCENE.to_string()),
            ("SourceLanguage", source.to_string()),
            ("TargetLanguage", target.to_string()),
            ("SourceText", text.to_string()),
            ("SignatureNonce", now.timestamp_millis().to_string()),
            (
                "Timestamp",
                now.to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}

// ─── Payload decoding ────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct TranslationEnvelope {
    #[serde(rename = "Code")]
    code: Option<serde_json::Value>,
    #[serde(rename = "Message")]
    message: Option<String>,
    #[serde(rename = "Data")]
    data: Option<TranslationData>,
}

#[derive(Deserialize)]
struct TranslationData {
    #[serde(rename = "Translated")]
    translated: Option<String>,
    #[serde(rename = "WordCount")]
    word_count: Option<String>,
}

/// The vendor's `Code` arrives as a string in practice, but has been seen as
/// a bare number too. Normalize before comparing.
fn code_as_string(code: &serde_json::Value) -> String {
    match code {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn decode_translation_payload(body: &str) -> Result<Translation, GatewayError> {
    let envelope: TranslationEnvelope =
        serde_json::from_str(body).map_err(|e| GatewayError::UnexpectedPayload {
            context: "translation",
            detail: format!("not valid JSON: {e}"),
        })?;

    if let Some(code) = &envelope.code {
        let code = code_as_string(code);
        if code != "200" {
            return Err(GatewayError::UpstreamFailed {
                message: envelope
                    .message
                    .unwrap_or_else(|| format!("translation rejected with code {code}")),
            });
        }
    }

    let data = envelope.data.ok_or(GatewayError::UnexpectedPayload {
        context: "translation",
        detail: "missing Data object".to_string(),
    })?;
    let translated = data.translated.ok_or(GatewayError::UnexpectedPayload {
        context: "translation",
        detail: "missing Data.Translated".to_string(),
    })?;

    Ok(Translation {
        translated,
        word_count: data.word_count,
    })
}
