// SPDX-License-Identifier: MIT
//! Canonical request signing for the vendor's RPC-style endpoints.
//!
//! The vendor authenticates RPC calls with an HMAC-SHA1 signature over a
//! canonicalized query string. The rules are strict and easy to get subtly
//! wrong: parameters sorted by key, a custom percent-encoding (space is
//! `%20`, never `+`; `*` is `%2A`; `~` stays bare), and a string-to-sign of
//! the form `VERB&%2F&<encoded query>`. Signing is pure: the same method and
//! parameters always produce the same signature. `SignatureNonce` and
//! `Timestamp` are ordinary parameters supplied by the caller, so tests can
//! pin them.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha1::Sha1;

use crate::error::GatewayError;

type HmacSha1 = Hmac<Sha1>;

// ─── Percent-encoding ────────────────────────────────────────────────────────

/// Everything except the unreserved characters `A-Z a-z 0-9 - _ . ~` gets
/// escaped, with uppercase hex digits. This is the vendor's exact rule set:
/// space becomes `%20` (never `+`), `*` becomes `%2A`, `~` passes through.
const VENDOR_QUERY_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encode a single key or value under the vendor's rules.
pub fn vendor_encode(raw: &str) -> String {
    utf8_percent_encode(raw, VENDOR_QUERY_SET).to_string()
}

/// Build the canonicalized query string: keys in ascending byte order, each
/// key and value encoded, pairs joined with `&`. An empty map canonicalizes
/// to the empty string.
pub fn canonical_query(parameters: &BTreeMap<String, String>) -> String {
    parameters
        .iter()
        .map(|(k, v)| format!("{}={}", vendor_encode(k), vendor_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Assemble the string-to-sign: `{VERB}&{encode("/")}&{encode(query)}`.
///
/// The resource path is always `/` for the vendor's RPC endpoints, so the
/// middle segment is the constant `%2F`.
pub fn string_to_sign(method: &str, canonical: &str) -> String {
    format!("{}&%2F&{}", method, vendor_encode(canonical))
}

fn hmac_sha1_base64(key: &[u8], message: &[u8]) -> Result<String, GatewayError> {
    let mut mac = HmacSha1::new_from_slice(key)
        .map_err(|e| GatewayError::Signing(format!("invalid HMAC key: {e}")))?;
    mac.update(message);
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

// ─── Signer ──────────────────────────────────────────────────────────────────

/// Signs vendor RPC requests with the canonical HMAC-SHA1 scheme.
///
/// Holds the long-lived access key pair. Cloning is cheap enough that
/// consumers keep their own copy rather than share a reference.
#[derive(Clone)]
pub struct Signer {
    access_key_id: String,
    access_key_secret: String,
}

impl Signer {
    pub fn new(access_key_id: impl Into<String>, access_key_secret: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            access_key_secret: access_key_secret.into(),
        }
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// Sign `parameters` for an RPC call issued with the given HTTP `method`.
    ///
    /// The signer owns the authentication parameters: `AccessKeyId`,
    /// `SignatureMethod` and `SignatureVersion` are inserted here and
    /// override any caller-supplied values. Everything else, including
    /// `SignatureNonce` and `Timestamp`, comes from the caller.
    pub fn sign(
        &self,
        method: &str,
        parameters: &BTreeMap<String, String>,
    ) -> Result<SignedRequest, GatewayError> {
        let mut all = parameters.clone();
        all.insert("AccessKeyId".to_string(), self.access_key_id.clone());
        all.insert("SignatureMethod".to_string(), "HMAC-SHA1".to_string());
        all.insert("SignatureVersion".to_string(), "1.0".to_string());

        let canonical = canonical_query(&all);
        let to_sign = string_to_sign(method, &canonical);
        // The signing key is the secret with a trailing `&`, per the vendor
        // scheme. Omitting the `&` is the classic mistake.
        let key = format!("{}&", self.access_key_secret);
        let signature = hmac_sha1_base64(key.as_bytes(), to_sign.as_bytes())?;

        Ok(SignedRequest {
            parameters: all,
            signature,
        })
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the secret.
        f.debug_struct("Signer")
            .field("access_key_id", &self.access_key_id)
            .finish_non_exhaustive()
    }
}

// ─── Signed request ──────────────────────────────────────────────────────────

/// A fully signed request: the complete parameter map plus the computed
/// base64 signature.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    parameters: BTreeMap<String, String>,
    signature: String,
}

impl SignedRequest {
    /// The base64 HMAC-SHA1 signature, unencoded.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// All signed parameters, in canonical order.
    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }

    /// The final query string: the canonical query with `Signature` appended
    /// as the last pair, its value percent-encoded (base64 output contains
    /// `+`, `/` and `=`).
    pub fn query_string(&self) -> String {
        format!(
            "{}&Signature={}",
            canonical_query(&self.parameters),
            vendor_encode(&self.signature)
        )
    }

    /// Complete request URL against `endpoint`, using the vendor's `/?query`
    /// form.
    pub fn url(&self, endpoint: &str) -> String {
        format!("{}/?{}", endpoint.trim_end_matches('/'), self.query_string())
    }
}
