//! Compact, URL-safe encoding of a whole state for share links.
//!
//! Current format: JSON, raw DEFLATE, then unpadded URL-safe base64. Older
//! links are still readable: a percent-encoded copy of the current format,
//! and plain (uncompressed) base64 JSON.

use std::io::{Read, Write};

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::{RaciError, RaciState, Result};

/// Query-string key carrying the payload.
pub const SHARE_PARAM: &str = "share";
/// Longest payload we hand out, so links survive URL length limits.
pub const MAX_SHARE_LEN: usize = 8000;
/// Upper bound on inflated JSON, against decompression bombs.
const MAX_DECODED_BYTES: u64 = 4 * 1024 * 1024;

pub fn compress(state: &RaciState) -> Result<String> {
    let json = serde_json::to_vec(state)?;
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(&json)?;
    let deflated = encoder.finish()?;
    let encoded = URL_SAFE_NO_PAD.encode(deflated);

    if encoded.len() > MAX_SHARE_LEN {
        return Err(RaciError::ShareTooLarge {
            len: encoded.len(),
            max: MAX_SHARE_LEN,
        });
    }
    debug!(json_bytes = json.len(), encoded = encoded.len(), "compressed state");
    Ok(encoded)
}

pub fn decompress(input: &str) -> Result<RaciState> {
    let value = decode_value(input.trim())
        .ok_or_else(|| RaciError::ShareDecode("payload is not in a recognised format".into()))?;
    serde_json::from_value(value).map_err(|e| RaciError::ShareDecode(e.to_string()))
}

/// Like [`decompress`], but checks the basic shape first and returns `None`
/// instead of an error.
pub fn parse_shared_state(input: &str) -> Option<RaciState> {
    let value = decode_value(input.trim())?;
    let shaped = value.get("roles").is_some_and(Value::is_array)
        && value.get("tasks").is_some_and(Value::is_array);
    if !shaped {
        warn!("shared state is missing roles or tasks");
        return None;
    }
    serde_json::from_value(value)
        .inspect_err(|e| warn!("shared state did not deserialize: {}", e))
        .ok()
}

/// `base_url` with the compressed state under [`SHARE_PARAM`].
pub fn share_url(base_url: &str, state: &RaciState) -> Result<String> {
    let payload = compress(state)?;
    let mut url = Url::parse(base_url).map_err(|e| RaciError::InvalidUrl(e.to_string()))?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != SHARE_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair(SHARE_PARAM, &payload);
    Ok(url.to_string())
}

/// The share payload in `url`, if the parameter is present.
pub fn shared_param(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == SHARE_PARAM)
        .map(|(_, v)| v.into_owned())
}

/// Import from either a full share link or a bare payload. All or nothing.
pub fn import_shared(input: &str) -> Result<RaciState> {
    let input = input.trim();
    let payload = shared_param(input).unwrap_or_else(|| input.to_string());
    parse_shared_state(&payload)
        .ok_or_else(|| RaciError::ShareDecode("link does not contain a valid matrix".into()))
}

// --- Decoders, tried in order ---

type Decoder = fn(&str) -> Option<Value>;

const DECODERS: &[(&str, Decoder)] = &[
    ("compressed", decode_compressed),
    ("double-encoded", decode_double_encoded),
    ("legacy", decode_legacy),
];

fn decode_value(input: &str) -> Option<Value> {
    if input.is_empty() {
        return None;
    }
    DECODERS.iter().find_map(|(name, decode)| {
        let value = decode(input)?;
        debug!(format = name, "decoded shared state");
        Some(value)
    })
}

fn decode_compressed(input: &str) -> Option<Value> {
    let bytes = URL_SAFE_NO_PAD.decode(input.trim_end_matches('=')).ok()?;
    let mut json = String::new();
    DeflateDecoder::new(bytes.as_slice())
        .take(MAX_DECODED_BYTES)
        .read_to_string(&mut json)
        .ok()?;
    serde_json::from_str(&json).ok()
}

fn decode_double_encoded(input: &str) -> Option<Value> {
    let decoded = urlencoding::decode(input).ok()?;
    if decoded == input {
        return None;
    }
    decode_compressed(decoded.trim())
}

fn decode_legacy(input: &str) -> Option<Value> {
    // Query parsing turns '+' into ' '.
    let restored = input.replace(' ', "+");
    let bytes = STANDARD
        .decode(restored.as_bytes())
        .or_else(|_| URL_SAFE_NO_PAD.decode(input.trim_end_matches('=')))
        .ok();
    match bytes {
        Some(bytes) => serde_json::from_slice(&bytes).ok(),
        None => serde_json::from_str(input).ok(),
    }
}
