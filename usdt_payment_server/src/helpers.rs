use std::collections::HashMap;

use md5::{Digest, Md5};

/// Computes the gateway signature over a parameter map: all non-empty parameters except `sign`
/// and `sign_type`, sorted by key, concatenated as `k=v&k=v…`, with the shared key appended,
/// hashed with MD5 and hex-encoded.
pub fn gateway_sign(params: &HashMap<String, String>, key: &str) -> String {
    let mut pairs: Vec<(&str, &str)> = params
        .iter()
        .filter(|(k, v)| k.as_str() != "sign" && k.as_str() != "sign_type" && !v.is_empty())
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    let joined = pairs.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("&");
    let digest = Md5::digest(format!("{joined}{key}").as_bytes());
    hex::encode(digest)
}

/// Verifies a gateway callback signature. Missing `sign`, an unsupported `sign_type`, an empty
/// shared key or any mismatch all fail closed.
pub fn verify_gateway_signature(params: &HashMap<String, String>, key: &str) -> bool {
    if key.is_empty() {
        return false;
    }
    let Some(original_sign) = params.get("sign") else {
        return false;
    };
    let sign_type = params.get("sign_type").map(|s| s.to_ascii_uppercase()).unwrap_or_else(|| "MD5".to_string());
    if sign_type != "MD5" {
        return false;
    }
    gateway_sign(params, key).eq_ignore_ascii_case(original_sign)
}
