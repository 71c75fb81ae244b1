//! Attribute and URL-resolution helpers.
//!
//! `resolve_url` and the `extract_attr_*` helpers are carried over near
//! verbatim from the teacher's `sources::youtube::hls::utils` — they already
//! handle the URI-resolution edge cases (auth tokens in query strings,
//! absolute-path vs. relative joins) this parser needs.

#[allow(dead_code)]
pub fn extract_attr_u64(line: &str, key: &str) -> Option<u64> {
    extract_attr_str(line, key)?.parse().ok()
}

pub fn extract_attr_str(line: &str, key: &str) -> Option<String> {
    let key_eq = format!("{}=", key);
    let pos = line
        .find(&format!(":{}", key_eq))
        .map(|p| p + 1)
        .or_else(|| line.find(&format!(",{}", key_eq)).map(|p| p + 1))?;

    let rest = &line[pos + key_eq.len()..];

    if rest.starts_with('"') {
        let end = rest[1..].find('"')?;
        Some(rest[1..1 + end].to_string())
    } else {
        let end = rest.find(',').unwrap_or(rest.len());
        Some(rest[..end].trim().to_string())
    }
}

pub fn resolve_url(base: &str, maybe_relative: &str) -> String {
    if maybe_relative.starts_with("http://") || maybe_relative.starts_with("https://") {
        return maybe_relative.to_string();
    }

    // Strip query string and fragment from base before resolving. This
    // prevents auth tokens (e.g. ?hdnts=...) from leaking into a resolved
    // relative path.
    let base_clean = base.split('?').next().unwrap_or(base);
    let base_clean = base_clean.split('#').next().unwrap_or(base_clean);

    if maybe_relative.starts_with('/') {
        if let Some(scheme_end) = base_clean.find("://") {
            let host_start = scheme_end + 3;
            let host_end = base_clean[host_start..]
                .find('/')
                .map(|p| host_start + p)
                .unwrap_or(base_clean.len());
            return format!("{}{}", &base_clean[..host_end], maybe_relative);
        }
    }

    let base_dir = base_clean
        .rfind('/')
        .map(|i| &base_clean[..=i])
        .unwrap_or(base_clean);
    format!("{}{}", base_dir, maybe_relative)
}

/// Parses an `IV=` attribute value into exactly 16 bytes: strips an optional
/// `0x` prefix, left-pads with zeroes to 32 hex chars, then decodes.
pub fn parse_iv_hex(attr: &str) -> Result<[u8; 16], String> {
    let trimmed = attr.trim().trim_start_matches("0x").trim_start_matches("0X");
    if trimmed.len() > 32 {
        return Err(format!("IV too long: {} hex chars", trimmed.len()));
    }
    let padded = format!("{:0>32}", trimmed);
    let bytes = hex::decode(&padded).map_err(|e| e.to_string())?;
    bytes
        .try_into()
        .map_err(|v: Vec<u8>| format!("IV decoded to {} bytes, expected 16", v.len()))
}
