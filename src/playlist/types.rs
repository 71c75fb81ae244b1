/// Encryption method named on an `#EXT-X-KEY` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMethod {
    None,
    Aes128,
    /// Anything else (SAMPLE-AES, etc.) — supported-at-parse-time only; the
    /// pipeline rejects it at download time per spec §4.2.
    Other,
}

impl KeyMethod {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "NONE" => KeyMethod::None,
            "AES-128" => KeyMethod::Aes128,
            _ => KeyMethod::Other,
        }
    }
}

/// The currently active `#EXT-X-KEY` descriptor, carried forward onto every
/// subsequent segment until overridden.
#[derive(Debug, Clone)]
pub struct KeyDescriptor {
    pub method: KeyMethod,
    pub uri: Option<String>,
    /// Raw `IV=` attribute text, not yet parsed to bytes (the hex syntax
    /// allows an optional `0x` prefix and variable-length input that gets
    /// zero-padded — see `util::parse_iv_hex`).
    pub iv_hex: Option<String>,
}

/// One `#EXTINF` entry, with the key descriptor active at that point.
#[derive(Debug, Clone)]
pub struct PlaylistSegment {
    /// 0-based position in the original playlist (before `start`/`end`
    /// range filtering — this is what IV derivation needs).
    pub position: usize,
    pub url: String,
    pub duration: f64,
    pub key: Option<KeyDescriptor>,
}

/// A parsed, in-scope media playlist. Master/variant playlists are rejected
/// before this type is ever constructed (see `parser::parse`).
#[derive(Debug, Clone)]
pub struct MediaPlaylist {
    pub media_sequence: u64,
    pub segments: Vec<PlaylistSegment>,
}
