//! M3U8 media-playlist parser.
//!
//! Grounded on the teacher's `sources::youtube::hls::parser::parse_m3u8`,
//! generalized with `#EXT-X-KEY` and `#EXT-X-MEDIA-SEQUENCE` tracking (which
//! the teacher's parser never needed — YouTube's audio-only HLS is
//! unencrypted). Master-playlist handling is inverted: the teacher
//! auto-selects the best variant; this parser rejects master playlists
//! outright per spec §4.2 and the "Open question — master playlist
//! auto-selection" design note.

use super::types::{KeyDescriptor, KeyMethod, MediaPlaylist, PlaylistSegment};
use super::util::{extract_attr_str, resolve_url};
use crate::error::EngineError;

const VARIANT_REJECTED_MESSAGE: &str =
    "Variant playlists are not supported. Provide a media playlist URL.";

/// Consumes an M3U8 text body and yields a typed media playlist. Rejects
/// multi-variant (master) playlists and playlists with zero segments.
pub fn parse(text: &str, base_url: &str) -> Result<MediaPlaylist, EngineError> {
    let lines: Vec<&str> = text.lines().map(str::trim).collect();

    if lines.iter().any(|l| l.starts_with("#EXT-X-STREAM-INF")) {
        return Err(EngineError::PlaylistRejected(
            VARIANT_REJECTED_MESSAGE.to_string(),
        ));
    }

    let mut media_sequence = 0u64;
    let mut segments = Vec::new();
    let mut active_key: Option<KeyDescriptor> = None;
    let mut position = 0usize;

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];

        if let Some(seq) = line
            .strip_prefix("#EXT-X-MEDIA-SEQUENCE:")
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            media_sequence = seq;
        } else if line.starts_with("#EXT-X-KEY") {
            let method = extract_attr_str(line, "METHOD")
                .map(|m| KeyMethod::parse(&m))
                .unwrap_or(KeyMethod::None);
            if matches!(method, KeyMethod::None) {
                active_key = None;
            } else {
                let uri = extract_attr_str(line, "URI").map(|u| resolve_url(base_url, &u));
                let iv_hex = extract_attr_str(line, "IV");
                active_key = Some(KeyDescriptor {
                    method,
                    uri,
                    iv_hex,
                });
            }
        } else if let Some(rest) = line.strip_prefix("#EXTINF:") {
            let duration = rest
                .split(',')
                .next()
                .and_then(|d| d.trim().parse::<f64>().ok())
                .unwrap_or(0.0);

            let mut j = i + 1;
            while j < lines.len() && (lines[j].starts_with('#') || lines[j].is_empty()) {
                j += 1;
            }
            if j < lines.len() {
                segments.push(PlaylistSegment {
                    position,
                    url: resolve_url(base_url, lines[j]),
                    duration,
                    key: active_key.clone(),
                });
                position += 1;
                i = j;
            }
        }

        i += 1;
    }

    if segments.is_empty() {
        return Err(EngineError::PlaylistRejected(
            "未找到视频片段。请确认这是一个有效的 m3u8 视频文件链接。".to_string(),
        ));
    }

    Ok(MediaPlaylist {
        media_sequence,
        segments,
    })
}
