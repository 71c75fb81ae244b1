use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Ts,
    Mp4,
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Ts
    }
}

/// Raw, caller-supplied fields. Validated and sanitised into [`TaskOptions`]
/// by [`TaskOptions::new`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOptionsInput {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub output_format: OutputFormat,
    #[serde(default)]
    pub start_segment: Option<usize>,
    #[serde(default)]
    pub end_segment: Option<usize>,
    #[serde(default = "default_true")]
    pub stream_to_disk: bool,
    #[serde(default = "default_true")]
    pub decrypt: bool,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

fn default_true() -> bool {
    true
}

// Deriving `Default` here would silently disagree with the `#[serde(default
// = "default_true")]` fields above (the derive macro always falls back to
// `bool::default()`, i.e. `false`, regardless of a field's serde default
// function) so it's written out by hand to keep both defaults in sync.
impl Default for TaskOptionsInput {
    fn default() -> Self {
        Self {
            url: String::new(),
            title: String::new(),
            output_format: OutputFormat::default(),
            start_segment: None,
            end_segment: None,
            stream_to_disk: true,
            decrypt: true,
            max_retries: None,
            headers: HashMap::new(),
        }
    }
}

/// Immutable, validated task configuration (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOptions {
    pub url: String,
    pub title: String,
    pub output_format: OutputFormat,
    pub start_segment: Option<usize>,
    pub end_segment: Option<usize>,
    pub stream_to_disk: bool,
    pub decrypt: bool,
    pub max_retries: u32,
    pub headers: HashMap<String, String>,
}

impl TaskOptions {
    pub fn new(input: TaskOptionsInput) -> Result<Self, EngineError> {
        if input.url.trim().is_empty() {
            return Err(EngineError::Validation("url must not be empty".into()));
        }

        if let (Some(start), Some(end)) = (input.start_segment, input.end_segment) {
            if start > end {
                return Err(EngineError::Validation(format!(
                    "start_segment ({start}) must be <= end_segment ({end})"
                )));
            }
        }
        if let Some(start) = input.start_segment {
            if start < 1 {
                return Err(EngineError::Validation(
                    "start_segment must be >= 1".into(),
                ));
            }
        }

        Ok(Self {
            url: input.url,
            title: sanitise_title(&input.title),
            output_format: input.output_format,
            start_segment: input.start_segment,
            end_segment: input.end_segment,
            stream_to_disk: input.stream_to_disk,
            decrypt: input.decrypt,
            max_retries: input.max_retries.unwrap_or(3),
            headers: input.headers,
        })
    }
}

/// Sanitises a caller-supplied title to `[A-Za-z0-9_-]`, truncated to 80
/// characters, falling back to `"video"` when that leaves nothing.
fn sanitise_title(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .take(80)
        .collect();
    if cleaned.is_empty() {
        "video".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(url: &str) -> TaskOptionsInput {
        TaskOptionsInput {
            url: url.to_string(),
            stream_to_disk: true,
            decrypt: true,
            ..Default::default()
        }
    }

    #[test]
    fn rejects_empty_url() {
        assert!(TaskOptions::new(input("")).is_err());
    }

    #[test]
    fn rejects_inverted_range() {
        let mut i = input("https://host/a.m3u8");
        i.start_segment = Some(5);
        i.end_segment = Some(2);
        assert!(TaskOptions::new(i).is_err());
    }

    #[test]
    fn rejects_zero_start() {
        let mut i = input("https://host/a.m3u8");
        i.start_segment = Some(0);
        assert!(TaskOptions::new(i).is_err());
    }

    #[test]
    fn title_sanitised_and_truncated() {
        let mut i = input("https://host/a.m3u8");
        i.title = "My Video! 🎬".repeat(10);
        let opts = TaskOptions::new(i).unwrap();
        assert!(opts.title.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'));
        assert!(opts.title.len() <= 80);
    }

    #[test]
    fn empty_title_falls_back_to_video() {
        let i = input("https://host/a.m3u8");
        let opts = TaskOptions::new(i).unwrap();
        assert_eq!(opts.title, "video");
    }

    #[test]
    fn default_max_retries_is_three() {
        let opts = TaskOptions::new(input("https://host/a.m3u8")).unwrap();
        assert_eq!(opts.max_retries, 3);
    }
}
