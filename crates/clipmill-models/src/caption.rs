//! Caption words, templates and styling.
//!
//! Caption words are stored clip-relative: the ingestion stage
//! re-anchors transcript words to `word.start - clip.start_time` before
//! persisting them, so the render stage never needs the parent video's
//! timeline.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::video::TranscriptWord;

/// A caption word with clip-relative timing (seconds from clip start).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CaptionWord {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

/// Horizontal caption alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum TextAlignment {
    Left,
    #[default]
    Center,
    Right,
}

/// Named caption presets selectable per video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum CaptionTemplate {
    /// Bold word-by-word karaoke highlight.
    #[default]
    Hype,
    /// Calm two-line captions.
    Minimal,
    /// Large uppercase single words.
    Impact,
    /// No captions rendered.
    Off,
}

impl CaptionTemplate {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptionTemplate::Hype => "hype",
            CaptionTemplate::Minimal => "minimal",
            CaptionTemplate::Impact => "impact",
            CaptionTemplate::Off => "off",
        }
    }

    /// Build the concrete style for this template.
    pub fn style(&self) -> CaptionStyle {
        match self {
            CaptionTemplate::Hype => CaptionStyle {
                font: "Montserrat ExtraBold".to_string(),
                font_size: 64,
                max_words_per_line: 4,
                alignment: TextAlignment::Center,
                vertical_position: 0.75,
                highlight_color: Some("#00FF88".to_string()),
                uppercase: true,
            },
            CaptionTemplate::Minimal => CaptionStyle {
                font: "Inter Medium".to_string(),
                font_size: 44,
                max_words_per_line: 6,
                alignment: TextAlignment::Center,
                vertical_position: 0.85,
                highlight_color: None,
                uppercase: false,
            },
            CaptionTemplate::Impact => CaptionStyle {
                font: "Archivo Black".to_string(),
                font_size: 80,
                max_words_per_line: 2,
                alignment: TextAlignment::Center,
                vertical_position: 0.5,
                highlight_color: Some("#FFD400".to_string()),
                uppercase: true,
            },
            CaptionTemplate::Off => CaptionStyle {
                font: String::new(),
                font_size: 0,
                max_words_per_line: 0,
                alignment: TextAlignment::Center,
                vertical_position: 0.0,
                highlight_color: None,
                uppercase: false,
            },
        }
    }
}

impl fmt::Display for CaptionTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Concrete caption rendering parameters passed to the render engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CaptionStyle {
    pub font: String,
    pub font_size: u32,
    pub max_words_per_line: u32,
    pub alignment: TextAlignment,
    /// 0.0 = top of frame, 1.0 = bottom.
    pub vertical_position: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlight_color: Option<String>,
    pub uppercase: bool,
}

impl CaptionStyle {
    /// Apply language-specific overrides: CJK scripts pack fewer words
    /// per line, RTL scripts right-align.
    pub fn for_language(mut self, language: &str) -> Self {
        let primary = language
            .split(['-', '_'])
            .next()
            .unwrap_or(language)
            .to_ascii_lowercase();

        if matches!(primary.as_str(), "zh" | "ja" | "ko") && self.max_words_per_line > 3 {
            self.max_words_per_line = 3;
        }
        if matches!(primary.as_str(), "ar" | "he" | "fa" | "ur") {
            self.alignment = TextAlignment::Right;
        }
        self
    }
}

/// Extract the transcript words covered by `[start, end]` and re-anchor
/// them to clip-relative time.
pub fn reanchor_words(words: &[TranscriptWord], start: f64, end: f64) -> Vec<CaptionWord> {
    words
        .iter()
        .filter(|w| w.start >= start && w.end <= end)
        .map(|w| CaptionWord {
            text: w.word.clone(),
            start: w.start - start,
            end: w.end - start,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str, start: f64, end: f64) -> TranscriptWord {
        TranscriptWord {
            word: text.to_string(),
            start,
            end,
        }
    }

    #[test]
    fn test_reanchor_words_clip_relative() {
        let words = vec![
            word("before", 8.0, 9.5),
            word("hello", 10.0, 10.4),
            word("world", 10.5, 11.0),
            word("after", 20.5, 21.0),
        ];

        let captions = reanchor_words(&words, 10.0, 20.0);
        assert_eq!(captions.len(), 2);
        assert_eq!(captions[0].text, "hello");
        assert!((captions[0].start - 0.0).abs() < 1e-9);
        assert!((captions[1].start - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_reanchor_excludes_partially_overlapping_words() {
        let words = vec![word("straddle", 9.5, 10.5), word("inside", 11.0, 12.0)];
        let captions = reanchor_words(&words, 10.0, 20.0);
        assert_eq!(captions.len(), 1);
        assert_eq!(captions[0].text, "inside");
    }

    #[test]
    fn test_cjk_override_caps_words_per_line() {
        let style = CaptionTemplate::Hype.style().for_language("ja-JP");
        assert_eq!(style.max_words_per_line, 3);
    }

    #[test]
    fn test_rtl_override_right_aligns() {
        let style = CaptionTemplate::Minimal.style().for_language("ar");
        assert_eq!(style.alignment, TextAlignment::Right);
        // Words-per-line untouched for RTL
        assert_eq!(style.max_words_per_line, 6);
    }

    #[test]
    fn test_latin_language_untouched() {
        let style = CaptionTemplate::Hype.style().for_language("en-US");
        assert_eq!(style, CaptionTemplate::Hype.style());
    }
}
