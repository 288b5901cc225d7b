//! Text repair applied to every string the client hands back.

use serde::{Deserialize, Serialize};
use strum::{EnumString, IntoStaticStr};

/// Post-processing applied to answer, thinking, JSON and raw outputs.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, EnumString, IntoStaticStr, Serialize, Deserialize,
)]
#[serde(from = "String", into = "&'static str")]
pub enum TextPostprocess {
    #[strum(serialize = "none")]
    None,
    #[default]
    #[strum(serialize = "fix_mojibake")]
    FixMojibake,
    #[strum(serialize = "ascii_quotes")]
    AsciiQuotes,
    #[strum(serialize = "fix_mojibake+ascii_quotes")]
    FixMojibakeAsciiQuotes,
}

impl TextPostprocess {
    /// Parse a mode name, falling back to [`TextPostprocess::FixMojibake`] for anything unknown.
    pub fn parse_or_default(value: &str) -> Self {
        value.trim().parse().unwrap_or_default()
    }
}

impl From<String> for TextPostprocess {
    fn from(value: String) -> Self {
        Self::parse_or_default(&value)
    }
}

/// Characters Windows-1252 places in 0x80..=0x9F, indexed by `byte - 0x80`.
/// Unassigned slots are `None`.
const CP1252_HIGH: [Option<char>; 32] = [
    Some('\u{20AC}'), None, Some('\u{201A}'), Some('\u{0192}'),
    Some('\u{201E}'), Some('\u{2026}'), Some('\u{2020}'), Some('\u{2021}'),
    Some('\u{02C6}'), Some('\u{2030}'), Some('\u{0160}'), Some('\u{2039}'),
    Some('\u{0152}'), None, Some('\u{017D}'), None,
    None, Some('\u{2018}'), Some('\u{2019}'), Some('\u{201C}'),
    Some('\u{201D}'), Some('\u{2022}'), Some('\u{2013}'), Some('\u{2014}'),
    Some('\u{02DC}'), Some('\u{2122}'), Some('\u{0161}'), Some('\u{203A}'),
    Some('\u{0153}'), None, Some('\u{017E}'), Some('\u{0178}'),
];

/// Map a character back to the single byte a Latin-1 / Windows-1252 decoder
/// would have produced it from.
fn single_byte(c: char) -> Option<u8> {
    if let Ok(byte) = u8::try_from(u32::from(c)) {
        return Some(byte);
    }
    CP1252_HIGH
        .iter()
        .position(|slot| *slot == Some(c))
        .and_then(|idx| u8::try_from(0x80 + idx).ok())
}

/// Undo UTF-8 text that was decoded as a single-byte encoding, e.g.
/// `Hereâ€™s` becomes `Here’s`.
///
/// Returns the input unchanged when it cannot be re-encoded as single bytes
/// or when those bytes are not valid UTF-8.
pub fn repair_encoding(text: &str) -> String {
    if text.is_ascii() {
        return text.to_string();
    }

    let bytes: Option<Vec<u8>> = text.chars().map(single_byte).collect();
    bytes
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| text.to_string())
}

/// Replace curly single and double quotes with their ASCII forms.
pub fn straighten_quotes(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            other => other,
        })
        .collect()
}

/// Apply the post-processing `mode` to one output string.
///
/// Repair runs before quote straightening, so repaired curly quotes are
/// straightened too.
pub fn normalize(text: &str, mode: TextPostprocess) -> String {
    match mode {
        TextPostprocess::None => text.to_string(),
        TextPostprocess::FixMojibake => repair_encoding(text),
        TextPostprocess::AsciiQuotes => straighten_quotes(text),
        TextPostprocess::FixMojibakeAsciiQuotes => straighten_quotes(&repair_encoding(text)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_MODES: [TextPostprocess; 4] = [
        TextPostprocess::None,
        TextPostprocess::FixMojibake,
        TextPostprocess::AsciiQuotes,
        TextPostprocess::FixMojibakeAsciiQuotes,
    ];

    #[test]
    fn repairs_latin1_mojibake() {
        assert_eq!(repair_encoding("Here\u{e2}\u{80}\u{99}s"), "Here\u{2019}s");
        assert_eq!(repair_encoding("caf\u{c3}\u{a9}"), "caf\u{e9}");
    }

    #[test]
    fn repairs_windows_1252_mojibake() {
        assert_eq!(repair_encoding("Here\u{e2}\u{20ac}\u{2122}s"), "Here\u{2019}s");
        assert_eq!(repair_encoding("\u{e2}\u{20ac}\u{153}quoted\u{e2}\u{20ac}\u{9d}"), "\u{201c}quoted\u{201d}");
    }

    #[test]
    fn leaves_correct_text_alone() {
        for text in ["plain ascii", "caf\u{e9}", "na\u{ef}ve r\u{e9}sum\u{e9}", "Here\u{2019}s", "emoji \u{1f600}", ""] {
            assert_eq!(repair_encoding(text), text);
        }
    }

    #[test]
    fn straightens_only_the_four_quotes() {
        assert_eq!(
            straighten_quotes("\u{2018}a\u{2019} \u{201c}b\u{201d}"),
            "'a' \"b\""
        );
        let untouched = "\u{ab}guillemets\u{bb} \u{2039}x\u{203a} \u{201e}low\u{2014}dash";
        assert_eq!(straighten_quotes(untouched), untouched);
    }

    #[test]
    fn normalize_is_idempotent() {
        let samples = [
            "Here\u{e2}\u{80}\u{99}s a test",
            "It\u{2019}s fine",
            "ascii only",
            "caf\u{c3}\u{a9}",
            "\u{201c}already clean\u{201d}",
        ];
        for mode in ALL_MODES {
            for sample in samples {
                let once = normalize(sample, mode);
                assert_eq!(normalize(&once, mode), once, "mode {mode:?} on {sample:?}");
            }
        }
    }

    #[test]
    fn combined_mode_repairs_then_straightens() {
        assert_eq!(
            normalize("Here\u{e2}\u{80}\u{99}s", TextPostprocess::FixMojibakeAsciiQuotes),
            "Here's"
        );
        assert_eq!(
            normalize("Here\u{e2}\u{80}\u{99}s", TextPostprocess::None),
            "Here\u{e2}\u{80}\u{99}s"
        );
    }

    #[test]
    fn unknown_mode_falls_back_to_fix_mojibake() {
        assert_eq!(TextPostprocess::parse_or_default("shout"), TextPostprocess::FixMojibake);
        assert_eq!(TextPostprocess::parse_or_default(""), TextPostprocess::FixMojibake);
        assert_eq!(
            TextPostprocess::parse_or_default(" fix_mojibake+ascii_quotes "),
            TextPostprocess::FixMojibakeAsciiQuotes
        );
        assert_eq!(TextPostprocess::parse_or_default("none"), TextPostprocess::None);
    }

    #[test]
    fn serde_uses_mode_names() {
        let mode: TextPostprocess = serde_json::from_str("\"ascii_quotes\"").unwrap();
        assert_eq!(mode, TextPostprocess::AsciiQuotes);
        let mode: TextPostprocess = serde_json::from_str("\"bogus\"").unwrap();
        assert_eq!(mode, TextPostprocess::FixMojibake);
        assert_eq!(
            serde_json::to_string(&TextPostprocess::FixMojibakeAsciiQuotes).unwrap(),
            "\"fix_mojibake+ascii_quotes\""
        );
    }
}
