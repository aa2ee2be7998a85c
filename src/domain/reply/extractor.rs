//! Incremental extraction of two string fields from a streamed JSON object.
//!
//! The provider streams the reply object as arbitrary text fragments. Network
//! reads do not line up with JSON tokens, and an escape such as `\u00e9` can
//! be split across fragments, so the extractor is a character-level state
//! machine that never waits for a structural boundary.
//!
//! It is a minimal lexer scoped to the flat object the schema
//! guarantees: string values are tracked, other values (numbers, booleans)
//! are skipped, and nesting is not understood. A reply whose JSON contains
//! nested objects may therefore be misread; the full-buffer fallback in
//! [`parse_reply_payload`](super::payload::parse_reply_payload) still runs at
//! stream end when nothing usable was extracted.
//!
//! Two fields matter:
//! - the *pass-through* field, whose decoded characters are handed back after
//!   every [`FieldExtractor::feed`] as one batched delta;
//! - the *capture* field, whose value is handed back exactly once, when its
//!   closing quote arrives. Later duplicates of the key are ignored.

use super::schema::{EMOTION_FIELD, REPLY_FIELD};

const REPLACEMENT: char = '\u{FFFD}';

/// Which field a string value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    PassThrough,
    Capture,
    Ignored,
}

/// Lexical position inside the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Outside,
    InKey,
    InValue(FieldKind),
}

/// Progress through a backslash escape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Escape {
    None,
    /// `\` seen, waiting for the selector.
    Selector,
    /// `\u` seen; `digits` hex digits collected so far into `value`.
    Unicode { digits: u8, value: u32 },
}

/// What one [`FieldExtractor::feed`] call produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedOutcome {
    /// Capture field value, present on the single feed that completed it.
    pub captured: Option<String>,
    /// Pass-through characters decoded during this feed, if any.
    pub delta: Option<String>,
}

/// Per-stream decoder state. Create one per logical call and discard it after.
#[derive(Debug, Clone)]
pub struct FieldExtractor {
    pass_through_field: String,
    capture_field: String,
    mode: Mode,
    expect_value: bool,
    current_field: FieldKind,
    escape: Escape,
    /// High half of a surrogate pair awaiting its low half.
    pending_high: Option<u32>,
    key: String,
    pass_through: String,
    delta: String,
    capture: String,
    captured: Option<String>,
    just_captured: Option<String>,
}

impl Default for FieldExtractor {
    fn default() -> Self {
        Self::for_reply()
    }
}

impl FieldExtractor {
    /// Creates an extractor for arbitrary field names.
    pub fn new(pass_through_field: impl Into<String>, capture_field: impl Into<String>) -> Self {
        Self {
            pass_through_field: pass_through_field.into(),
            capture_field: capture_field.into(),
            mode: Mode::Outside,
            expect_value: false,
            current_field: FieldKind::Ignored,
            escape: Escape::None,
            pending_high: None,
            key: String::new(),
            pass_through: String::new(),
            delta: String::new(),
            capture: String::new(),
            captured: None,
            just_captured: None,
        }
    }

    /// Extractor streaming `reply` and capturing `emotion`.
    pub fn for_reply() -> Self {
        Self::new(REPLY_FIELD, EMOTION_FIELD)
    }

    /// Everything decoded for the pass-through field so far.
    pub fn pass_through(&self) -> &str {
        &self.pass_through
    }

    /// The capture field value, once its closing quote has been seen.
    pub fn captured(&self) -> Option<&str> {
        self.captured.as_deref()
    }

    /// Consumes one fragment of raw text.
    pub fn feed(&mut self, chunk: &str) -> FeedOutcome {
        for c in chunk.chars() {
            self.step(c);
        }

        FeedOutcome {
            captured: self.just_captured.take(),
            delta: (!self.delta.is_empty()).then(|| std::mem::take(&mut self.delta)),
        }
    }

    fn step(&mut self, c: char) {
        match self.escape {
            Escape::Unicode { digits, value } => match c.to_digit(16) {
                Some(digit) => {
                    let value = (value << 4) | digit;
                    if digits + 1 == 4 {
                        self.escape = Escape::None;
                        self.push_code_unit(value);
                    } else {
                        self.escape = Escape::Unicode {
                            digits: digits + 1,
                            value,
                        };
                    }
                    return;
                }
                None => {
                    // Truncated \u escape: drop it and lex `c` normally.
                    self.escape = Escape::None;
                }
            },
            Escape::Selector => {
                self.escape = Escape::None;
                match c {
                    'b' => self.push_char('\u{0008}'),
                    'f' => self.push_char('\u{000C}'),
                    'n' => self.push_char('\n'),
                    'r' => self.push_char('\r'),
                    't' => self.push_char('\t'),
                    'u' => {
                        self.escape = Escape::Unicode {
                            digits: 0,
                            value: 0,
                        }
                    }
                    // `"`, `\`, `/` and unknown selectors are taken literally.
                    other => self.push_char(other),
                }
                return;
            }
            Escape::None => {}
        }

        match self.mode {
            Mode::Outside => match c {
                '"' => {
                    self.mode = if self.expect_value {
                        Mode::InValue(self.current_field)
                    } else {
                        Mode::InKey
                    };
                }
                ',' => self.expect_value = false,
                _ => {}
            },
            Mode::InKey | Mode::InValue(_) => match c {
                '\\' => self.escape = Escape::Selector,
                '"' => self.close_string(),
                other => self.push_char(other),
            },
        }
    }

    fn close_string(&mut self) {
        self.flush_pending_high();
        match self.mode {
            Mode::InKey => {
                let key = std::mem::take(&mut self.key);
                self.current_field = self.classify(&key);
                self.expect_value = true;
            }
            Mode::InValue(FieldKind::Capture) => {
                let value = std::mem::take(&mut self.capture);
                if self.captured.is_none() {
                    self.captured = Some(value.clone());
                    self.just_captured = Some(value);
                }
                self.expect_value = false;
            }
            Mode::InValue(_) => self.expect_value = false,
            Mode::Outside => {}
        }
        self.mode = Mode::Outside;
    }

    fn classify(&self, key: &str) -> FieldKind {
        if key == self.pass_through_field {
            FieldKind::PassThrough
        } else if key == self.capture_field {
            FieldKind::Capture
        } else {
            FieldKind::Ignored
        }
    }

    /// Handles a decoded `\uXXXX` code unit, pairing UTF-16 surrogates.
    fn push_code_unit(&mut self, unit: u32) {
        match (self.pending_high.take(), unit) {
            (Some(high), 0xDC00..=0xDFFF) => {
                let scalar = 0x10000 + ((high - 0xD800) << 10) + (unit - 0xDC00);
                self.write(char::from_u32(scalar).unwrap_or(REPLACEMENT));
            }
            (pending, 0xD800..=0xDBFF) => {
                if pending.is_some() {
                    self.write(REPLACEMENT);
                }
                self.pending_high = Some(unit);
            }
            (pending, _) => {
                if pending.is_some() {
                    self.write(REPLACEMENT);
                }
                self.write(char::from_u32(unit).unwrap_or(REPLACEMENT));
            }
        }
    }

    fn push_char(&mut self, c: char) {
        self.flush_pending_high();
        self.write(c);
    }

    fn flush_pending_high(&mut self) {
        if self.pending_high.take().is_some() {
            self.write(REPLACEMENT);
        }
    }

    fn write(&mut self, c: char) {
        match self.mode {
            Mode::InKey => self.key.push(c),
            Mode::InValue(FieldKind::PassThrough) => {
                self.pass_through.push(c);
                self.delta.push(c);
            }
            Mode::InValue(FieldKind::Capture) if self.captured.is_none() => self.capture.push(c),
            Mode::InValue(_) | Mode::Outside => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Feeds all chunks and returns (concatenated deltas, capture callbacks).
    fn run(chunks: &[&str]) -> (String, Vec<String>) {
        let mut extractor = FieldExtractor::for_reply();
        let mut deltas = String::new();
        let mut captures = Vec::new();
        for chunk in chunks {
            let outcome = extractor.feed(chunk);
            if let Some(delta) = outcome.delta {
                assert!(!delta.is_empty());
                deltas.push_str(&delta);
            }
            captures.extend(outcome.captured);
        }
        assert_eq!(extractor.pass_through(), deltas);
        (deltas, captures)
    }

    #[test]
    fn extracts_both_fields_in_one_feed() {
        let (reply, captures) = run(&[r#"{"emotion":"happy","reply":"Hello!"}"#]);
        assert_eq!(reply, "Hello!");
        assert_eq!(captures, vec!["happy"]);
    }

    #[test]
    fn deltas_are_batched_per_feed() {
        let mut extractor = FieldExtractor::for_reply();
        let outcome = extractor.feed(r#"{"reply":"Hel"#);
        assert_eq!(outcome.delta.as_deref(), Some("Hel"));

        let outcome = extractor.feed(r#"lo"}"#);
        assert_eq!(outcome.delta.as_deref(), Some("lo"));

        let outcome = extractor.feed("\n");
        assert_eq!(outcome, FeedOutcome::default());
    }

    #[test]
    fn emotion_split_across_chunks_is_captured_once_complete() {
        let mut extractor = FieldExtractor::for_reply();

        let first = extractor.feed(r#"{"emotion":"happ"#);
        assert_eq!(first.captured, None);
        assert_eq!(extractor.captured(), None);

        let second = extractor.feed(r#"y","reply":"He"#);
        assert_eq!(second.captured.as_deref(), Some("happy"));
        assert_eq!(second.delta.as_deref(), Some("He"));

        let third = extractor.feed(r#"llo!"}"#);
        assert_eq!(third.captured, None);
        assert_eq!(third.delta.as_deref(), Some("llo!"));
        assert_eq!(extractor.captured(), Some("happy"));
    }

    #[test]
    fn duplicate_capture_key_keeps_first_value() {
        let (reply, captures) = run(&[
            r#"{"emotion":"sad","reply":"ok","emotion":"happy"}"#,
        ]);
        assert_eq!(reply, "ok");
        assert_eq!(captures, vec!["sad"]);
    }

    #[test]
    fn decodes_standard_escapes() {
        let (reply, _) = run(&[r#"{"reply":"a\"b\\c\/d\ne\tf\rg\bh\fi"}"#]);
        assert_eq!(reply, "a\"b\\c/d\ne\tf\rg\u{0008}h\u{000C}i");
    }

    #[test]
    fn unknown_escape_selector_is_literal() {
        let (reply, _) = run(&[r#"{"reply":"\q"}"#]);
        assert_eq!(reply, "q");
    }

    #[test]
    fn unicode_escape_survives_every_split() {
        let source = r#"{"reply":"caf\u00e9!"}"#;
        for (i, _) in source.char_indices().skip(1) {
            let (reply, _) = run(&[&source[..i], &source[i..]]);
            assert_eq!(reply, "café!", "split at {}", i);
        }
    }

    #[test]
    fn surrogate_pairs_combine() {
        let (reply, _) = run(&[r#"{"reply":"hi \ud83d"#, r#"\ude00"}"#]);
        assert_eq!(reply, "hi \u{1F600}");
    }

    #[test]
    fn lone_surrogate_becomes_replacement() {
        let (reply, _) = run(&[r#"{"reply":"a\ud83dbc"}"#]);
        assert_eq!(reply, "a\u{FFFD}bc");
    }

    #[test]
    fn truncated_unicode_escape_keeps_quote_tracking() {
        let (reply, captures) = run(&[r#"{"reply":"x\u12","emotion":"sad"}"#]);
        assert_eq!(reply, "x");
        assert_eq!(captures, vec!["sad"]);
    }

    #[test]
    fn other_fields_and_non_string_values_are_skipped() {
        let (reply, captures) = run(&[
            r#"{"score": 5, "note":"the \"reply\" key", "emotion":"amused", "ok": true, "reply":"yes"}"#,
        ]);
        assert_eq!(reply, "yes");
        assert_eq!(captures, vec!["amused"]);
    }

    #[test]
    fn raw_utf8_passes_through() {
        let (reply, _) = run(&[r#"{"reply":"Grüße "#, r#"日本"}"#]);
        assert_eq!(reply, "Grüße 日本");
    }

    #[test]
    fn custom_field_names() {
        let mut extractor = FieldExtractor::new("text", "mood");
        let outcome = extractor.feed(r#"{"mood":"calm","text":"hello"}"#);
        assert_eq!(outcome.captured.as_deref(), Some("calm"));
        assert_eq!(outcome.delta.as_deref(), Some("hello"));
    }

    #[test]
    fn missing_capture_field_never_fires() {
        let (reply, captures) = run(&[r#"{"reply":"only text"}"#]);
        assert_eq!(reply, "only text");
        assert!(captures.is_empty());
    }

    fn chunked(source: &str, cuts: &[usize]) -> Vec<String> {
        let boundaries: Vec<usize> = source.char_indices().map(|(i, _)| i).collect();
        let mut points: Vec<usize> = cuts
            .iter()
            .map(|c| boundaries[c % boundaries.len()])
            .collect();
        points.push(source.len());
        points.sort_unstable();
        points.dedup();

        let mut chunks = Vec::new();
        let mut start = 0;
        for point in points {
            chunks.push(source[start..point].to_string());
            start = point;
        }
        chunks
    }

    proptest! {
        #[test]
        fn chunk_boundaries_do_not_change_output(
            reply in "[a-zA-Z0-9 \"\\\\/\n\t{}:,éß😀]{0,40}",
            emotion in "[a-z]{1,10}",
            cuts in proptest::collection::vec(0usize..200, 0..12),
        ) {
            let source = serde_json::json!({ "emotion": emotion, "reply": reply }).to_string();

            let (whole, whole_captures) = run(&[source.as_str()]);
            let chunks = chunked(&source, &cuts);
            let refs: Vec<&str> = chunks.iter().map(String::as_str).collect();
            let (split, split_captures) = run(&refs);

            prop_assert_eq!(&whole, &reply);
            prop_assert_eq!(&split, &reply);
            prop_assert_eq!(whole_captures, vec![emotion.clone()]);
            prop_assert_eq!(split_captures, vec![emotion]);
        }

        #[test]
        fn escaped_unicode_matches_serde(
            reply in "\\PC{0,20}",
            cuts in proptest::collection::vec(0usize..400, 0..8),
        ) {
            let escaped: String = reply
                .encode_utf16()
                .map(|unit| format!("\\u{:04x}", unit))
                .collect();
            let source = format!(r#"{{"reply":"{}"}}"#, escaped);

            let chunks = chunked(&source, &cuts);
            let refs: Vec<&str> = chunks.iter().map(String::as_str).collect();
            let (split, _) = run(&refs);

            prop_assert_eq!(split, reply);
        }
    }
}
