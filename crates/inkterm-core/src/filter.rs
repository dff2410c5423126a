//! Output cleanup before text reaches the document.

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;

/// CSI introducers (7-bit `ESC [` or the C1 character), parameter and
/// intermediate characters, then one final character.
const CONTROL_SEQUENCE: &str = r"(?:\x{9B}|\x1B\[)[\x20-\x3F]*[\x40-\x7E]";

fn control_sequence() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(CONTROL_SEQUENCE).expect("control sequence pattern"))
}

/// Remove terminal control sequences from decoded output.
///
/// Works on characters, so a `0x9B` continuation byte inside a multi-byte
/// character is never mistaken for a C1 introducer.
pub fn strip_control_sequences(text: &str) -> Cow<'_, str> {
    control_sequence().replace_all(text, "")
}

/// Carries an incomplete UTF-8 sequence from one chunk to the next, so a
/// multi-byte character split across reads is decoded whole.
#[derive(Debug, Default)]
pub struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `bytes`, holding back a trailing partial character.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let keep = incomplete_tail_len(&self.pending);
        let tail = self.pending.split_off(self.pending.len() - keep);
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending = tail;
        text
    }

    /// Flush whatever is held back. Invalid leftovers become replacement characters.
    pub fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

/// Length of a trailing UTF-8 sequence that has started but not finished.
fn incomplete_tail_len(bytes: &[u8]) -> usize {
    for back in 1..=bytes.len().min(3) {
        let byte = bytes[bytes.len() - back];
        let width = match byte {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            0x80..=0xBF => continue,
            _ => return 0,
        };
        return if back < width { back } else { 0 };
    }
    0
}
