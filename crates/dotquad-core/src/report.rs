//! Report line rendering.
//!
//! Byte strings are quoted the way Go's `%q` verb does it: printable UTF-8
//! is kept, `"` and `\` are backslash-escaped, control characters use their
//! C escapes or `\xNN`, other non-printable runes use `\uXXXX`, and bytes that
//! are not valid UTF-8 become `\xNN`.

use std::fmt::Write as _;

use dotquad_mvcc::{KeyValue, Revision};

/// Quote `bytes` as a double-quoted, escaped string.
#[must_use]
pub fn quote(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 2);
    out.push('"');
    for chunk in bytes.utf8_chunks() {
        for c in chunk.valid().chars() {
            push_char(&mut out, c);
        }
        for byte in chunk.invalid() {
            let _ = write!(out, "\\x{byte:02x}");
        }
    }
    out.push('"');
    out
}

/// Quote every item and wrap them in brackets: `["a" "b"]`.
#[must_use]
pub fn quote_list<S: AsRef<[u8]>>(items: &[S]) -> String {
    let quoted: Vec<String> = items.iter().map(|item| quote(item.as_ref())).collect();
    format!("[{}]", quoted.join(" "))
}

/// Dump of one decoded record.
#[must_use]
pub fn decoded_line(revision: Revision, kv: &KeyValue) -> String {
    format!(
        "rev={revision}, value=[key {} | val {} | created {} | mod {} | ver {}]",
        quote(&kv.key),
        quote(&kv.value),
        kv.create_revision,
        kv.mod_revision,
        kv.version
    )
}

/// Dump of one raw bucket entry.
#[must_use]
pub fn raw_line(key: &[u8], value: &[u8]) -> String {
    format!("key {} | val {}", quote(key), quote(value))
}

/// Every candidate found in a record.
#[must_use]
pub fn found_line<S: AsRef<[u8]>>(candidates: &[S], key: &[u8]) -> String {
    format!(
        "IPv4 addresses found {} on key: {}",
        quote_list(candidates),
        quote(key)
    )
}

/// The candidates of a record that failed the strict grammar.
#[must_use]
pub fn warning_line<S: AsRef<[u8]>>(invalid: &[S], key: &[u8]) -> String {
    format!(
        "WARNING Invalid IPv4 addresses {} on key: {}",
        quote_list(invalid),
        quote(key)
    )
}

fn push_char(out: &mut String, c: char) {
    match c {
        '"' => out.push_str("\\\""),
        '\\' => out.push_str("\\\\"),
        '\u{07}' => out.push_str("\\a"),
        '\u{08}' => out.push_str("\\b"),
        '\u{0C}' => out.push_str("\\f"),
        '\n' => out.push_str("\\n"),
        '\r' => out.push_str("\\r"),
        '\t' => out.push_str("\\t"),
        '\u{0B}' => out.push_str("\\v"),
        c if c < ' ' || c == '\u{7F}' => {
            let _ = write!(out, "\\x{:02x}", c as u32);
        }
        c if is_printable(c) => out.push(c),
        c if (c as u32) < 0x1_0000 => {
            let _ = write!(out, "\\u{:04x}", c as u32);
        }
        c => {
            let _ = write!(out, "\\U{:08x}", c as u32);
        }
    }
}

/// Sorted code point ranges that Go's `strconv.IsPrint` rejects and that
/// `char::is_control` and `char::is_whitespace` miss. Covers format and
/// private-use characters plus a subset of the unassigned ones.
const NOT_PRINTABLE: &[(u32, u32)] = &[
    (0x00AD, 0x00AD),
    (0x0378, 0x0379),
    (0x0380, 0x0383),
    (0x038B, 0x038B),
    (0x038D, 0x038D),
    (0x03A2, 0x03A2),
    (0x0600, 0x0605),
    (0x061C, 0x061C),
    (0x06DD, 0x06DD),
    (0x070F, 0x070F),
    (0x0890, 0x0891),
    (0x08E2, 0x08E2),
    (0x180E, 0x180E),
    (0x200B, 0x200F),
    (0x202A, 0x202E),
    (0x2060, 0x206F),
    (0xE000, 0xF8FF),
    (0xFDD0, 0xFDEF),
    (0xFEFF, 0xFEFF),
    (0xFFF0, 0xFFFB),
    (0x110BD, 0x110BD),
    (0x110CD, 0x110CD),
    (0x13430, 0x1343F),
    (0x1BCA0, 0x1BCA3),
    (0x1D173, 0x1D17A),
    (0x323B0, 0xE00FF),
    (0xE01F0, 0x10FFFF),
];

/// Approximation of Go's `strconv.IsPrint` for non-ASCII runes.
fn is_printable(c: char) -> bool {
    if c.is_ascii() {
        return true;
    }
    if c.is_control() || c.is_whitespace() {
        return false;
    }
    let cp = u32::from(c);
    // Noncharacters end every plane.
    if (cp & 0xFFFE) == 0xFFFE {
        return false;
    }
    !NOT_PRINTABLE
        .iter()
        .any(|&(lo, hi)| (lo..=hi).contains(&cp))
}
