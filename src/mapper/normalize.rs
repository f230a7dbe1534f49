//! Canonicalization of room names and descriptions into index hashes.
//!
//! The hosted room index was produced by MMapper; every step here must match
//! its output byte for byte or lookups silently miss.

use md5::{Digest, Md5};
use regex::Regex;
use std::sync::OnceLock;

/// Replacement for code points without a table entry.
const PLACEHOLDER: char = 'z';

/// Folding of U+00C0..=U+00FF to ASCII.
const LATIN1_FOLD: [char; 64] = [
    'A', 'A', 'A', 'A', 'A', 'A', 'A', 'C', 'E', 'E', 'E', 'E', 'I', 'I', 'I', 'I', // 192
    'D', 'N', 'O', 'O', 'O', 'O', 'O', 'x', 'O', 'U', 'U', 'U', 'U', 'Y', 'b', 'B', // 208
    'a', 'a', 'a', 'a', 'a', 'a', 'a', 'c', 'e', 'e', 'e', 'e', 'i', 'i', 'i', 'i', // 224
    'o', 'n', 'o', 'o', 'o', 'o', 'o', ':', 'o', 'u', 'u', 'u', 'u', 'y', 'b', 'y', // 240
];

fn ansi_escape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\x1B\[[^A-Za-z]+[A-Za-z]").expect("static regex"))
}

fn space_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r" +").expect("static regex"))
}

fn line_ends() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r" *\r?\n").expect("static regex"))
}

/// Remove terminal color sequences.
pub fn strip_ansi(text: &str) -> String {
    ansi_escape().replace_all(text, "").into_owned()
}

/// ASCII approximation of `text`, the same way MMapper folds Latin-1.
///
/// Code point 128 itself passes through; 129..=191 and anything past the
/// Latin-1 block become the placeholder.
pub fn transliterate(text: &str) -> String {
    text.chars()
        .map(|ch| match ch as u32 {
            0..=128 => ch,
            cp @ 192..=255 => LATIN1_FOLD[(cp - 192) as usize],
            _ => PLACEHOLDER,
        })
        .collect()
}

/// Canonical form of a room name or description.
pub fn normalize(input: &str) -> String {
    let text = transliterate(&strip_ansi(input));
    let text = space_runs().replace_all(&text, " ");
    line_ends().replace_all(&text, "\n").into_owned()
}

/// Hex MD5 of the normalized name and description joined by a newline.
pub fn hash_name_desc(name: &str, desc: &str) -> String {
    let namedesc = format!("{}\n{}", normalize(name), normalize(desc));
    hex::encode(Md5::digest(namedesc.as_bytes()))
}

/// Index chunk identifier for a hash: its first two hex characters.
pub fn chunk_of(hash: &str) -> &str {
    hash.get(..2).unwrap_or(hash)
}
