// ABOUTME: GSM 03.38 default alphabet codec used to size outbound user data before segmentation
// ABOUTME: Maps text to single septet-per-octet bytes or 0x1B escape pairs and back again

//! GSM 7-bit default alphabet.
//!
//! Each character is written as one unpacked octet, or as the escape octet
//! `0x1B` followed by an extension-table octet. Characters that appear in
//! neither table are dropped on encode, so [`byte_length`] always equals
//! `encode(text).len()` and segment sizing stays exact.

/// Escape octet introducing an extension-table character.
pub const ESCAPE: u8 = 0x1B;

/// Base table indexed by octet value. Slot `0x1B` is the escape and maps to no character.
const BASE: [char; 128] = [
    '@', '£', '$', '¥', 'è', 'é', 'ù', 'ì', 'ò', 'Ç', '\n', 'Ø', 'ø', '\r', 'Å', 'å', //
    'Δ', '_', 'Φ', 'Γ', 'Λ', 'Ω', 'Π', 'Ψ', 'Σ', 'Θ', 'Ξ', '\u{1B}', 'Æ', 'æ', 'ß', 'É', //
    ' ', '!', '"', '#', '¤', '%', '&', '\'', '(', ')', '*', '+', ',', '-', '.', '/', //
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', ':', ';', '<', '=', '>', '?', //
    '¡', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', //
    'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', 'Ä', 'Ö', 'Ñ', 'Ü', '§', //
    '¿', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', //
    'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', 'ä', 'ö', 'ñ', 'ü', 'à', //
];

/// Extension table: octet following [`ESCAPE`] and the character it stands for.
const EXTENSION: [(u8, char); 10] = [
    (0x0A, '\u{0C}'),
    (0x14, '^'),
    (0x28, '{'),
    (0x29, '}'),
    (0x2F, '\\'),
    (0x3C, '['),
    (0x3D, '~'),
    (0x3E, ']'),
    (0x40, '|'),
    (0x65, '€'),
];

/// Encoded form of a single character.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Septet {
    Base(u8),
    Extended(u8),
}

impl Septet {
    fn lookup(c: char) -> Option<Self> {
        if c == '\u{1B}' {
            return None;
        }
        if let Some(index) = BASE.iter().position(|&b| b == c) {
            return Some(Septet::Base(index as u8));
        }
        EXTENSION
            .iter()
            .find(|&&(_, e)| e == c)
            .map(|&(octet, _)| Septet::Extended(octet))
    }

    fn len(self) -> usize {
        match self {
            Septet::Base(_) => 1,
            Septet::Extended(_) => 2,
        }
    }
}

fn base_char(octet: u8) -> Option<char> {
    if octet == ESCAPE {
        return None;
    }
    BASE.get(octet as usize).copied()
}

fn extension_char(octet: u8) -> Option<char> {
    EXTENSION
        .iter()
        .find(|&&(o, _)| o == octet)
        .map(|&(_, c)| c)
}

/// Encodes `text` into unpacked GSM octets. Unmappable characters are dropped.
pub fn encode(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for septet in text.chars().filter_map(Septet::lookup) {
        match septet {
            Septet::Base(octet) => out.push(octet),
            Septet::Extended(octet) => {
                out.push(ESCAPE);
                out.push(octet);
            }
        }
    }
    out
}

/// Decodes unpacked GSM octets.
///
/// An escape followed by an octet outside the extension table falls back to
/// the base table. A trailing escape, or an escape followed by an octet found
/// in neither table (including a second escape), yields a space. Octets above
/// `0x7F` outside an escape sequence are skipped.
pub fn decode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    let mut iter = bytes.iter().copied();
    while let Some(octet) = iter.next() {
        if octet != ESCAPE {
            if let Some(c) = base_char(octet) {
                out.push(c);
            }
            continue;
        }
        let decoded = iter
            .next()
            .and_then(|next| extension_char(next).or_else(|| base_char(next)))
            .unwrap_or(' ');
        out.push(decoded);
    }
    out
}

/// Number of octets [`encode`] produces for `text`.
pub fn byte_length(text: &str) -> usize {
    text.chars().filter_map(Septet::lookup).map(Septet::len).sum()
}

/// Plain 7-bit ASCII rendition used when the GSM alphabet is disabled.
///
/// Non-ASCII characters become `?`, one octet per character.
pub fn encode_ascii(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
        .collect()
}
