//! ZSCII text codec
//!
//! Z-strings pack three 5-bit Z-characters per word, the last word marked by
//! its top bit. Characters map through three alphabets, with shift codes,
//! abbreviations and a 10-bit escape for arbitrary ZSCII codes.

use crate::display_trait::Key;
use crate::error::VmError;
use crate::header::Header;
use bitreader::BitReader;
use log::{trace, warn};

lazy_static! {
    /// Default alphabets for v2+ (A2 slots 0 and 1 are escape and newline)
    static ref DEFAULT_ALPHABETS: [[u8; 26]; 3] = [
        *b"abcdefghijklmnopqrstuvwxyz",
        *b"ABCDEFGHIJKLMNOPQRSTUVWXYZ",
        *b" \r0123456789.,!?_#'\"/\\-:()",
    ];

    /// Version 1 punctuation alphabet has '<' and no newline slot
    static ref V1_ALPHABET_A2: [u8; 26] = *b" 0123456789.,!?_#'\"/\\<-:()";

    /// Default translation for ZSCII 155..=223
    static ref DEFAULT_UNICODE_TABLE: Vec<char> =
        "äöüÄÖÜß»«ëïÿËÏáéíóúýÁÉÍÓÚÝàèìòùÀÈÌÒÙâêîôûÂÊÎÔÛåÅøØãñõÃÑÕæÆçÇþðÞÐ£œŒ¡¿"
            .chars()
            .collect();
}

/// ZSCII newline
pub const ZSCII_NEWLINE: u16 = 13;

/// Split a packed word into its end flag and three Z-characters
pub fn unpack_word(word: u16) -> Result<(bool, [u8; 3]), VmError> {
    let bytes = word.to_be_bytes();
    let mut reader = BitReader::new(&bytes);
    let read_err = |e| VmError::Memory(format!("Z-character unpack failed: {}", e));
    let last = reader.read_u8(1).map_err(read_err)? == 1;
    let mut chars = [0u8; 3];
    for c in chars.iter_mut() {
        *c = reader.read_u8(5).map_err(read_err)?;
    }
    Ok((last, chars))
}

/// Version-aware encoder and decoder for one story
#[derive(Debug, Clone)]
pub struct ZsciiCodec {
    version: u8,
    abbrev_table: usize,
    alphabets: [[u8; 26]; 3],
    unicode: Vec<char>,
}

impl ZsciiCodec {
    /// Build the codec from the story header, honouring custom alphabet and
    /// Unicode translation tables in v5+
    pub fn new(memory: &[u8], header: &Header) -> Self {
        let version = header.version;
        let mut alphabets = *DEFAULT_ALPHABETS;
        if version == 1 {
            alphabets[2] = *V1_ALPHABET_A2;
        }

        let alpha_addr = header.alphabet_table as usize;
        if version >= 5 && alpha_addr != 0 && alpha_addr + 78 <= memory.len() {
            for (a, row) in alphabets.iter_mut().enumerate() {
                row.copy_from_slice(&memory[alpha_addr + a * 26..alpha_addr + (a + 1) * 26]);
            }
            alphabets[2][0] = b' ';
            alphabets[2][1] = b'\r';
        }

        let mut unicode = DEFAULT_UNICODE_TABLE.clone();
        let ext = header.header_extension as usize;
        if version >= 5 && ext != 0 && ext + 8 <= memory.len() {
            let ext_len = word(memory, ext);
            let table = if ext_len >= 3 { word(memory, ext + 6) as usize } else { 0 };
            if table != 0 && table < memory.len() {
                let count = memory[table] as usize;
                unicode = (0..count)
                    .map(|i| word(memory, table + 1 + 2 * i))
                    .map(|u| char::from_u32(u as u32).unwrap_or('?'))
                    .collect();
            }
        }

        ZsciiCodec {
            version,
            abbrev_table: header.abbrev_table as usize,
            alphabets,
            unicode,
        }
    }

    /// Number of Z-characters in a dictionary word
    pub fn dictionary_zchars(&self) -> usize {
        if self.version <= 3 {
            6
        } else {
            9
        }
    }

    /// Decode a Z-string into ZSCII codes.
    /// Returns the codes and the number of bytes the string occupies.
    pub fn decode_zscii(&self, memory: &[u8], addr: usize) -> Result<(Vec<u16>, usize), VmError> {
        self.decode_inner(memory, addr, true)
    }

    /// Decode a Z-string to text
    pub fn decode_string(&self, memory: &[u8], addr: usize) -> Result<(String, usize), VmError> {
        let (codes, len) = self.decode_zscii(memory, addr)?;
        Ok((self.zscii_to_string(&codes), len))
    }

    fn decode_inner(
        &self,
        memory: &[u8],
        addr: usize,
        allow_abbrev: bool,
    ) -> Result<(Vec<u16>, usize), VmError> {
        let mut zchars = Vec::new();
        let mut offset = addr;
        loop {
            if offset + 1 >= memory.len() {
                return Err(VmError::Memory(format!(
                    "Unterminated string at 0x{:04x}",
                    addr
                )));
            }
            let w = word(memory, offset);
            offset += 2;
            let (last, chars) = unpack_word(w)?;
            zchars.extend_from_slice(&chars);
            if last {
                break;
            }
        }

        let mut out = Vec::with_capacity(zchars.len());
        let mut lock = 0usize;
        let mut shift: Option<usize> = None;
        let mut i = 0;
        while i < zchars.len() {
            let zc = zchars[i] as usize;
            i += 1;
            let alphabet = shift.take().unwrap_or(lock);

            match zc {
                0 => out.push(32),
                1 if self.version == 1 => out.push(ZSCII_NEWLINE),
                1..=3 if self.version >= 3 || zc == 1 => {
                    let Some(&index) = zchars.get(i) else { break };
                    i += 1;
                    if !allow_abbrev {
                        warn!("Abbreviation inside abbreviation at 0x{:04x} ignored", addr);
                        continue;
                    }
                    let entry = self.abbrev_table + 2 * (32 * (zc - 1) + index as usize);
                    let target = word(memory, entry) as usize * 2;
                    trace!("Abbreviation {} -> 0x{:04x}", 32 * (zc - 1) + index as usize, target);
                    let (expansion, _) = self.decode_inner(memory, target, false)?;
                    out.extend(expansion);
                }
                2 | 3 => {
                    // v1-2 single shifts, relative to the locked alphabet
                    shift = Some((lock + zc - 1) % 3);
                }
                4 | 5 if self.version <= 2 => {
                    lock = (lock + zc - 3) % 3;
                }
                4 | 5 => {
                    shift = Some(zc - 3);
                }
                _ => {
                    if alphabet == 2 && zc == 6 {
                        let (Some(&hi), Some(&lo)) = (zchars.get(i), zchars.get(i + 1)) else {
                            break;
                        };
                        i += 2;
                        out.push(((hi as u16) << 5) | lo as u16);
                    } else if alphabet == 2 && zc == 7 && self.version >= 2 {
                        out.push(ZSCII_NEWLINE);
                    } else {
                        out.push(self.alphabets[alphabet][zc - 6] as u16);
                    }
                }
            }
        }

        Ok((out, offset - addr))
    }

    /// Translate a ZSCII output code to a character
    pub fn zscii_to_char(&self, code: u16) -> Option<char> {
        match code {
            0 => None,
            9 => Some('\t'),
            11 => Some(' '),
            ZSCII_NEWLINE => Some('\n'),
            32..=126 => Some(code as u8 as char),
            155..=251 => Some(
                self.unicode
                    .get((code - 155) as usize)
                    .copied()
                    .unwrap_or('?'),
            ),
            _ => Some('?'),
        }
    }

    pub fn zscii_to_string(&self, codes: &[u16]) -> String {
        codes.iter().filter_map(|c| self.zscii_to_char(*c)).collect()
    }

    /// Translate a character to ZSCII, if representable
    pub fn char_to_zscii(&self, ch: char) -> Option<u16> {
        match ch {
            '\n' | '\r' => Some(ZSCII_NEWLINE),
            ' '..='~' => Some(ch as u16),
            _ => self
                .unicode
                .iter()
                .position(|u| *u == ch)
                .map(|i| 155 + i as u16),
        }
    }

    /// Map a keypress from the display to its ZSCII input code
    pub fn key_to_zscii(&self, key: Key) -> u16 {
        match key {
            Key::Char(c) => self.char_to_zscii(c).unwrap_or('?' as u16),
            Key::Enter => ZSCII_NEWLINE,
            Key::Delete => 8,
            Key::Escape => 27,
            Key::Up => 129,
            Key::Down => 130,
            Key::Left => 131,
            Key::Right => 132,
            Key::Function(n) => 132 + n.clamp(1, 12) as u16,
        }
    }

    /// Whether a character can be printed and read as ZSCII
    pub fn check_unicode(&self, ch: u16) -> (bool, bool) {
        let known = char::from_u32(ch as u32)
            .and_then(|c| self.char_to_zscii(c))
            .is_some();
        (known, known)
    }

    /// Encode ZSCII text as a dictionary word: 2 words before v4, 3 after.
    /// Text is truncated or padded with Z-character 5.
    pub fn encode_word(&self, text: &[u8]) -> Vec<u16> {
        let limit = self.dictionary_zchars();
        let mut zchars = self.to_zchars(text, limit);
        zchars.truncate(limit);
        zchars.resize(limit, 5);
        pack_zchars(&zchars)
    }

    /// Encode a whole string without truncation, padded to a full word
    pub fn encode_string(&self, text: &str) -> Vec<u16> {
        let zscii: Vec<u8> = text
            .chars()
            .filter_map(|c| self.char_to_zscii(c))
            .map(|c| c as u8)
            .collect();
        let mut zchars = self.to_zchars(&zscii, usize::MAX);
        while zchars.is_empty() || zchars.len() % 3 != 0 {
            zchars.push(5);
        }
        pack_zchars(&zchars)
    }

    fn to_zchars(&self, text: &[u8], limit: usize) -> Vec<u8> {
        let (shift_a1, shift_a2) = if self.version <= 2 { (2, 3) } else { (4, 5) };
        let mut zchars: Vec<u8> = Vec::new();

        for &c in text {
            if zchars.len() >= limit {
                break;
            }
            if c == ZSCII_NEWLINE as u8 && self.version >= 2 {
                zchars.extend_from_slice(&[shift_a2, 7]);
                continue;
            }
            if c == b' ' {
                zchars.push(0);
            } else if let Some(i) = self.alphabets[0].iter().position(|a| *a == c) {
                zchars.push(i as u8 + 6);
            } else if let Some(i) = self.alphabets[1].iter().position(|a| *a == c) {
                zchars.extend_from_slice(&[shift_a1, i as u8 + 6]);
            } else if let Some(i) = self.punctuation_index(c) {
                zchars.extend_from_slice(&[shift_a2, i as u8 + 6]);
            } else {
                zchars.extend_from_slice(&[shift_a2, 6, (c >> 5) & 0x1f, c & 0x1f]);
            }
        }
        zchars
    }

    fn punctuation_index(&self, c: u8) -> Option<usize> {
        let first = if self.version == 1 { 1 } else { 2 };
        self.alphabets[2][first..]
            .iter()
            .position(|a| *a == c)
            .map(|i| i + first)
    }
}

/// Pack Z-characters three to a word, marking the last word
fn pack_zchars(zchars: &[u8]) -> Vec<u16> {
    let mut words: Vec<u16> = zchars
        .chunks(3)
        .map(|c| ((c[0] as u16) << 10) | ((c[1] as u16) << 5) | c[2] as u16)
        .collect();
    if let Some(last) = words.last_mut() {
        *last |= 0x8000;
    }
    words
}

fn word(memory: &[u8], addr: usize) -> u16 {
    let hi = memory.get(addr).copied().unwrap_or(0) as u16;
    let lo = memory.get(addr + 1).copied().unwrap_or(0) as u16;
    (hi << 8) | lo
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn codec(version: u8) -> ZsciiCodec {
        let mut memory = vec![0u8; 64];
        memory[0] = version;
        memory[0x18] = 0x01; // abbreviations at 0x100
        ZsciiCodec::new(&memory, &Header::new(&memory))
    }

    fn put_words(memory: &mut [u8], addr: usize, words: &[u16]) {
        for (i, w) in words.iter().enumerate() {
            memory[addr + 2 * i] = (w >> 8) as u8;
            memory[addr + 2 * i + 1] = (w & 0xff) as u8;
        }
    }

    #[test]
    fn test_unpack_word() {
        let (last, chars) = unpack_word(0xc685).unwrap();
        assert!(last);
        assert_eq!(chars, [17, 20, 5]);
    }

    #[test]
    fn test_decode_hello() {
        let mut memory = vec![0u8; 0x200];
        put_words(&mut memory, 0x40, &[0x3551, 0xc685]);
        let (text, len) = codec(3).decode_string(&memory, 0x40).unwrap();
        assert_eq!(text, "hello");
        assert_eq!(len, 4);
    }

    #[test]
    fn test_v3_shift_applies_to_one_character() {
        // 4 'h' 'i' -> "Hi"
        let w = 0x8000 | (4 << 10) | (13 << 5) | 14;
        let mut memory = vec![0u8; 0x200];
        put_words(&mut memory, 0x40, &[w]);
        let (text, _) = codec(3).decode_string(&memory, 0x40).unwrap();
        assert_eq!(text, "Hi");
    }

    #[test]
    fn test_v2_shift_lock_is_sticky() {
        // 4 (lock A1) 'h' 'i' -> "HI"
        let w = 0x8000 | (4 << 10) | (13 << 5) | 14;
        let mut memory = vec![0u8; 0x200];
        put_words(&mut memory, 0x40, &[w]);
        let (text, _) = codec(2).decode_string(&memory, 0x40).unwrap();
        assert_eq!(text, "HI");
    }

    #[test]
    fn test_zscii_escape_and_unicode() {
        // 5 6 (escape) hi=4 lo=27 -> ZSCII 155 (a-umlaut)
        let w1 = (5 << 10) | (6 << 5) | 4;
        let w2 = 0x8000 | (27 << 10) | (5 << 5) | 5;
        let mut memory = vec![0u8; 0x200];
        put_words(&mut memory, 0x40, &[w1, w2]);
        let (text, _) = codec(5).decode_string(&memory, 0x40).unwrap();
        assert_eq!(text, "ä");
    }

    #[test]
    fn test_abbreviation_expansion_is_not_reentrant() {
        let mut memory = vec![0u8; 0x200];
        // abbreviation 0 -> word address 0x90 (byte 0x120)
        put_words(&mut memory, 0x100, &[0x90]);
        // body: 'a' then abbreviation reference 1,0 (ignored)
        put_words(&mut memory, 0x120, &[(6 << 10) | (1 << 5), 0x8000 | (5 << 10) | (5 << 5) | 5]);
        // main string: abbreviation 1,0 then 'b'
        put_words(&mut memory, 0x40, &[0x8000 | (1 << 10) | (0 << 5) | 7]);
        let (text, _) = codec(3).decode_string(&memory, 0x40).unwrap();
        assert_eq!(text, "ab");
    }

    #[test]
    fn test_encode_decode_round_trip_pads_and_truncates() {
        let v3 = codec(3);
        let words = v3.encode_word(b"lantern");
        assert_eq!(words.len(), 2);
        let mut memory = vec![0u8; 0x200];
        put_words(&mut memory, 0x40, &words);
        assert_eq!(v3.decode_string(&memory, 0x40).unwrap().0, "lanter");

        let v5 = codec(5);
        let words = v5.encode_word(b"box");
        assert_eq!(words.len(), 3);
        put_words(&mut memory, 0x40, &words);
        assert_eq!(v5.decode_string(&memory, 0x40).unwrap().0, "box");
    }

    #[test]
    fn test_encode_punctuation_uses_shift() {
        let words = codec(3).encode_word(b"a.");
        // a=6, shift 5, '.' is A2 index 12 -> 18
        assert_eq!(words[0], (6 << 10) | (5 << 5) | 18);
    }

    #[test]
    fn test_char_translation() {
        let c = codec(5);
        assert_eq!(c.char_to_zscii('ö'), Some(156));
        assert_eq!(c.zscii_to_char(156), Some('ö'));
        assert_eq!(c.zscii_to_char(13), Some('\n'));
        assert_eq!(c.key_to_zscii(Key::Up), 129);
        assert_eq!(c.check_unicode('€' as u16), (false, false));
    }
}
