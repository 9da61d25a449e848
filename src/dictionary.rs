//! Dictionary lookup and input tokenisation
//!
//! A dictionary starts with its word-separator characters, then the entry
//! length and a signed entry count. A negative count marks an unsorted
//! dictionary which must be searched linearly.

use crate::error::VmError;
use crate::game::Game;
use crate::text::ZsciiCodec;
use log::{debug, trace};
use std::cmp::Ordering;

/// A word found in an input buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Offset of the first character within the scanned text
    pub start: usize,
    pub text: Vec<u8>,
}

/// Split text on spaces; each separator character is a token of its own
pub fn split_tokens(text: &[u8], separators: &[u8]) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current: Option<Token> = None;

    for (i, &c) in text.iter().enumerate() {
        if c == b' ' || separators.contains(&c) {
            if let Some(token) = current.take() {
                tokens.push(token);
            }
            if c != b' ' {
                tokens.push(Token {
                    start: i,
                    text: vec![c],
                });
            }
        } else {
            current
                .get_or_insert_with(|| Token {
                    start: i,
                    text: Vec::new(),
                })
                .text
                .push(c);
        }
    }
    if let Some(token) = current {
        tokens.push(token);
    }
    tokens
}

/// View of a dictionary table in story memory
#[derive(Debug, Clone)]
pub struct Dictionary {
    pub separators: Vec<u8>,
    entry_len: u32,
    count: usize,
    sorted: bool,
    entries: u32,
}

impl Dictionary {
    pub fn new(game: &Game, addr: u32) -> Self {
        let sep_count = game.read_byte(addr) as u32;
        let separators = (0..sep_count).map(|i| game.read_byte(addr + 1 + i)).collect();
        let header = addr + 1 + sep_count;
        let entry_len = game.read_byte(header) as u32;
        let raw_count = game.read_word(header + 1) as i16;
        Dictionary {
            separators,
            entry_len,
            count: raw_count.unsigned_abs() as usize,
            sorted: raw_count > 0,
            entries: header + 3,
        }
    }

    fn compare_entry(&self, game: &Game, index: usize, key: &[u16]) -> Ordering {
        let addr = self.entries + index as u32 * self.entry_len;
        key.iter()
            .enumerate()
            .map(|(i, k)| game.read_word(addr + 2 * i as u32).cmp(k))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }

    /// Address of the entry for an encoded word, or 0
    pub fn lookup(&self, game: &Game, key: &[u16]) -> u16 {
        let found = if self.sorted {
            let (mut low, mut high) = (0usize, self.count);
            let mut hit = None;
            while low < high {
                let mid = (low + high) / 2;
                match self.compare_entry(game, mid, key) {
                    Ordering::Less => low = mid + 1,
                    Ordering::Greater => high = mid,
                    Ordering::Equal => {
                        hit = Some(mid);
                        break;
                    }
                }
            }
            hit
        } else {
            (0..self.count).find(|&i| self.compare_entry(game, i, key) == Ordering::Equal)
        };
        found
            .map(|i| (self.entries + i as u32 * self.entry_len) as u16)
            .unwrap_or(0)
    }
}

/// Where the text to tokenise lives
#[derive(Debug, Clone, Copy)]
pub struct TextBuffer {
    /// Address of the text buffer (positions are relative to it)
    pub base: u32,
    /// Address of the first character
    pub start: u32,
    pub len: usize,
}

/// Tokenise a text buffer into a parse buffer
pub fn tokenise(
    game: &mut Game,
    codec: &ZsciiCodec,
    text: TextBuffer,
    parse: u32,
    dictionary_addr: u32,
    skip_unknown: bool,
) -> Result<(), VmError> {
    let dictionary = Dictionary::new(game, dictionary_addr);
    let bytes: Vec<u8> = (0..text.len as u32)
        .map(|i| game.read_byte(text.start + i))
        .collect();
    let tokens = split_tokens(&bytes, &dictionary.separators);
    let max_words = game.read_byte(parse) as usize;
    let offset = (text.start - text.base) as usize;

    debug!(
        "Tokenising {:?} into {} words (max {})",
        String::from_utf8_lossy(&bytes),
        tokens.len(),
        max_words
    );

    let words = tokens.len().min(max_words);
    game.write_byte(parse + 1, words as u8)?;
    for (i, token) in tokens.iter().take(words).enumerate() {
        let key = codec.encode_word(&token.text);
        let found = dictionary.lookup(game, &key);
        trace!(
            "Token {:?} at {} -> 0x{:04x}",
            String::from_utf8_lossy(&token.text),
            token.start,
            found
        );
        if found == 0 && skip_unknown {
            continue;
        }
        let entry = parse + 2 + 4 * i as u32;
        game.write_word(entry, found)?;
        game.write_byte(entry + 2, token.text.len() as u8)?;
        game.write_byte(entry + 3, (offset + token.start) as u8)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{StoryBuilder, DICTIONARY, SCRATCH};
    use test_log::test;

    #[test]
    fn test_split_on_spaces_and_separators() {
        let tokens = split_tokens(b"  take lamp,then go", b",.");
        let texts: Vec<&[u8]> = tokens.iter().map(|t| t.text.as_slice()).collect();
        assert_eq!(texts, vec![&b"take"[..], b"lamp", b",", b"then", b"go"]);
        assert_eq!(tokens[1].start, 7);
        assert_eq!(tokens[2].start, 11);
    }

    fn story(version: u8) -> (StoryBuilder, Game) {
        let mut story = StoryBuilder::new(version);
        story.dictionary(b",", &["lamp", "take", "lantern", ","]);
        let game = Game::from_memory(story.build()).unwrap();
        (story, game)
    }

    #[test]
    fn test_sorted_lookup() {
        let (story, game) = story(3);
        let codec = ZsciiCodec::new(&game.memory, &game.header);
        let dict = Dictionary::new(&game, DICTIONARY as u32);
        assert_eq!(dict.lookup(&game, &codec.encode_word(b"take")), story.dictionary_entry("take"));
        assert_eq!(dict.lookup(&game, &codec.encode_word(b"lanterns")), story.dictionary_entry("lantern"));
        assert_eq!(dict.lookup(&game, &codec.encode_word(b"xyzzy")), 0);
    }

    #[test]
    fn test_unsorted_dictionary_uses_linear_search() {
        let (story, mut game) = story(5);
        let count_addr = DICTIONARY as u32 + 1 + 1 + 1;
        let count = game.read_word(count_addr) as i16;
        game.memory[count_addr as usize..count_addr as usize + 2]
            .copy_from_slice(&(-count).to_be_bytes());
        let codec = ZsciiCodec::new(&game.memory, &game.header);
        let dict = Dictionary::new(&game, DICTIONARY as u32);
        assert_eq!(dict.lookup(&game, &codec.encode_word(b"lamp")), story.dictionary_entry("lamp"));
    }

    #[test]
    fn test_tokenise_writes_parse_buffer() {
        let (story, mut game) = story(3);
        let codec = ZsciiCodec::new(&game.memory, &game.header);
        let text = SCRATCH as u32;
        let parse = SCRATCH as u32 + 0x40;
        let input = b"take lamp,xyzzy";
        game.memory[text as usize + 1..text as usize + 1 + input.len()].copy_from_slice(input);
        game.memory[parse as usize] = 10;

        let buffer = TextBuffer {
            base: text,
            start: text + 1,
            len: input.len(),
        };
        tokenise(&mut game, &codec, buffer, parse, DICTIONARY as u32, false).unwrap();

        assert_eq!(game.read_byte(parse + 1), 4);
        assert_eq!(game.read_word(parse + 2), story.dictionary_entry("take"));
        assert_eq!(game.read_byte(parse + 4), 4);
        assert_eq!(game.read_byte(parse + 5), 1);
        assert_eq!(game.read_word(parse + 6), story.dictionary_entry("lamp"));
        assert_eq!(game.read_byte(parse + 9), 6);
        assert_eq!(game.read_word(parse + 10), story.dictionary_entry(","));
        assert_eq!(game.read_word(parse + 14), 0);
        assert_eq!(game.read_byte(parse + 16), 5);
    }

    #[test]
    fn test_tokenise_skip_unknown_leaves_slot() {
        let (_, mut game) = story(3);
        let codec = ZsciiCodec::new(&game.memory, &game.header);
        let text = SCRATCH as u32;
        let parse = SCRATCH as u32 + 0x40;
        let input = b"xyzzy";
        game.memory[text as usize + 1..text as usize + 1 + input.len()].copy_from_slice(input);
        game.memory[parse as usize] = 10;
        game.memory[parse as usize + 2] = 0xaa;

        let buffer = TextBuffer {
            base: text,
            start: text + 1,
            len: input.len(),
        };
        tokenise(&mut game, &codec, buffer, parse, DICTIONARY as u32, true).unwrap();
        assert_eq!(game.read_byte(parse + 1), 1);
        assert_eq!(game.read_byte(parse + 2), 0xaa);
    }
}
