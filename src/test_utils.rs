//! Story image builder for tests
//!
//! Lays out a small story with a fixed memory map:
//!
//! ```text
//! 0x0040  abbreviation table
//! 0x0100  property defaults + object records
//! 0x0300  property tables
//! 0x0500  globals
//! 0x0700  scratch area (buffers, arrays)
//! 0x1000  static memory: dictionary
//! 0x1400  high memory: code and strings
//! ```

use crate::config::InterpreterConfig;
use crate::display_headless::{HeadlessDisplay, HeadlessHandle};
use crate::game::Game;
use crate::header::Header;
use crate::interpreter::Interpreter;
use crate::text::ZsciiCodec;

pub const ABBREVIATIONS: usize = 0x40;
pub const OBJECTS: usize = 0x100;
pub const PROPERTY_AREA: usize = 0x300;
pub const GLOBALS: usize = 0x500;
pub const SCRATCH: usize = 0x700;
pub const STATIC_BASE: usize = 0x1000;
pub const DICTIONARY: usize = 0x1000;
pub const CODE: usize = 0x1400;
const STORY_SIZE: usize = 0x4000;

pub struct StoryBuilder {
    memory: Vec<u8>,
    version: u8,
    next_property: usize,
    next_code: usize,
}

impl StoryBuilder {
    pub fn new(version: u8) -> Self {
        let mut memory = vec![0u8; STORY_SIZE];
        memory[0x00] = version;
        put_word(&mut memory, 0x02, 1); // release
        put_word(&mut memory, 0x04, CODE as u16);
        put_word(&mut memory, 0x06, CODE as u16);
        put_word(&mut memory, 0x08, DICTIONARY as u16);
        put_word(&mut memory, 0x0a, OBJECTS as u16);
        put_word(&mut memory, 0x0c, GLOBALS as u16);
        put_word(&mut memory, 0x0e, STATIC_BASE as u16);
        memory[0x12..0x18].copy_from_slice(b"240101");
        put_word(&mut memory, 0x18, ABBREVIATIONS as u16);
        let scale = match version {
            1..=3 => 2,
            4 | 5 => 4,
            _ => 8,
        };
        put_word(&mut memory, 0x1a, (STORY_SIZE / scale) as u16);

        // empty dictionary: no separators, 7-byte entries, 0 words
        memory[DICTIONARY] = 0;
        memory[DICTIONARY + 1] = if version <= 3 { 7 } else { 9 };

        StoryBuilder {
            memory,
            version,
            next_property: PROPERTY_AREA,
            next_code: CODE,
        }
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    fn codec(&self) -> ZsciiCodec {
        ZsciiCodec::new(&self.memory, &Header::new(&self.memory))
    }

    fn object_record(&self, num: u16) -> usize {
        let (defaults, size) = if self.version <= 3 { (31, 9) } else { (63, 14) };
        OBJECTS + defaults * 2 + (num as usize - 1) * size
    }

    /// Set an object's tree links
    pub fn object(&mut self, num: u16, parent: u16, sibling: u16, child: u16) -> &mut Self {
        let rec = self.object_record(num);
        if self.version <= 3 {
            self.memory[rec + 4] = parent as u8;
            self.memory[rec + 5] = sibling as u8;
            self.memory[rec + 6] = child as u8;
        } else {
            put_word(&mut self.memory, rec + 6, parent);
            put_word(&mut self.memory, rec + 8, sibling);
            put_word(&mut self.memory, rec + 10, child);
        }
        self
    }

    pub fn attribute(&mut self, num: u16, attr: u8) -> &mut Self {
        let rec = self.object_record(num);
        self.memory[rec + attr as usize / 8] |= 0x80 >> (attr % 8);
        self
    }

    pub fn properties(&mut self, num: u16, props: &[(u8, &[u8])]) -> &mut Self {
        self.properties_named(num, "", props)
    }

    /// Write a property table (properties given in descending order)
    pub fn properties_named(&mut self, num: u16, name: &str, props: &[(u8, &[u8])]) -> &mut Self {
        let table = self.next_property;
        let name_words = if name.is_empty() {
            Vec::new()
        } else {
            self.codec().encode_string(name)
        };
        let mut at = table;
        self.memory[at] = name_words.len() as u8;
        at += 1;
        for w in &name_words {
            put_word(&mut self.memory, at, *w);
            at += 2;
        }
        for (prop, data) in props {
            if self.version <= 3 {
                self.memory[at] = ((data.len() as u8 - 1) << 5) | prop;
                at += 1;
            } else if data.len() <= 2 {
                self.memory[at] = prop | if data.len() == 2 { 0x40 } else { 0 };
                at += 1;
            } else {
                self.memory[at] = 0x80 | prop;
                self.memory[at + 1] = 0x80 | data.len() as u8;
                at += 2;
            }
            self.memory[at..at + data.len()].copy_from_slice(data);
            at += data.len();
        }
        self.memory[at] = 0;
        self.next_property = at + 1;

        let rec = self.object_record(num);
        let offset = if self.version <= 3 { 7 } else { 12 };
        put_word(&mut self.memory, rec + offset, table as u16);
        self
    }

    pub fn property_default(&mut self, prop: u8, value: u16) -> &mut Self {
        put_word(&mut self.memory, OBJECTS + 2 * (prop as usize - 1), value);
        self
    }

    /// Set global variable `index` (variable number `index + 16`)
    pub fn global(&mut self, index: u8, value: u16) -> &mut Self {
        put_word(&mut self.memory, GLOBALS + 2 * index as usize, value);
        self
    }

    pub fn bytes(&mut self, addr: usize, data: &[u8]) -> &mut Self {
        self.memory[addr..addr + data.len()].copy_from_slice(data);
        self
    }

    pub fn word(&mut self, addr: usize, value: u16) -> &mut Self {
        put_word(&mut self.memory, addr, value);
        self
    }

    /// Write a sorted dictionary with the given separators
    pub fn dictionary(&mut self, separators: &[u8], words: &[&str]) -> &mut Self {
        let codec = self.codec();
        let mut encoded: Vec<Vec<u16>> = words.iter().map(|w| codec.encode_word(w.as_bytes())).collect();
        encoded.sort();
        let entry_len = encoded.first().map(|e| e.len() * 2 + 1).unwrap_or(7);

        let mut at = DICTIONARY;
        self.memory[at] = separators.len() as u8;
        at += 1;
        self.memory[at..at + separators.len()].copy_from_slice(separators);
        at += separators.len();
        self.memory[at] = entry_len as u8;
        put_word(&mut self.memory, at + 1, encoded.len() as u16);
        at += 3;
        for e in &encoded {
            for w in e {
                put_word(&mut self.memory, at, *w);
                at += 2;
            }
            self.memory[at] = 0;
            at += 1;
        }
        self
    }

    /// Address of a dictionary word as written by `dictionary`
    pub fn dictionary_entry(&self, word: &str) -> u16 {
        let codec = self.codec();
        let target = codec.encode_word(word.as_bytes());
        let seps = self.memory[DICTIONARY] as usize;
        let entry_len = self.memory[DICTIONARY + 1 + seps] as usize;
        let count = get_word(&self.memory, DICTIONARY + 2 + seps) as usize;
        let start = DICTIONARY + 4 + seps;
        (0..count)
            .map(|i| start + i * entry_len)
            .find(|&addr| (0..target.len()).all(|j| get_word(&self.memory, addr + 2 * j) == target[j]))
            .map(|a| a as u16)
            .unwrap_or(0)
    }

    fn align_code(&mut self) {
        let align = match self.version {
            1..=3 => 2,
            4..=7 => 4,
            _ => 8,
        };
        while self.next_code % align != 0 {
            self.next_code += 1;
        }
    }

    fn pack(&self, addr: usize) -> u16 {
        let scale = match self.version {
            1..=3 => 2,
            4..=7 => 4,
            _ => 8,
        };
        (addr / scale) as u16
    }

    /// Append raw code, returning its byte address
    pub fn code(&mut self, code: &[u8]) -> usize {
        let addr = self.next_code;
        self.memory[addr..addr + code.len()].copy_from_slice(code);
        self.next_code += code.len();
        addr
    }

    /// Append a routine, returning its packed address. Initial values are
    /// only stored before v5.
    pub fn routine(&mut self, locals: &[u16], body: &[u8]) -> u16 {
        self.align_code();
        let addr = self.next_code;
        let mut header = vec![locals.len() as u8];
        if self.version < 5 {
            for l in locals {
                header.extend_from_slice(&l.to_be_bytes());
            }
        }
        self.code(&header);
        self.code(body);
        self.pack(addr)
    }

    /// Append an encoded string, returning its packed address
    pub fn string(&mut self, text: &str) -> u16 {
        self.align_code();
        let addr = self.next_code;
        for w in self.codec().encode_string(text) {
            self.code(&w.to_be_bytes());
        }
        self.pack(addr)
    }

    pub fn initial_pc(&mut self, addr: usize) -> &mut Self {
        put_word(&mut self.memory, 0x06, addr as u16);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        self.memory.clone()
    }
}

/// Interpreter over a 40x10 headless display with a fixed random seed
pub fn interpreter(story: &StoryBuilder) -> (Interpreter, HeadlessHandle) {
    let display = HeadlessDisplay::new(40, 10);
    let handle = display.handle();
    let config = InterpreterConfig {
        random_seed: Some(1),
        ..InterpreterConfig::default()
    };
    let game = Game::from_memory(story.build()).expect("story image loads");
    let interpreter =
        Interpreter::new(game, Box::new(display), config).expect("interpreter starts");
    (interpreter, handle)
}

fn put_word(memory: &mut [u8], addr: usize, value: u16) {
    memory[addr] = (value >> 8) as u8;
    memory[addr + 1] = (value & 0xff) as u8;
}

fn get_word(memory: &[u8], addr: usize) -> u16 {
    ((memory[addr] as u16) << 8) | memory[addr + 1] as u16
}
