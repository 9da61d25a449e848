use std::fmt::Display;
use std::fmt::Error;
use std::fmt::Formatter;

/// Flags 1 bit: status line shows hours:minutes (v1-3)
pub const FLAGS1_TIME_GAME: u8 = 0x02;
/// Flags 1 bit: status line not available (v1-3)
pub const FLAGS1_NO_STATUS_LINE: u8 = 0x10;
/// Flags 1 bit: screen splitting available (v1-3)
pub const FLAGS1_SPLIT_AVAILABLE: u8 = 0x20;
/// Flags 1 bits for v4+: colours, bold, italic, fixed-space, timed input
pub const FLAGS1_V4_CAPABILITIES: u8 = 0x01 | 0x04 | 0x08 | 0x10 | 0x80;
/// Flags 2 bit: transcripting is on
pub const FLAGS2_TRANSCRIPT: u16 = 0x0001;
/// Flags 2 bit: force fixed-pitch printing
pub const FLAGS2_FIXED_PITCH: u16 = 0x0002;

fn word_at(bytes: &[u8], offset: usize) -> u16 {
    ((bytes[offset] as u16) << 8) | bytes[offset + 1] as u16
}

/// Story file header (bytes 0-63) decoded into named fields
#[derive(Debug, Clone)]
pub struct Header {
    pub version: u8,
    pub flags1: u8,
    pub release: u16,
    pub serial: [u8; 6],
    pub base_high_mem: u16,
    pub base_static_mem: u16,
    pub initial_pc: u16,
    pub dictionary: u16,
    pub object_table_addr: u16,
    pub global_variables: u16,
    pub flags2: u16,
    pub abbrev_table: u16,
    pub len_file: usize,
    pub checksum_file: u16,
    pub routine_offset: u16,
    pub string_offset: u16,
    pub alphabet_table: u16,
    pub header_extension: u16,
}

impl Header {
    /// Decode the header; the caller guarantees at least 64 bytes
    pub fn new(bytes: &[u8]) -> Header {
        let version = bytes[0];
        let mut serial = [0u8; 6];
        serial.copy_from_slice(&bytes[0x12..0x18]);

        // File length is stored divided by a version-dependent scale
        let scale = match version {
            1..=3 => 2,
            4 | 5 => 4,
            _ => 8,
        };

        Header {
            version,
            flags1: bytes[0x01],
            release: word_at(bytes, 0x02),
            serial,
            base_high_mem: word_at(bytes, 0x04),
            base_static_mem: word_at(bytes, 0x0e),
            initial_pc: word_at(bytes, 0x06),
            dictionary: word_at(bytes, 0x08),
            object_table_addr: word_at(bytes, 0x0a),
            global_variables: word_at(bytes, 0x0c),
            flags2: word_at(bytes, 0x10),
            abbrev_table: word_at(bytes, 0x18),
            len_file: word_at(bytes, 0x1a) as usize * scale,
            checksum_file: word_at(bytes, 0x1c),
            routine_offset: word_at(bytes, 0x28),
            string_offset: word_at(bytes, 0x2a),
            alphabet_table: if version >= 5 {
                word_at(bytes, 0x34)
            } else {
                0
            },
            header_extension: if version >= 5 {
                word_at(bytes, 0x36)
            } else {
                0
            },
        }
    }

    /// Multiplier turning a packed address into a byte address
    pub fn packed_multiplier(&self) -> u32 {
        match self.version {
            1..=3 => 2,
            4..=7 => 4,
            _ => 8,
        }
    }

    /// Unpack a routine address, applying the v6/7 routine offset
    pub fn unpack_routine(&self, packed: u16) -> u32 {
        let base = packed as u32 * self.packed_multiplier();
        match self.version {
            6 | 7 => base + 8 * self.routine_offset as u32,
            _ => base,
        }
    }

    /// Unpack a string address, applying the v6/7 string offset
    pub fn unpack_string(&self, packed: u16) -> u32 {
        let base = packed as u32 * self.packed_multiplier();
        match self.version {
            6 | 7 => base + 8 * self.string_offset as u32,
            _ => base,
        }
    }

    /// Number of entries in the property defaults table
    pub fn property_defaults_count(&self) -> usize {
        if self.version <= 3 {
            31
        } else {
            63
        }
    }

    pub fn serial_string(&self) -> String {
        self.serial.iter().map(|b| *b as char).collect()
    }
}

impl Display for Header {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(
            f,
            "
Z-code version:           {}
Release number:           {}
Size of resident memory:  {:#06x}
Start PC:                 {:#06x}
Dictionary address:       {:#06x}
Object table address:     {:#06x}
Global variables address: {:#06x}
Size of dynamic memory:   {:#06x}
Serial number:            {}
Abbreviations address:    {:#06x}
File size:                {:#06x}
Checksum:                 {:#06x}
",
            self.version,
            self.release,
            self.base_high_mem,
            self.initial_pc,
            self.dictionary,
            self.object_table_addr,
            self.global_variables,
            self.base_static_mem,
            self.serial_string(),
            self.abbrev_table,
            self.len_file,
            self.checksum_file,
        )
    }
}
