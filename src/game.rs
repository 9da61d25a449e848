//! Story memory image
//!
//! Owns the byte buffer loaded from the story file together with the parsed
//! header and a pristine copy of dynamic memory for restart, verify and
//! compressed saves.

use crate::error::VmError;
use crate::header::Header;
use log::{debug, info};

/// A loaded story with owned memory
pub struct Game {
    /// The raw story memory
    pub memory: Vec<u8>,
    /// The parsed header
    pub header: Header,
    /// Dynamic memory as it was at load time
    pub original_memory: Vec<u8>,
    /// Checksum over the untouched file image, computed at load
    file_checksum: u16,
}

impl Game {
    /// Create a new game from story file bytes
    pub fn from_memory(memory: Vec<u8>) -> Result<Self, VmError> {
        if memory.len() < 64 {
            return Err(VmError::Load("Game file too small for header".to_string()));
        }
        let header = Header::new(&memory);
        if header.version == 0 || header.version > 8 {
            return Err(VmError::Load(format!(
                "Unsupported story version {}",
                header.version
            )));
        }

        let static_base = header.base_static_mem as usize;
        if static_base < 64 || static_base > memory.len() {
            return Err(VmError::Load(format!(
                "Static memory base 0x{:04x} outside story of {} bytes",
                static_base,
                memory.len()
            )));
        }

        let file_checksum = checksum(&memory, header.len_file);
        let original_memory = memory[..static_base].to_vec();
        info!(
            "Loaded v{} story release {} serial {} ({} bytes, {} dynamic)",
            header.version,
            header.release,
            header.serial_string(),
            memory.len(),
            static_base
        );

        Ok(Game {
            memory,
            header,
            original_memory,
            file_checksum,
        })
    }

    pub fn version(&self) -> u8 {
        self.header.version
    }

    /// Size of the writable region at the bottom of memory
    pub fn dynamic_size(&self) -> usize {
        self.original_memory.len()
    }

    /// Read a byte; addresses past the end read as 0
    pub fn read_byte(&self, addr: u32) -> u8 {
        self.memory.get(addr as usize).copied().unwrap_or(0)
    }

    /// Read a big-endian word
    pub fn read_word(&self, addr: u32) -> u16 {
        ((self.read_byte(addr) as u16) << 8) | self.read_byte(addr + 1) as u16
    }

    /// Write a byte into dynamic memory
    pub fn write_byte(&mut self, addr: u32, value: u8) -> Result<(), VmError> {
        if addr as usize >= self.dynamic_size() {
            return Err(VmError::Memory(format!(
                "Attempt to write to non-dynamic memory at {:04x}",
                addr
            )));
        }
        self.memory[addr as usize] = value;
        Ok(())
    }

    /// Write a big-endian word into dynamic memory
    pub fn write_word(&mut self, addr: u32, value: u16) -> Result<(), VmError> {
        self.write_byte(addr, (value >> 8) as u8)?;
        self.write_byte(addr + 1, (value & 0xff) as u8)
    }

    /// Copy of the current dynamic region
    pub fn dynamic_memory(&self) -> Vec<u8> {
        self.memory[..self.dynamic_size()].to_vec()
    }

    /// Replace the dynamic region with a previously captured image
    pub fn load_dynamic_memory(&mut self, bytes: &[u8]) -> Result<(), VmError> {
        if bytes.len() != self.dynamic_size() {
            return Err(VmError::Memory(format!(
                "Dynamic image of {} bytes does not match story ({} bytes)",
                bytes.len(),
                self.dynamic_size()
            )));
        }
        self.memory[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Reload dynamic memory from the pristine copy
    pub fn reset_dynamic_memory(&mut self) {
        let size = self.dynamic_size();
        self.memory[..size].copy_from_slice(&self.original_memory);
        debug!("Dynamic memory reset ({} bytes)", size);
    }

    /// Whether the story file checksum in the header matches the file
    pub fn verify(&self) -> bool {
        self.file_checksum == self.header.checksum_file
    }
}

/// Sum of bytes from 0x40 to the declared file length, modulo 2^16
fn checksum(memory: &[u8], declared_len: usize) -> u16 {
    let end = if declared_len == 0 {
        memory.len()
    } else {
        declared_len.min(memory.len())
    };
    memory
        .get(0x40..end)
        .unwrap_or(&[])
        .iter()
        .fold(0u16, |sum, b| sum.wrapping_add(*b as u16))
}
