//! Quetzal chunk definitions

use crate::game::Game;
use crate::vm::{CallFrame, MAX_LOCALS};

/// Discard-result bit in a Stks frame's flags byte
const FLAG_DISCARD: u8 = 0x10;

/// IFhd chunk - identifies the story a save belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IFhdChunk {
    pub release: u16,
    pub serial: [u8; 6],
    pub checksum: u16,
    /// Resume PC (3 bytes on disk)
    pub pc: u32,
}

impl IFhdChunk {
    pub fn new(game: &Game, pc: u32) -> Self {
        IFhdChunk {
            release: game.header.release,
            serial: game.header.serial,
            checksum: game.header.checksum_file,
            pc,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(13);
        bytes.extend_from_slice(&self.release.to_be_bytes());
        bytes.extend_from_slice(&self.serial);
        bytes.extend_from_slice(&self.checksum.to_be_bytes());
        bytes.extend_from_slice(&self.pc.to_be_bytes()[1..]);
        bytes
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, String> {
        if data.len() < 13 {
            return Err("IFhd chunk too small".to_string());
        }
        let mut serial = [0u8; 6];
        serial.copy_from_slice(&data[2..8]);
        Ok(IFhdChunk {
            release: u16::from_be_bytes([data[0], data[1]]),
            serial,
            checksum: u16::from_be_bytes([data[8], data[9]]),
            pc: u32::from_be_bytes([0, data[10], data[11], data[12]]),
        })
    }

    /// Whether this save was made by the given story
    pub fn matches(&self, game: &Game) -> Result<(), String> {
        if self.release != game.header.release {
            return Err(format!(
                "Save file is for release {}, but game is release {}",
                self.release, game.header.release
            ));
        }
        if self.serial != game.header.serial {
            return Err(format!(
                "Save file serial {} does not match game serial {}",
                String::from_utf8_lossy(&self.serial),
                game.header.serial_string()
            ));
        }
        if self.checksum != game.header.checksum_file {
            return Err(format!(
                "Save file checksum 0x{:04x} does not match game checksum 0x{:04x}",
                self.checksum, game.header.checksum_file
            ));
        }
        Ok(())
    }
}

/// Stks chunk - call frames, outermost first
pub struct StksChunk {
    pub data: Vec<u8>,
}

impl StksChunk {
    pub fn from_frames(frames: &[CallFrame]) -> Self {
        let mut data = Vec::new();
        for frame in frames {
            data.extend_from_slice(&frame.return_pc.to_be_bytes()[1..]);
            let mut flags = frame.locals.len() as u8 & 0x0f;
            if frame.return_store.is_none() {
                flags |= FLAG_DISCARD;
            }
            data.push(flags);
            data.push(frame.return_store.unwrap_or(0));
            data.push(frame.arg_mask);
            data.extend_from_slice(&(frame.stack.len() as u16).to_be_bytes());
            for local in &frame.locals {
                data.extend_from_slice(&local.to_be_bytes());
            }
            for value in &frame.stack {
                data.extend_from_slice(&value.to_be_bytes());
            }
        }
        StksChunk { data }
    }

    pub fn to_frames(&self) -> Result<Vec<CallFrame>, String> {
        let data = &self.data;
        let mut frames = Vec::new();
        let mut offset = 0;

        let word_at = |at: usize| -> Result<u16, String> {
            data.get(at..at + 2)
                .map(|b| u16::from_be_bytes([b[0], b[1]]))
                .ok_or_else(|| "Incomplete stack frame".to_string())
        };

        while offset < data.len() {
            let header = data
                .get(offset..offset + 8)
                .ok_or("Incomplete stack frame")?;
            let return_pc = u32::from_be_bytes([0, header[0], header[1], header[2]]);
            let flags = header[3];
            let store = header[4];
            let arg_mask = header[5];
            let stack_count = u16::from_be_bytes([header[6], header[7]]) as usize;
            offset += 8;

            let local_count = (flags & 0x0f) as usize;
            if local_count > MAX_LOCALS {
                return Err(format!("Frame declares {} locals", local_count));
            }
            let locals = (0..local_count)
                .map(|i| word_at(offset + 2 * i))
                .collect::<Result<Vec<_>, _>>()?;
            offset += 2 * local_count;
            let stack = (0..stack_count)
                .map(|i| word_at(offset + 2 * i))
                .collect::<Result<Vec<_>, _>>()?;
            offset += 2 * stack_count;

            frames.push(CallFrame {
                return_pc,
                return_store: if flags & FLAG_DISCARD != 0 {
                    None
                } else {
                    Some(store)
                },
                locals,
                stack,
                arg_mask,
            });
        }

        if frames.is_empty() {
            return Err("Stks chunk holds no frames".to_string());
        }
        Ok(frames)
    }
}
