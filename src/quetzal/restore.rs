//! Restore game functionality for Quetzal format

use crate::game::Game;
use crate::quetzal::chunks::{IFhdChunk, StksChunk};
use crate::quetzal::compressed_memory::decompress_memory;
use crate::quetzal::iff::IffFile;
use crate::snapshot::Snapshot;
use log::{debug, info};
use std::io::Read;

/// RestoreGame handles loading Quetzal save files
pub struct RestoreGame {
    iff: IffFile,
}

impl RestoreGame {
    pub fn from_reader<R: Read + ?Sized>(reader: &mut R) -> Result<Self, String> {
        Self::from_iff(IffFile::read(reader)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, String> {
        Self::from_iff(IffFile::from_bytes(bytes)?)
    }

    fn from_iff(iff: IffFile) -> Result<Self, String> {
        if &iff.form_type != b"IFZS" {
            return Err(format!(
                "Not a Quetzal save file (found form type {:?})",
                String::from_utf8_lossy(&iff.form_type)
            ));
        }
        if iff.find_chunk(b"IFhd").is_none() {
            return Err("Missing required IFhd chunk".to_string());
        }
        if iff.find_chunk(b"CMem").is_none() && iff.find_chunk(b"UMem").is_none() {
            return Err("Missing memory chunk (CMem or UMem)".to_string());
        }
        if iff.find_chunk(b"Stks").is_none() {
            return Err("Missing required Stks chunk".to_string());
        }
        Ok(RestoreGame { iff })
    }

    /// Check the save against the story and rebuild the snapshot it holds
    pub fn to_snapshot(&self, game: &Game) -> Result<Snapshot, String> {
        let ifhd = self
            .iff
            .find_chunk(b"IFhd")
            .ok_or_else(|| "Missing IFhd chunk".to_string())
            .and_then(|c| IFhdChunk::from_bytes(&c.data))?;
        ifhd.matches(game)?;

        let dynamic = if let Some(cmem) = self.iff.find_chunk(b"CMem") {
            debug!("Restoring from CMem chunk");
            decompress_memory(&cmem.data, &game.original_memory)?
        } else if let Some(umem) = self.iff.find_chunk(b"UMem") {
            debug!("Restoring from UMem chunk");
            umem.data.clone()
        } else {
            return Err("Missing memory chunk (CMem or UMem)".to_string());
        };
        if dynamic.len() != game.dynamic_size() {
            return Err(format!(
                "Saved memory size {} doesn't match dynamic memory size {}",
                dynamic.len(),
                game.dynamic_size()
            ));
        }

        let stks = self.iff.find_chunk(b"Stks").ok_or("Missing Stks chunk")?;
        let frames = StksChunk {
            data: stks.data.clone(),
        }
        .to_frames()?;
        debug!("Restored {} call frames", frames.len());

        info!("Save file accepted, saved PC 0x{:05x}", ifhd.pc);
        Ok(Snapshot {
            dynamic,
            frames,
            pc: ifhd.pc,
        })
    }
}
