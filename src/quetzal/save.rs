//! Save game functionality for Quetzal format

use crate::game::Game;
use crate::quetzal::chunks::{IFhdChunk, StksChunk};
use crate::quetzal::compressed_memory::compress_memory;
use crate::quetzal::iff::IffFile;
use crate::snapshot::Snapshot;
use log::{debug, info};
use std::io::Write;

/// SaveGame assembles the Quetzal chunks for one snapshot
pub struct SaveGame {
    iff: IffFile,
}

impl SaveGame {
    pub fn from_snapshot(snapshot: &Snapshot, game: &Game) -> Self {
        let mut iff = IffFile::new();

        let ifhd = IFhdChunk::new(game, snapshot.pc);
        iff.add_chunk(*b"IFhd", ifhd.to_bytes());

        let cmem = compress_memory(&snapshot.dynamic, &game.original_memory);
        debug!(
            "CMem: {} dynamic bytes compressed to {}",
            snapshot.dynamic.len(),
            cmem.len()
        );
        iff.add_chunk(*b"CMem", cmem);

        let stks = StksChunk::from_frames(&snapshot.frames);
        iff.add_chunk(*b"Stks", stks.data);

        SaveGame { iff }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.iff.to_bytes()
    }

    pub fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> Result<(), String> {
        self.iff.write(writer)?;
        info!("Game saved");
        Ok(())
    }
}
