//! IFF (Interchange File Format) handling for Quetzal files

use std::io::{Read, Write};

/// IFF file structure
pub struct IffFile {
    /// Form type - should be "IFZS" for Quetzal
    pub form_type: [u8; 4],
    /// List of chunks in the file
    pub chunks: Vec<IffChunk>,
}

/// Individual chunk in an IFF file
pub struct IffChunk {
    /// 4-character chunk type identifier
    pub chunk_type: [u8; 4],
    pub data: Vec<u8>,
}

impl Default for IffFile {
    fn default() -> Self {
        Self::new()
    }
}

impl IffFile {
    /// Create a new Quetzal IFF file
    pub fn new() -> Self {
        IffFile {
            form_type: *b"IFZS",
            chunks: Vec::new(),
        }
    }

    pub fn add_chunk(&mut self, chunk_type: [u8; 4], data: Vec<u8>) {
        self.chunks.push(IffChunk { chunk_type, data });
    }

    /// Serialise the whole FORM
    pub fn to_bytes(&self) -> Vec<u8> {
        // form type plus each chunk's header, data and pad byte
        let total_size = 4 + self
            .chunks
            .iter()
            .map(|c| 8 + c.data.len() + c.data.len() % 2)
            .sum::<usize>();

        let mut out = Vec::with_capacity(8 + total_size);
        out.extend_from_slice(b"FORM");
        out.extend_from_slice(&(total_size as u32).to_be_bytes());
        out.extend_from_slice(&self.form_type);
        for chunk in &self.chunks {
            out.extend_from_slice(&chunk.chunk_type);
            out.extend_from_slice(&(chunk.data.len() as u32).to_be_bytes());
            out.extend_from_slice(&chunk.data);
            if chunk.data.len() % 2 == 1 {
                out.push(0);
            }
        }
        out
    }

    pub fn write<W: Write + ?Sized>(&self, writer: &mut W) -> Result<(), String> {
        writer
            .write_all(&self.to_bytes())
            .and_then(|_| writer.flush())
            .map_err(|e| format!("Failed to write save file: {}", e))
    }

    /// Read an IFF file from a stream
    pub fn read<R: Read + ?Sized>(reader: &mut R) -> Result<Self, String> {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|e| format!("Failed to read save file: {}", e))?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, String> {
        if bytes.len() < 12 || &bytes[0..4] != b"FORM" {
            return Err("Not an IFF file (missing FORM header)".to_string());
        }
        let declared = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
        let end = (8 + declared).min(bytes.len());

        let mut iff = IffFile {
            form_type: [bytes[8], bytes[9], bytes[10], bytes[11]],
            chunks: Vec::new(),
        };

        let mut offset = 12;
        while offset + 8 <= end {
            let chunk_type = [
                bytes[offset],
                bytes[offset + 1],
                bytes[offset + 2],
                bytes[offset + 3],
            ];
            let size = u32::from_be_bytes([
                bytes[offset + 4],
                bytes[offset + 5],
                bytes[offset + 6],
                bytes[offset + 7],
            ]) as usize;
            offset += 8;
            let data = bytes
                .get(offset..offset + size)
                .ok_or_else(|| {
                    format!(
                        "Chunk {} truncated",
                        String::from_utf8_lossy(&chunk_type)
                    )
                })?
                .to_vec();
            iff.chunks.push(IffChunk { chunk_type, data });
            offset += size + size % 2;
        }

        Ok(iff)
    }

    /// Find a chunk by type
    pub fn find_chunk(&self, chunk_type: &[u8; 4]) -> Option<&IffChunk> {
        self.chunks.iter().find(|c| &c.chunk_type == chunk_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_odd_chunks_are_padded() {
        let mut iff = IffFile::new();
        iff.add_chunk(*b"ABCD", vec![1, 2, 3]);
        iff.add_chunk(*b"EFGH", vec![4, 5]);
        let bytes = iff.to_bytes();
        assert_eq!(&bytes[0..4], b"FORM");
        assert_eq!(u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]), 4 + 12 + 10);
        assert_eq!(bytes.len(), 8 + 4 + 12 + 10);

        let back = IffFile::from_bytes(&bytes).unwrap();
        assert_eq!(&back.form_type, b"IFZS");
        assert_eq!(back.find_chunk(b"ABCD").unwrap().data, vec![1, 2, 3]);
        assert_eq!(back.find_chunk(b"EFGH").unwrap().data, vec![4, 5]);
        assert!(back.find_chunk(b"IJKL").is_none());
    }

    #[test]
    fn test_rejects_non_iff() {
        assert!(IffFile::from_bytes(b"GIF89a......").is_err());
        let mut truncated = IffFile::new();
        truncated.add_chunk(*b"ABCD", vec![0; 10]);
        let bytes = truncated.to_bytes();
        assert!(IffFile::from_bytes(&bytes[..bytes.len() - 4]).is_err());
    }
}
