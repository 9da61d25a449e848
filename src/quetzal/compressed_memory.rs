//! XOR-RLE compression for Quetzal CMem chunks
//!
//! The compression works by XORing the current memory with the original
//! game file, then run-length encoding the zeros.

use log::debug;

/// Compress dynamic memory using XOR-RLE compression.
/// A trailing run of unchanged bytes is omitted.
pub fn compress_memory(current: &[u8], original: &[u8]) -> Vec<u8> {
    let mut compressed = Vec::new();
    let mut zeros = 0usize;

    for (cur, orig) in current.iter().zip(original) {
        let xor_byte = cur ^ orig;
        if xor_byte == 0 {
            zeros += 1;
            continue;
        }
        push_run(&mut compressed, zeros);
        zeros = 0;
        compressed.push(xor_byte);
    }

    debug!(
        "Compressed {} bytes to {} bytes",
        current.len(),
        compressed.len()
    );
    compressed
}

/// Runs longer than 256 are split
fn push_run(out: &mut Vec<u8>, mut run: usize) {
    while run > 0 {
        let chunk = run.min(256);
        out.push(0);
        out.push((chunk - 1) as u8);
        run -= chunk;
    }
}

/// Decompress memory using XOR-RLE decompression
///
/// This decompresses the RLE data and XORs with the original to get current memory
pub fn decompress_memory(compressed: &[u8], original: &[u8]) -> Result<Vec<u8>, String> {
    let mut decompressed = Vec::with_capacity(original.len());
    let mut bytes = compressed.iter();

    while let Some(&byte) = bytes.next() {
        if byte == 0 {
            let run = *bytes.next().ok_or("Incomplete RLE sequence")? as usize + 1;
            let start = decompressed.len();
            let unchanged = original
                .get(start..start + run)
                .ok_or("RLE run extends beyond memory")?;
            decompressed.extend_from_slice(unchanged);
        } else {
            let orig = original
                .get(decompressed.len())
                .ok_or("Compressed data extends beyond memory")?;
            decompressed.push(orig ^ byte);
        }
    }

    // anything not mentioned is unchanged
    let done = decompressed.len();
    decompressed.extend_from_slice(&original[done..]);
    Ok(decompressed)
}
