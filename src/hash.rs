//! Weak rolling hash, strong content hash, and whole-file checksums over
//! fixed-size blocks.
//!
//! All multi-byte digests are SHA-1, kept deliberately as a concrete choice
//! (not "any ≥160-bit digest") so that this peer is byte-for-byte compatible
//! with another implementation of the same wire protocol.

use sha1::{Digest, Sha1};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Block size in bytes. Fixed by the protocol, not configurable.
pub const BLOCK_SIZE: usize = 256;

/// Chunk size used when streaming a whole-file checksum or a full-file
/// transfer.
pub const IO_CHUNK_SIZE: usize = 8192;

/// A strong (cryptographic) digest over one block.
pub type StrongHash = [u8; 20];

/// The arithmetic weak hash: 5 times the sum of the block's bytes.
///
/// Trivially rolling — callers that slide a window byte-by-byte should use
/// [`RollingHash`] instead of recomputing this from scratch each time.
pub fn weak_hash(block: &[u8]) -> u32 {
    block.iter().fold(0u32, |acc, &b| acc.wrapping_add(5 * b as u32))
}

/// SHA-1 over one block.
pub fn strong_hash(block: &[u8]) -> StrongHash {
    let mut hasher = Sha1::new();
    hasher.update(block);
    hasher.finalize().into()
}

pub fn strong_hash_hex(block: &[u8]) -> String {
    hex::encode(strong_hash(block))
}

/// Incremental weak hash over a sliding window, maintained byte by byte.
///
/// `push` extends the window (used while it is shorter than `BLOCK_SIZE`);
/// `slide` drops the oldest byte and appends a new one once the window is
/// full. Both are O(1).
#[derive(Debug, Clone, Copy, Default)]
pub struct RollingHash {
    sum: u32,
}

impl RollingHash {
    pub fn new() -> Self {
        Self { sum: 0 }
    }

    pub fn value(&self) -> u32 {
        self.sum
    }

    pub fn push(&mut self, incoming: u8) {
        self.sum = self.sum.wrapping_add(5 * incoming as u32);
    }

    pub fn slide(&mut self, outgoing: u8, incoming: u8) {
        self.sum = self
            .sum
            .wrapping_sub(5 * outgoing as u32)
            .wrapping_add(5 * incoming as u32);
    }

    pub fn reset(&mut self) {
        self.sum = 0;
    }
}

/// Reads a file into an ordered sequence of blocks; the final block may be
/// shorter than [`BLOCK_SIZE`].
pub fn read_blocks(path: &Path) -> io::Result<Vec<Vec<u8>>> {
    let mut file = File::open(path)?;
    let mut blocks = Vec::new();
    let mut buf = vec![0u8; BLOCK_SIZE];
    loop {
        let n = read_fill(&mut file, &mut buf)?;
        if n == 0 {
            break;
        }
        blocks.push(buf[..n].to_vec());
        if n < BLOCK_SIZE {
            break;
        }
    }
    Ok(blocks)
}

/// Reads a file into parallel weak/strong hash arrays, one entry per block.
pub fn block_hashes(path: &Path) -> io::Result<(Vec<u32>, Vec<StrongHash>)> {
    let blocks = read_blocks(path)?;
    let weak = blocks.iter().map(|b| weak_hash(b)).collect();
    let strong = blocks.iter().map(|b| strong_hash(b)).collect();
    Ok((weak, strong))
}

/// Streaming SHA-1 over the whole file, hex-encoded.
pub fn whole_file_checksum(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha1::new();
    let mut buf = [0u8; IO_CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Reads up to `buf.len()` bytes, retrying short reads until EOF or full.
fn read_fill(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = file.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}
