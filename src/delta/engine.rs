//! The delta-transfer round itself (§4.5): U drives a whole-file checksum
//! fast path, then, if the files differ, a rolling-checksum block match
//! against A's reconstruction of Delta-2.
//!
//! U = the side updating its own copy toward A; A = the side holding the
//! authoritative content for this path. Both roles share one wire protocol;
//! which concrete peer plays which role is decided per-path by the
//! reconciler (§4.7), not fixed to client or server.

use crate::delta::types::{build_delta1, is_unchanged, Delta1, Delta2Item};
use crate::error::{Result, SyncError};
use crate::hash::{self, RollingHash, StrongHash, BLOCK_SIZE};
use crate::transport::{self, FAILURE, SUCCESS};
use crate::wire;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

/// What a delta round settled on for one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaOutcome {
    /// Whole-file checksums already matched; nothing was sent.
    AlreadyInSync,
    /// Delta-2 was entirely identity indices; U's file needed no rewrite.
    Unchanged,
    /// U rewrote its file from A's blocks and literals.
    Updated,
    /// The round could not complete (U's file is missing, or a peer
    /// reported failure); the caller should fall back to a full transfer.
    Failed,
}

/// Runs one delta round from U's side against `local_path`, which must
/// already be known to exist (§4.5.1's open-file gate).
pub fn run_as_u<S: Read + Write>(stream: &mut S, local_path: &Path) -> Result<DeltaOutcome> {
    if !local_path.is_file() {
        transport::send_control(stream, FAILURE)?;
        return Ok(DeltaOutcome::Failed);
    }

    let relative_name = local_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let checksum = hash::whole_file_checksum(local_path)?;
    transport::send_control(stream, SUCCESS)?;
    transport::send_blob(stream, &wire::encode_checksum_pair(&relative_name, &checksum))?;

    let peer_checksum = transport::recv_control(stream)?;
    if peer_checksum == checksum {
        return Ok(DeltaOutcome::AlreadyInSync);
    }

    let blocks = hash::read_blocks(local_path)?;
    let weak: Vec<u32> = blocks.iter().map(|b| hash::weak_hash(b)).collect();
    let strong: Vec<StrongHash> = blocks.iter().map(|b| hash::strong_hash(b)).collect();
    let delta1 = build_delta1(&weak, &strong);

    transport::send_control(stream, SUCCESS)?;
    transport::send_blob(stream, &wire::encode_delta1(&delta1))?;

    let status = transport::recv_control(stream)?;
    if status != SUCCESS {
        return Ok(DeltaOutcome::Failed);
    }
    let delta2_bytes = transport::recv_blob(stream)?;
    let delta2 = wire::decode_delta2(&delta2_bytes)?;

    if is_unchanged(&delta2) {
        transport::send_control(stream, SUCCESS)?;
        return Ok(DeltaOutcome::Unchanged);
    }

    match reassemble(local_path, &blocks, &delta2) {
        Ok(()) => {
            transport::send_control(stream, SUCCESS)?;
            Ok(DeltaOutcome::Updated)
        }
        Err(e) => {
            transport::send_control(stream, FAILURE)?;
            Err(e)
        }
    }
}

/// Runs one delta round from A's side against `local_path`, A's
/// authoritative copy.
pub fn run_as_a<S: Read + Write>(stream: &mut S, local_path: &Path) -> Result<DeltaOutcome> {
    let opened = transport::recv_control(stream)?;
    if opened != SUCCESS {
        return Ok(DeltaOutcome::Failed);
    }
    let blob = transport::recv_blob(stream)?;
    let (_remote_name, remote_checksum) = wire::decode_checksum_pair(&blob)?;

    let local_checksum = hash::whole_file_checksum(local_path)?;
    transport::send_control(stream, &local_checksum)?;
    if local_checksum == remote_checksum {
        return Ok(DeltaOutcome::AlreadyInSync);
    }

    let ready = transport::recv_control(stream)?;
    if ready != SUCCESS {
        return Ok(DeltaOutcome::Failed);
    }
    let delta1_bytes = transport::recv_blob(stream)?;
    let delta1 = wire::decode_delta1(&delta1_bytes)?;

    let delta2 = match compute_delta2(local_path, &delta1) {
        Ok(d) => d,
        Err(e) => {
            transport::send_control(stream, FAILURE)?;
            return Err(e.into());
        }
    };
    transport::send_control(stream, SUCCESS)?;
    transport::send_blob(stream, &wire::encode_delta2(&delta2))?;

    let ack = transport::recv_control(stream)?;
    Ok(if ack == SUCCESS {
        if is_unchanged(&delta2) {
            DeltaOutcome::Unchanged
        } else {
            DeltaOutcome::Updated
        }
    } else {
        DeltaOutcome::Failed
    })
}

/// A-side rolling-checksum scan (§4.5.3): slides a `BLOCK_SIZE` window over
/// `local_path` looking for weak+strong matches against U's Delta-1,
/// emitting a run of novel bytes as a literal whenever the window slides
/// past without a match. On any match the window resets to hold only the
/// byte that triggered the match attempt, uniformly, regardless of how
/// many candidates shared the weak hash (§11 OQ-1).
fn compute_delta2(local_path: &Path, delta1: &Delta1) -> std::io::Result<Vec<Delta2Item>> {
    let file = File::open(local_path)?;
    let mut reader = BufReader::new(file);

    let mut window: Vec<u8> = Vec::with_capacity(BLOCK_SIZE);
    let mut rolling = RollingHash::new();
    let mut literal_run: Vec<u8> = Vec::new();
    let mut out: Vec<Delta2Item> = Vec::new();

    let mut byte_buf = [0u8; 1];
    loop {
        let n = reader.read(&mut byte_buf)?;
        if n == 0 {
            break;
        }
        let incoming = byte_buf[0];

        if window.len() < BLOCK_SIZE {
            window.push(incoming);
            rolling.push(incoming);
            continue;
        }

        if let Some(idx) = try_match(delta1, &rolling, &window) {
            if !literal_run.is_empty() {
                out.push(Delta2Item::Literal(std::mem::take(&mut literal_run)));
            }
            out.push(Delta2Item::Index(idx));
            window.clear();
            rolling.reset();
            window.push(incoming);
            rolling.push(incoming);
            continue;
        }

        let outgoing = window.remove(0);
        literal_run.push(outgoing);
        rolling.slide(outgoing, incoming);
        window.push(incoming);
    }

    if !literal_run.is_empty() {
        out.push(Delta2Item::Literal(literal_run));
    }

    if !window.is_empty() {
        match try_match(delta1, &rolling, &window) {
            Some(idx) => out.push(Delta2Item::Index(idx)),
            None => out.push(Delta2Item::Literal(window)),
        }
    }

    Ok(out)
}

fn try_match(delta1: &Delta1, rolling: &RollingHash, window: &[u8]) -> Option<u32> {
    let candidates = delta1.get(&rolling.value())?;
    let strong = hash::strong_hash(window);
    candidates
        .iter()
        .find(|(cand_strong, _)| *cand_strong == strong)
        .map(|(_, index)| *index)
}

/// U-side reassembly (§4.5.4): rewrites `local_path` from its own `blocks`
/// plus any literal bytes A sent, via a same-directory temp file renamed
/// into place so a mid-write failure never leaves a truncated file behind.
fn reassemble(local_path: &Path, blocks: &[Vec<u8>], items: &[Delta2Item]) -> Result<()> {
    let dir = local_path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    for item in items {
        match item {
            Delta2Item::Index(idx) => {
                let block = blocks.get(*idx as usize).ok_or_else(|| {
                    SyncError::DeltaCorrupt(format!("delta2 index {idx} out of range"))
                })?;
                tmp.write_all(block)?;
            }
            Delta2Item::Literal(bytes) => tmp.write_all(bytes)?,
        }
    }
    tmp.flush()?;
    tmp.persist(local_path)
        .map_err(|e| SyncError::Io(e.error))?;
    Ok(())
}
