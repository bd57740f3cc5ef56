//! Explicit byte layout for the four object shapes that cross the wire as
//! length-prefixed blobs (§4.3, §9, §11): a path list, an event list, a
//! `(path, checksum)` pair, and the Delta-1/Delta-2 shapes.
//!
//! All multi-byte integers are little-endian. Every shape starts with a
//! one-byte tag so a misrouted blob decodes as an error rather than
//! silently reinterpreting unrelated bytes.

use crate::delta::types::{Delta1, Delta2Item};
use crate::error::{Result, SyncError};
use crate::event::{Event, EventKind};
use bytes::{Buf, BufMut, Bytes, BytesMut};

const TAG_PATH_LIST: u8 = 1;
const TAG_EVENT_LIST: u8 = 2;
const TAG_CHECKSUM_PAIR: u8 = 3;
const TAG_DELTA1: u8 = 4;
const TAG_DELTA2: u8 = 5;

fn put_string(buf: &mut BytesMut, s: &str) {
    let bytes = s.as_bytes();
    buf.put_u32_le(bytes.len() as u32);
    buf.put_slice(bytes);
}

fn get_string(buf: &mut Bytes) -> Result<String> {
    if buf.remaining() < 4 {
        return Err(SyncError::Protocol("truncated string length".into()));
    }
    let len = buf.get_u32_le() as usize;
    if buf.remaining() < len {
        return Err(SyncError::Protocol("truncated string body".into()));
    }
    let raw = buf.copy_to_bytes(len);
    String::from_utf8(raw.to_vec())
        .map_err(|e| SyncError::Protocol(format!("non-UTF8 string on wire: {e}")))
}

fn expect_tag(buf: &mut Bytes, expected: u8) -> Result<()> {
    if !buf.has_remaining() {
        return Err(SyncError::Protocol("empty message body".into()));
    }
    let tag = buf.get_u8();
    if tag != expected {
        return Err(SyncError::Protocol(format!(
            "unexpected wire tag {tag}, expected {expected}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// (a) path list
// ---------------------------------------------------------------------------

pub fn encode_path_list(paths: &[String]) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u8(TAG_PATH_LIST);
    buf.put_u32_le(paths.len() as u32);
    for p in paths {
        put_string(&mut buf, p);
    }
    buf.freeze()
}

pub fn decode_path_list(data: &[u8]) -> Result<Vec<String>> {
    let mut buf = Bytes::copy_from_slice(data);
    expect_tag(&mut buf, TAG_PATH_LIST)?;
    if buf.remaining() < 4 {
        return Err(SyncError::Protocol("truncated path list count".into()));
    }
    let count = buf.get_u32_le() as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(get_string(&mut buf)?);
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// (b) event list
// ---------------------------------------------------------------------------

pub fn encode_event_list(events: &[Event]) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u8(TAG_EVENT_LIST);
    buf.put_u32_le(events.len() as u32);
    for e in events {
        put_string(&mut buf, &e.src);
        match &e.dest {
            Some(d) => {
                buf.put_u8(1);
                put_string(&mut buf, d);
            }
            None => buf.put_u8(0),
        }
        buf.put_u8(e.is_dir as u8);
        buf.put_u8(e.kind.as_u8());
    }
    buf.freeze()
}

pub fn decode_event_list(data: &[u8]) -> Result<Vec<Event>> {
    let mut buf = Bytes::copy_from_slice(data);
    expect_tag(&mut buf, TAG_EVENT_LIST)?;
    if buf.remaining() < 4 {
        return Err(SyncError::Protocol("truncated event list count".into()));
    }
    let count = buf.get_u32_le() as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let src = get_string(&mut buf)?;
        if !buf.has_remaining() {
            return Err(SyncError::Protocol("truncated event dest flag".into()));
        }
        let has_dest = buf.get_u8();
        let dest = if has_dest == 1 {
            Some(get_string(&mut buf)?)
        } else {
            None
        };
        if buf.remaining() < 2 {
            return Err(SyncError::Protocol("truncated event trailer".into()));
        }
        let is_dir = buf.get_u8() != 0;
        let kind_byte = buf.get_u8();
        let kind = EventKind::from_u8(kind_byte)
            .ok_or_else(|| SyncError::Protocol(format!("unknown event kind {kind_byte}")))?;
        out.push(Event {
            src,
            dest,
            is_dir,
            kind,
        });
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// (c) (relative_path, checksum_hex) pair
// ---------------------------------------------------------------------------

pub fn encode_checksum_pair(path: &str, checksum_hex: &str) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u8(TAG_CHECKSUM_PAIR);
    put_string(&mut buf, path);
    put_string(&mut buf, checksum_hex);
    buf.freeze()
}

pub fn decode_checksum_pair(data: &[u8]) -> Result<(String, String)> {
    let mut buf = Bytes::copy_from_slice(data);
    expect_tag(&mut buf, TAG_CHECKSUM_PAIR)?;
    let path = get_string(&mut buf)?;
    let checksum = get_string(&mut buf)?;
    Ok((path, checksum))
}

// ---------------------------------------------------------------------------
// (d) Delta-1 / Delta-2
// ---------------------------------------------------------------------------

pub fn encode_delta1(delta1: &Delta1) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u8(TAG_DELTA1);
    buf.put_u32_le(delta1.len() as u32);
    for (&weak, candidates) in delta1 {
        buf.put_u32_le(weak);
        buf.put_u32_le(candidates.len() as u32);
        for (strong, index) in candidates {
            buf.put_slice(strong);
            buf.put_u32_le(*index);
        }
    }
    buf.freeze()
}

pub fn decode_delta1(data: &[u8]) -> Result<Delta1> {
    let mut buf = Bytes::copy_from_slice(data);
    expect_tag(&mut buf, TAG_DELTA1)?;
    if buf.remaining() < 4 {
        return Err(SyncError::Protocol("truncated delta1 key count".into()));
    }
    let key_count = buf.get_u32_le() as usize;
    let mut map = Delta1::with_capacity(key_count);
    for _ in 0..key_count {
        if buf.remaining() < 8 {
            return Err(SyncError::Protocol("truncated delta1 entry header".into()));
        }
        let weak = buf.get_u32_le();
        let candidate_count = buf.get_u32_le() as usize;
        let mut candidates = Vec::with_capacity(candidate_count);
        for _ in 0..candidate_count {
            if buf.remaining() < 24 {
                return Err(SyncError::Protocol("truncated delta1 candidate".into()));
            }
            let mut strong = [0u8; 20];
            buf.copy_to_slice(&mut strong);
            let index = buf.get_u32_le();
            candidates.push((strong, index));
        }
        map.insert(weak, candidates);
    }
    Ok(map)
}

pub fn encode_delta2(items: &[Delta2Item]) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u8(TAG_DELTA2);
    buf.put_u32_le(items.len() as u32);
    for item in items {
        match item {
            Delta2Item::Index(idx) => {
                buf.put_u8(0);
                buf.put_u32_le(*idx);
            }
            Delta2Item::Literal(bytes) => {
                buf.put_u8(1);
                buf.put_u32_le(bytes.len() as u32);
                buf.put_slice(bytes);
            }
        }
    }
    buf.freeze()
}

pub fn decode_delta2(data: &[u8]) -> Result<Vec<Delta2Item>> {
    let mut buf = Bytes::copy_from_slice(data);
    expect_tag(&mut buf, TAG_DELTA2)?;
    if buf.remaining() < 4 {
        return Err(SyncError::Protocol("truncated delta2 count".into()));
    }
    let count = buf.get_u32_le() as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        if !buf.has_remaining() {
            return Err(SyncError::Protocol("truncated delta2 item tag".into()));
        }
        let tag = buf.get_u8();
        match tag {
            0 => {
                if buf.remaining() < 4 {
                    return Err(SyncError::Protocol("truncated delta2 index".into()));
                }
                out.push(Delta2Item::Index(buf.get_u32_le()));
            }
            1 => {
                if buf.remaining() < 4 {
                    return Err(SyncError::Protocol("truncated delta2 literal length".into()));
                }
                let len = buf.get_u32_le() as usize;
                if buf.remaining() < len {
                    return Err(SyncError::Protocol("truncated delta2 literal body".into()));
                }
                out.push(Delta2Item::Literal(buf.copy_to_bytes(len).to_vec()));
            }
            other => {
                return Err(SyncError::DeltaCorrupt(format!(
                    "delta2 item is neither an index nor literal bytes (tag {other})"
                )))
            }
        }
    }
    Ok(out)
}
