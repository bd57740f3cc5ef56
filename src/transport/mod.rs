//! Framed transport: fixed-width control messages and length-prefixed blobs
//! over a connected byte stream.
//!
//! Wire format: every control message is exactly `CONTROL_LEN` bytes, the
//! payload left-justified and padded with trailing spaces. A blob is a
//! control message carrying the decimal size, an acknowledgement, the raw
//! bytes, and a final acknowledgement.

use crate::error::{Result, SyncError};
use crate::hash::IO_CHUNK_SIZE;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// Width, in bytes, of every fixed control message.
pub const CONTROL_LEN: usize = 256;

/// Successful completion of an operation.
pub const SUCCESS: &str = "-1";
/// Failed completion of an operation.
pub const FAILURE: &str = "-2";

/// Sends a control message, padding the payload with trailing spaces to
/// exactly `CONTROL_LEN` bytes.
pub fn send_control<W: Write>(w: &mut W, payload: &str) -> Result<()> {
    if payload.len() > CONTROL_LEN {
        return Err(SyncError::Protocol(format!(
            "control message {} bytes exceeds {} byte limit",
            payload.len(),
            CONTROL_LEN
        )));
    }
    let mut buf = vec![b' '; CONTROL_LEN];
    buf[..payload.len()].copy_from_slice(payload.as_bytes());
    w.write_all(&buf)?;
    Ok(())
}

/// Receives a control message. A connection closed before any bytes arrive
/// is reported as an empty string, matching the source's
/// `receive_fixed_string_size` contract; a connection closed mid-message is a
/// protocol error.
pub fn recv_control<R: Read>(r: &mut R) -> Result<String> {
    let mut buf = [0u8; CONTROL_LEN];
    let mut total = 0;
    while total < CONTROL_LEN {
        let n = r.read(&mut buf[total..])?;
        if n == 0 {
            if total == 0 {
                return Ok(String::new());
            }
            return Err(SyncError::Protocol(
                "connection closed mid control-message".into(),
            ));
        }
        total += n;
    }
    let text = std::str::from_utf8(&buf)
        .map_err(|e| SyncError::Protocol(format!("non-UTF8 control message: {e}")))?;
    Ok(text.trim_end_matches(' ').to_string())
}

/// Parses a received control message as the `SUCCESS`/`FAILURE` return code.
pub fn parse_return_code(s: &str) -> Result<bool> {
    match s {
        SUCCESS => Ok(true),
        FAILURE => Ok(false),
        other => Err(SyncError::Protocol(format!(
            "expected return code, got {other:?}"
        ))),
    }
}

/// Sends a length-prefixed blob: size, then an ack round-trip, then the raw
/// bytes, then a final ack round-trip.
pub fn send_blob<S: Read + Write>(stream: &mut S, data: &[u8]) -> Result<()> {
    send_control(stream, &data.len().to_string())?;
    recv_control(stream)?;
    stream.write_all(data)?;
    recv_control(stream)?;
    Ok(())
}

/// Receives a length-prefixed blob, acknowledging both the size and the
/// completed transfer.
pub fn recv_blob<S: Read + Write>(stream: &mut S) -> Result<Vec<u8>> {
    let size_str = recv_control(stream)?;
    let size: usize = size_str
        .parse()
        .map_err(|_| SyncError::Protocol(format!("invalid blob size {size_str:?}")))?;
    send_control(stream, SUCCESS)?;
    let mut data = vec![0u8; size];
    stream.read_exact(&mut data)?;
    send_control(stream, SUCCESS)?;
    Ok(data)
}

/// Sends whichever file lives at `path` as a length-prefixed stream (§4.5.5),
/// or FAILURE if it cannot be opened. A zero-length file is announced and
/// nothing further crosses the wire.
pub fn send_file<S: Read + Write>(stream: &mut S, path: &Path) -> Result<()> {
    let size = match std::fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(_) => {
            send_control(stream, FAILURE)?;
            return Ok(());
        }
    };
    send_control(stream, SUCCESS)?;
    send_control(stream, &size.to_string())?;
    if size == 0 {
        return Ok(());
    }

    match File::open(path) {
        Ok(mut file) => {
            send_control(stream, SUCCESS)?;
            let ready = recv_control(stream)?;
            if ready == SUCCESS {
                let mut buf = [0u8; IO_CHUNK_SIZE];
                loop {
                    let n = file.read(&mut buf)?;
                    if n == 0 {
                        break;
                    }
                    stream.write_all(&buf[..n])?;
                }
            }
            recv_control(stream)?;
            Ok(())
        }
        Err(_) => {
            send_control(stream, FAILURE)?;
            recv_control(stream)?;
            Ok(())
        }
    }
}

/// Receives a file sent by [`send_file`] into `path`, creating parent
/// directories as needed. Returns `false` if the peer reported FAILURE (no
/// source file) or the transfer could not be completed on this side.
pub fn receive_file<S: Read + Write>(stream: &mut S, path: &Path) -> Result<bool> {
    let status = recv_control(stream)?;
    if status == FAILURE {
        return Ok(false);
    }
    let length: u64 = recv_control(stream)?
        .parse()
        .map_err(|_| SyncError::Protocol("invalid file length on wire".into()))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if length == 0 {
        File::create(path)?;
        return Ok(true);
    }

    match File::create(path) {
        Ok(mut file) => {
            let sender_ready = recv_control(stream)?;
            if sender_ready != SUCCESS {
                send_control(stream, FAILURE)?;
                return Ok(false);
            }
            send_control(stream, SUCCESS)?;
            let mut remaining = length;
            let mut buf = [0u8; IO_CHUNK_SIZE];
            while remaining > 0 {
                let want = remaining.min(IO_CHUNK_SIZE as u64) as usize;
                let n = stream.read(&mut buf[..want])?;
                if n == 0 {
                    break;
                }
                file.write_all(&buf[..n])?;
                remaining -= n as u64;
            }
            send_control(stream, "")?;
            Ok(true)
        }
        Err(_) => {
            recv_control(stream)?;
            send_control(stream, FAILURE)?;
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn control_message_round_trips_with_padding_stripped() {
        let mut buf = Vec::new();
        send_control(&mut buf, "3").unwrap();
        assert_eq!(buf.len(), CONTROL_LEN);
        let mut cursor = Cursor::new(buf);
        let received = recv_control(&mut cursor).unwrap();
        assert_eq!(received, "3");
    }

    #[test]
    fn control_message_too_long_is_rejected() {
        let payload = "x".repeat(CONTROL_LEN + 1);
        let mut buf = Vec::new();
        assert!(send_control(&mut buf, &payload).is_err());
    }

    #[test]
    fn recv_control_on_closed_stream_returns_empty() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        let received = recv_control(&mut cursor).unwrap();
        assert_eq!(received, "");
    }

    #[test]
    fn blob_round_trips_over_a_duplex_buffer() {
        use std::io::{Read, Seek, SeekFrom, Write};

        struct Duplex {
            inner: Cursor<Vec<u8>>,
        }
        impl Read for Duplex {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                self.inner.read(buf)
            }
        }
        impl Write for Duplex {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.inner.write(buf)
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut duplex = Duplex {
            inner: Cursor::new(Vec::new()),
        };
        send_blob(&mut duplex, b"hello delta").unwrap();
        duplex.inner.seek(SeekFrom::Start(0)).unwrap();
        let received = recv_blob(&mut duplex).unwrap();
        assert_eq!(received, b"hello delta");
    }

    #[test]
    fn send_file_and_receive_file_round_trip_over_a_real_socket() {
        use std::net::{TcpListener, TcpStream};
        use tempfile::TempDir;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let src_dir = TempDir::new().unwrap();
        let src_path = src_dir.path().join("source.bin");
        std::fs::write(&src_path, b"a delta-worthy payload, repeated ").unwrap();

        let sender = std::thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            send_file(&mut stream, &src_path).unwrap();
        });

        let (mut server_stream, _) = listener.accept().unwrap();
        let dest_dir = TempDir::new().unwrap();
        let dest_path = dest_dir.path().join("nested/dest.bin");
        let ok = receive_file(&mut server_stream, &dest_path).unwrap();
        sender.join().unwrap();

        assert!(ok);
        assert_eq!(
            std::fs::read(&dest_path).unwrap(),
            b"a delta-worthy payload, repeated "
        );
    }

    #[test]
    fn send_file_reports_failure_for_a_missing_source() {
        use std::net::{TcpListener, TcpStream};
        use tempfile::TempDir;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let missing = TempDir::new().unwrap().path().join("nope.bin");

        let sender = std::thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            send_file(&mut stream, &missing).unwrap();
        });

        let (mut server_stream, _) = listener.accept().unwrap();
        let dest_dir = TempDir::new().unwrap();
        let ok = receive_file(&mut server_stream, &dest_dir.path().join("dest.bin")).unwrap();
        sender.join().unwrap();

        assert!(!ok);
    }

    #[test]
    fn send_file_handles_zero_length_files() {
        use std::net::{TcpListener, TcpStream};
        use tempfile::TempDir;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let src_dir = TempDir::new().unwrap();
        let src_path = src_dir.path().join("empty.bin");
        std::fs::write(&src_path, b"").unwrap();

        let sender = std::thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            send_file(&mut stream, &src_path).unwrap();
        });

        let (mut server_stream, _) = listener.accept().unwrap();
        let dest_dir = TempDir::new().unwrap();
        let dest_path = dest_dir.path().join("empty_copy.bin");
        let ok = receive_file(&mut server_stream, &dest_path).unwrap();
        sender.join().unwrap();

        assert!(ok);
        assert_eq!(std::fs::read(&dest_path).unwrap(), b"");
    }
}
