//! pkt-line encode/decode, per the Git smart-HTTP wire format.
//!
//! A pkt-line is a record framed by a 4-character lowercase hex length
//! prefix counting itself plus the payload. `0000` is the flush sentinel.

use anyhow::{bail, Context, Result};

/// Design limit inherited from the reference implementation's
/// hand-formatted hex length field: a framed pkt-line may not exceed
/// `0x9999` bytes through [`encode`]. Callers that need to frame larger
/// chunks (sideband packfile data, up to 65519 bytes) use
/// [`encode_wide`], which still respects the hard 4-hex-digit protocol
/// ceiling of `0xffff`.
pub const MAX_PKT_LEN: usize = 0x9999;

/// Hard protocol ceiling: a pkt-line length field is always 4 hex digits.
pub const MAX_WIDE_PKT_LEN: usize = 0xffff;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PktLine {
    Data(Vec<u8>),
    Flush,
}

impl PktLine {
    pub fn as_data(&self) -> Option<&[u8]> {
        match self {
            PktLine::Data(d) => Some(d),
            PktLine::Flush => None,
        }
    }
}

/// Encode `data` as a single pkt-line, or the flush packet if `data` is `None`.
pub fn encode(data: Option<&[u8]>) -> Result<Vec<u8>> {
    let Some(data) = data else {
        return Ok(b"0000".to_vec());
    };
    let len = data.len() + 4;
    if len > MAX_PKT_LEN {
        bail!("pkt-line-overflow: framed length {len} exceeds {MAX_PKT_LEN:#x}");
    }
    Ok(encode_raw(data, len))
}

/// Encode an ASCII string as a pkt-line. Convenience wrapper over [`encode`].
pub fn encode_str(data: &str) -> Result<Vec<u8>> {
    encode(Some(data.as_bytes()))
}

/// Encode `data` as a pkt-line without the `0x9999` design limit, bounded
/// only by the protocol's 4-hex-digit length field. Used by the sideband
/// writer, which negotiates its own (wider) maximum payload size.
pub fn encode_wide(data: &[u8]) -> Result<Vec<u8>> {
    let len = data.len() + 4;
    if len > MAX_WIDE_PKT_LEN {
        bail!("sideband-overflow: framed length {len} exceeds {MAX_WIDE_PKT_LEN:#x}");
    }
    Ok(encode_raw(data, len))
}

fn encode_raw(data: &[u8], len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    out.extend_from_slice(format!("{len:04x}").as_bytes());
    out.extend_from_slice(data);
    out
}

/// Defensive bound on records decoded per call, matching the reference
/// implementation's loop cap.
const MAX_RECORDS: usize = 1000;

/// Decode a buffer of concatenated pkt-lines. A single trailing `\n` on
/// each data line is stripped, matching Git's own pkt-line text convention.
pub fn decode(mut buf: &[u8]) -> Result<Vec<PktLine>> {
    let mut out = Vec::new();
    for _ in 0..MAX_RECORDS {
        if buf.is_empty() {
            break;
        }
        if buf.len() < 4 {
            bail!("truncated pkt-line length prefix");
        }
        let len_hex = std::str::from_utf8(&buf[..4]).context("pkt-line length is not ASCII")?;
        let len = usize::from_str_radix(len_hex, 16).context("invalid pkt-line length")?;
        if len == 0 {
            out.push(PktLine::Flush);
            buf = &buf[4..];
            continue;
        }
        if len < 4 {
            bail!("pkt-line length {len} smaller than header size");
        }
        let data_len = len - 4;
        if buf.len() < 4 + data_len {
            bail!("truncated pkt-line payload");
        }
        let mut data = buf[4..4 + data_len].to_vec();
        if data.last() == Some(&b'\n') {
            data.pop();
        }
        out.push(PktLine::Data(data));
        buf = &buf[4 + data_len..];
    }
    Ok(out)
}
