//! Sideband multiplexing and the scripted welcome/progress stream. Exact
//! strings and timings confirmed against
//! `original_source/backend/smart_proto.py::pack_and_sideband_handler`.

use std::time::Duration;

use bytes::Bytes;
use gitoboros_engine::pktline;
use tokio::sync::mpsc::Sender;

use crate::errors::ApiError;

const WELCOME_LINES: [&str; 2] =
    ["Thanks for using Gitoboros.", "Please don't try to impersonate other people."];

const CHAR_PACING: Duration = Duration::from_millis(50);
const COUNTING_PACING: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidebandKind {
    /// `side-band`: 999-byte max sideband payload.
    Narrow,
    /// `side-band-64k`: 65519-byte max sideband payload.
    Wide,
}

impl SidebandKind {
    pub fn max_payload(self) -> usize {
        match self {
            SidebandKind::Narrow => 999,
            SidebandKind::Wide => 65519,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NegotiatedCaps {
    pub sideband: Option<SidebandKind>,
    pub no_progress: bool,
}

/// `tx.send` failing means the client disconnected; the producer task
/// exits early rather than continuing to build frames nobody will read.
type StreamTx = Sender<Result<Bytes, std::io::Error>>;

async fn send_raw(tx: &StreamTx, data: Vec<u8>) -> bool {
    tx.send(Ok(Bytes::from(data))).await.is_ok()
}

fn check_sideband_len(kind: SidebandKind, payload_len: usize) -> anyhow::Result<()> {
    if payload_len > kind.max_payload() {
        return Err(ApiError::sideband_overflow(format!(
            "sideband frame of {payload_len} bytes exceeds the {:?} max of {} bytes",
            kind,
            kind.max_payload()
        ))
        .into());
    }
    Ok(())
}

/// Channel tags per the pack protocol: 1 = pack data, 2 = progress
/// message, 3 = error. Message frames get a trailing `\r` so git
/// overwrites the previous progress line instead of appending a new one.
async fn send_sideband_message(tx: &StreamTx, kind: SidebandKind, text: &str) -> anyhow::Result<bool> {
    let mut payload = Vec::with_capacity(text.len() + 2);
    payload.push(2u8);
    payload.extend_from_slice(text.as_bytes());
    payload.push(b'\r');
    check_sideband_len(kind, payload.len())?;
    let framed = pktline::encode_wide(&payload)?;
    Ok(send_raw(tx, framed).await)
}

async fn send_sideband_packdata(tx: &StreamTx, kind: SidebandKind, chunk: &[u8]) -> anyhow::Result<bool> {
    let mut payload = Vec::with_capacity(chunk.len() + 1);
    payload.push(1u8);
    payload.extend_from_slice(chunk);
    check_sideband_len(kind, payload.len())?;
    let framed = pktline::encode_wide(&payload)?;
    Ok(send_raw(tx, framed).await)
}

/// Drives the full response body described in spec.md §4.6 onto `tx`:
/// NAK, optional welcome/progress script, packfile delivery (sideband or
/// raw), optional final summary line, and a closing flush if sideband
/// was negotiated. Returns once the stream is complete or the client has
/// gone away.
pub async fn stream_response(
    tx: StreamTx,
    packfile: Vec<u8>,
    total_objects: u64,
    caps: NegotiatedCaps,
) -> anyhow::Result<()> {
    let nak = pktline::encode_str("NAK\n")?;
    if !send_raw(&tx, nak).await {
        return Ok(());
    }

    let Some(kind) = caps.sideband else {
        send_raw(&tx, packfile).await;
        return Ok(());
    };

    if !caps.no_progress && total_objects > 0 {
        for line in WELCOME_LINES {
            let chars: Vec<char> = line.chars().collect();
            for k in 0..=chars.len() {
                let prefix: String = chars[..k].iter().collect();
                if !send_sideband_message(&tx, kind, &prefix).await? {
                    return Ok(());
                }
                tokio::time::sleep(CHAR_PACING).await;
            }
            if !send_sideband_message(&tx, kind, "\n").await? {
                return Ok(());
            }
        }

        if !send_sideband_message(
            &tx,
            kind,
            &format!("Enumerating objects: {total_objects}, done.\n"),
        )
        .await?
        {
            return Ok(());
        }

        let step = total_objects / 100 + 1;
        let mut i = 0u64;
        while i <= total_objects {
            let percent = i * 100 / total_objects;
            let msg = format!("Counting objects:  {percent}% ({i}/{total_objects})");
            if !send_sideband_message(&tx, kind, &msg).await? {
                return Ok(());
            }
            tokio::time::sleep(COUNTING_PACING).await;
            i += step;
        }
    }

    let chunk_size = kind.max_payload() / 2;
    for chunk in packfile.chunks(chunk_size.max(1)) {
        if !send_sideband_packdata(&tx, kind, chunk).await? {
            return Ok(());
        }
    }

    if !caps.no_progress {
        let summary =
            format!("Total {total_objects} (delta 0), reused 0 (delta 0), pack-reused 0\n");
        if !send_sideband_message(&tx, kind, &summary).await? {
            return Ok(());
        }
    }

    let flush = pktline::encode(None)?;
    send_raw(&tx, flush).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitoboros_engine::pktline::{decode, PktLine};
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::ReceiverStream;
    use tokio_stream::StreamExt;

    async fn collect(rx: mpsc::Receiver<Result<Bytes, std::io::Error>>) -> Vec<u8> {
        let mut stream = ReceiverStream::new(rx);
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn no_sideband_sends_nak_then_raw_packfile() {
        let (tx, rx) = mpsc::channel(16);
        let caps = NegotiatedCaps { sideband: None, no_progress: false };
        stream_response(tx, vec![1, 2, 3, 4], 3, caps).await.unwrap();
        let out = collect(rx).await;

        let nak = pktline::encode_str("NAK\n").unwrap();
        assert!(out.starts_with(&nak));
        assert_eq!(&out[nak.len()..], &[1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn wide_sideband_no_progress_skips_welcome_and_ends_with_flush() {
        let (tx, rx) = mpsc::channel(1024);
        let caps = NegotiatedCaps { sideband: Some(SidebandKind::Wide), no_progress: true };
        stream_response(tx, vec![9u8; 100], 3, caps).await.unwrap();
        let out = collect(rx).await;

        let lines = decode(&out).unwrap();
        assert_eq!(lines.last(), Some(&PktLine::Flush));
        // no progress: every non-flush frame after NAK must be pack data (tag 1).
        for line in &lines[1..lines.len() - 1] {
            if let PktLine::Data(d) = line {
                assert_eq!(d[0], 1u8);
            }
        }
    }

    #[tokio::test]
    async fn narrow_sideband_with_progress_emits_welcome_messages() {
        let (tx, rx) = mpsc::channel(4096);
        let caps = NegotiatedCaps { sideband: Some(SidebandKind::Narrow), no_progress: false };
        stream_response(tx, vec![1, 2, 3], 3, caps).await.unwrap();
        let out = collect(rx).await;

        let lines = decode(&out).unwrap();
        let joined: String = lines
            .iter()
            .filter_map(|l| l.as_data())
            .filter(|d| d.first() == Some(&2u8))
            .map(|d| String::from_utf8_lossy(&d[1..]).trim_end_matches('\r').to_string())
            .collect();
        assert!(joined.contains("Thanks for using Gitoboros."));
        assert!(joined.contains("Enumerating objects: 3, done."));
    }

    #[tokio::test]
    async fn narrow_sideband_rejects_oversized_packdata_chunk() {
        let (tx, _rx) = mpsc::channel(16);
        let chunk = vec![0u8; SidebandKind::Narrow.max_payload()];
        let err = send_sideband_packdata(&tx, SidebandKind::Narrow, &chunk).await.unwrap_err();
        assert!(err.to_string().contains("sideband-overflow"));
    }

    #[test]
    fn check_sideband_len_accepts_exactly_the_max() {
        assert!(check_sideband_len(SidebandKind::Narrow, SidebandKind::Narrow.max_payload()).is_ok());
        assert!(
            check_sideband_len(SidebandKind::Narrow, SidebandKind::Narrow.max_payload() + 1)
                .is_err()
        );
    }
}
