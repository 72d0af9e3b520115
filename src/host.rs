//! Framed stdio transport.
//!
//! Every frame is a 4-byte `u32` length in the platform's native byte order
//! followed by that many bytes of UTF-8 JSON. The browser and this process run
//! on the same machine, so both directions use the order detected once at start.

use once_cell::sync::Lazy;
use std::io::{self, Read, Write};
use std::thread;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Largest frame the browser may send (Chrome's documented limit).
pub const MAX_FROM_BROWSER: usize = 64 * 1_048_576;

/// Upper bound on the buffer reserved up front for a frame body. Bodies longer
/// than this grow as bytes actually arrive, so a bogus length cannot force a
/// huge allocation.
const INITIAL_BODY_CAPACITY: usize = 64 * 1024;

const FRAME_QUEUE_DEPTH: usize = 64;

/// Byte order of the length prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    /// Inspect the runtime representation of a known integer.
    pub fn detect() -> Self {
        if u16::from_ne_bytes([1, 0]) == 1 {
            ByteOrder::Little
        } else {
            ByteOrder::Big
        }
    }

    pub fn encode_len(self, len: u32) -> [u8; 4] {
        match self {
            ByteOrder::Little => len.to_le_bytes(),
            ByteOrder::Big => len.to_be_bytes(),
        }
    }

    pub fn decode_len(self, bytes: [u8; 4]) -> u32 {
        match self {
            ByteOrder::Little => u32::from_le_bytes(bytes),
            ByteOrder::Big => u32::from_be_bytes(bytes),
        }
    }
}

/// The process-wide byte order, detected on first use and fixed afterwards.
pub static NATIVE_ORDER: Lazy<ByteOrder> = Lazy::new(|| {
    let order = ByteOrder::detect();
    info!(?order, "native byte order detected");
    order
});

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The stream ended part-way through a frame.
    #[error("truncated frame: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },

    /// The declared length exceeded the cap. The body was skipped, so the
    /// stream is still aligned on a frame boundary.
    #[error("frame of {len} bytes exceeds limit of {max}; skipped")]
    Oversized { len: usize, max: usize },

    #[error("frame of {0} bytes cannot be length-prefixed")]
    TooLong(usize),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl FrameError {
    /// Whether the read loop can continue after this error.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, FrameError::Oversized { .. })
    }
}

/// Prefix `payload` with its length.
pub fn encode_frame(order: ByteOrder, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    let len = u32::try_from(payload.len()).map_err(|_| FrameError::TooLong(payload.len()))?;
    let mut out = Vec::with_capacity(4 + payload.len());
    out.extend_from_slice(&order.encode_len(len));
    out.extend_from_slice(payload);
    Ok(out)
}

/// Read the length prefix. `Ok(None)` means the stream ended cleanly on a
/// frame boundary.
fn read_len<R: Read>(r: &mut R, order: ByteOrder) -> Result<Option<usize>, FrameError> {
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < len_buf.len() {
        match r.read(&mut len_buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(FrameError::Truncated {
                    expected: len_buf.len(),
                    got: filled,
                })
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(Some(order.decode_len(len_buf) as usize))
}

/// Read one frame from `reader`.
///
/// Returns `Ok(None)` at end of input. A frame longer than `max_size` is
/// consumed and discarded, then reported as [`FrameError::Oversized`].
pub fn read_frame<R: Read>(
    reader: &mut R,
    order: ByteOrder,
    max_size: usize,
) -> Result<Option<Vec<u8>>, FrameError> {
    let Some(len) = read_len(&mut *reader, order)? else {
        return Ok(None);
    };

    if len > max_size {
        let skipped = io::copy(&mut reader.by_ref().take(len as u64), &mut io::sink())? as usize;
        if skipped < len {
            return Err(FrameError::Truncated {
                expected: len,
                got: skipped,
            });
        }
        return Err(FrameError::Oversized { len, max: max_size });
    }

    let mut buf = Vec::with_capacity(len.min(INITIAL_BODY_CAPACITY));
    reader.by_ref().take(len as u64).read_to_end(&mut buf)?;
    if buf.len() < len {
        return Err(FrameError::Truncated {
            expected: len,
            got: buf.len(),
        });
    }
    Ok(Some(buf))
}

/// Write one frame and flush.
pub fn write_frame<W: Write>(writer: &mut W, order: ByteOrder, payload: &[u8]) -> Result<(), FrameError> {
    let frame = encode_frame(order, payload)?;
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

/// Async counterpart of [`write_frame`], used by the switchboard on stdout.
pub async fn write_frame_async<W: AsyncWrite + Unpin>(
    writer: &mut W,
    order: ByteOrder,
    payload: &[u8],
) -> Result<(), FrameError> {
    let frame = encode_frame(order, payload)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Receive side of the stdio transport.
///
/// Closed (yields `None`) once input reaches a clean end. A fatal read error
/// is delivered as the last item before the channel closes.
pub type FrameReceiver = mpsc::Receiver<Result<Vec<u8>, FrameError>>;

/// Run the blocking read loop on a dedicated thread and hand decoded frames
/// to the returned queue.
///
/// A plain thread rather than `spawn_blocking`: stdin may block forever and
/// must not hold up runtime shutdown.
pub fn spawn_reader<R>(mut input: R, order: ByteOrder, max_size: usize) -> io::Result<FrameReceiver>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = mpsc::channel(FRAME_QUEUE_DEPTH);
    thread::Builder::new()
        .name("stdin-reader".into())
        .spawn(move || loop {
            match read_frame(&mut input, order, max_size) {
                Ok(Some(frame)) => {
                    debug!(size = frame.len(), "frame received");
                    if tx.blocking_send(Ok(frame)).is_err() {
                        return;
                    }
                }
                Ok(None) => {
                    info!("stdin closed");
                    return;
                }
                Err(e) => {
                    let fatal = e.is_fatal();
                    if fatal {
                        warn!(error = %e, "stdin read failed");
                    }
                    if tx.blocking_send(Err(e)).is_err() || fatal {
                        return;
                    }
                }
            }
        })?;
    Ok(rx)
}
