//! Whole-frame I/O over the single-shot [`Socket`] primitives.

use crate::error::TransportError;
use crate::message::{FrameHeader, FRAME_HEADER_LEN};

use super::Socket;

/// Write all of `frame`.
pub async fn write_frame(socket: &mut Socket, frame: &[u8]) -> Result<(), TransportError> {
    let mut written = 0;
    while written < frame.len() {
        let n = socket.send(&frame[written..]).await?;
        if n == 0 {
            return Err(TransportError::Closed);
        }
        written += n;
    }
    Ok(())
}

/// Read exactly one frame, header included.
///
/// The header is validated before the body is read, so an oversized or
/// unknown frame never causes a large allocation. EOF anywhere in the frame
/// is `Closed`.
pub async fn read_frame(socket: &mut Socket) -> Result<Vec<u8>, TransportError> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    read_exact(socket, &mut header).await?;

    let (_, parsed) = FrameHeader::parse(&header)
        .map_err(|_| TransportError::Frame(format!("bad frame header {:02x?}", header)))?;

    let mut frame = vec![0u8; FRAME_HEADER_LEN + parsed.length as usize];
    frame[..FRAME_HEADER_LEN].copy_from_slice(&header);
    read_exact(socket, &mut frame[FRAME_HEADER_LEN..]).await?;
    Ok(frame)
}

async fn read_exact(socket: &mut Socket, buf: &mut [u8]) -> Result<(), TransportError> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = socket.receive(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(TransportError::Closed);
        }
        filled += n;
    }
    Ok(())
}
