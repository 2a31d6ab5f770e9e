use crate::error::AdbResult;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Shell Protocol v2 packet IDs.
pub const STDIN: u8 = 0;
pub const STDOUT: u8 = 1;
pub const STDERR: u8 = 2;
pub const EXIT: u8 = 3;
pub const CLOSE_STDIN: u8 = 4;
pub const WINDOW_SIZE_CHANGE: u8 = 5;

/// Read one `[id:1][length:4 LE][data:length]` packet.
///
/// IDs outside the known set are returned as-is rather than rejected — the
/// client→server direction is specified to ignore unknown IDs, not to treat
/// them as framing errors.
pub async fn read_packet<R: AsyncRead + Unpin>(reader: &mut R) -> AdbResult<(u8, Vec<u8>)> {
    let mut header = [0u8; 5];
    reader.read_exact(&mut header).await?;
    let id = header[0];
    let length = u32::from_le_bytes([header[1], header[2], header[3], header[4]]) as usize;
    let mut data = vec![0u8; length];
    reader.read_exact(&mut data).await?;
    Ok((id, data))
}

/// Write one packet and flush immediately, bounding latency between chunks.
pub async fn write_packet<W: AsyncWrite + Unpin>(
    writer: &mut W,
    id: u8,
    data: &[u8],
) -> AdbResult<()> {
    let mut header = [0u8; 5];
    header[0] = id;
    header[1..5].copy_from_slice(&(data.len() as u32).to_le_bytes());
    writer.write_all(&header).await?;
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

/// Parse a `WINDOW_SIZE_CHANGE` payload: ASCII `"rows cols xpixel ypixel"`.
pub fn parse_window_size(payload: &[u8]) -> Option<(u16, u16)> {
    let text = std::str::from_utf8(payload).ok()?;
    let mut parts = text.split_whitespace();
    let rows: u16 = parts.next()?.parse().ok()?;
    let cols: u16 = parts.next()?.parse().ok()?;
    Some((rows, cols))
}
