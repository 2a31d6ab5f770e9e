use crate::error::{AdbResult, AdbServerError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

// Smart-socket framing: a request is a 4-hex-digit big-endian length
// followed by that many UTF-8 payload bytes. A response is either the bare
// atom `OKAY`, or `FAIL` followed by a 4-hex-digit length and message.

/// Read one smart-socket request: 4 hex digits, then that many bytes.
///
/// `ConnectionClosed` means the peer hung up before (or exactly at) a frame
/// boundary and the session should end silently. `Protocol` means the bytes
/// we did receive don't parse as a length, and the caller should answer
/// with `FAIL` before closing.
pub async fn read_request<R: AsyncRead + Unpin>(reader: &mut R) -> AdbResult<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(AdbServerError::ConnectionClosed);
        }
        Err(e) => return Err(e.into()),
    }

    let hex_str = std::str::from_utf8(&len_buf)
        .map_err(|_| AdbServerError::Protocol("malformed length".into()))?;
    let len = usize::from_str_radix(hex_str, 16)
        .map_err(|_| AdbServerError::Protocol("malformed length".into()))?;

    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|_| AdbServerError::ConnectionClosed)?;
    Ok(payload)
}

/// Write the bare `OKAY` acceptance atom.
pub async fn write_okay<W: AsyncWrite + Unpin>(writer: &mut W) -> AdbResult<()> {
    writer.write_all(b"OKAY").await?;
    writer.flush().await?;
    Ok(())
}

/// Write a `FAIL` rejection atom followed by the length-prefixed message.
pub async fn write_fail<W: AsyncWrite + Unpin>(writer: &mut W, message: &str) -> AdbResult<()> {
    writer.write_all(b"FAIL").await?;
    writer
        .write_all(format!("{:04x}", message.len()).as_bytes())
        .await?;
    writer.write_all(message.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Encode a request the way a client would send it (used by tests that play
/// the client side against this server).
pub fn encode_request(payload: &str) -> Vec<u8> {
    format!("{:04x}{}", payload.len(), payload).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_read_request_round_trip() {
        let (mut client, mut server) = duplex(256);
        client.write_all(&encode_request("host:version")).await.unwrap();
        let payload = read_request(&mut server).await.unwrap();
        assert_eq!(payload, b"host:version");
    }

    #[tokio::test]
    async fn test_read_request_empty_payload() {
        let (mut client, mut server) = duplex(64);
        client.write_all(b"0000").await.unwrap();
        let payload = read_request(&mut server).await.unwrap();
        assert!(payload.is_empty());
    }

    #[tokio::test]
    async fn test_read_request_malformed_length() {
        let (mut client, mut server) = duplex(64);
        client.write_all(b"ZZZZrest").await.unwrap();
        let err = read_request(&mut server).await.unwrap_err();
        assert!(matches!(err, AdbServerError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_read_request_connection_closed() {
        let (client, mut server) = duplex(64);
        drop(client);
        let err = read_request(&mut server).await.unwrap_err();
        assert!(matches!(err, AdbServerError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_read_request_max_length() {
        let (mut client, mut server) = duplex(70_000);
        let payload = vec![b'x'; 65_535];
        client.write_all(b"ffff").await.unwrap();
        client.write_all(&payload).await.unwrap();
        let got = read_request(&mut server).await.unwrap();
        assert_eq!(got.len(), 65_535);
    }

    #[tokio::test]
    async fn test_write_okay() {
        let (mut client, mut server) = duplex(64);
        write_okay(&mut server).await.unwrap();
        let mut buf = [0u8; 4];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"OKAY");
    }

    #[tokio::test]
    async fn test_write_fail() {
        let (mut client, mut server) = duplex(64);
        write_fail(&mut server, "unsupported operation").await.unwrap();
        let mut buf = [0u8; 8];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf[0..4], b"FAIL");
        let len = usize::from_str_radix(std::str::from_utf8(&buf[4..8]).unwrap(), 16).unwrap();
        assert_eq!(len, "unsupported operation".len());
        let mut msg = vec![0u8; len];
        client.read_exact(&mut msg).await.unwrap();
        assert_eq!(msg, b"unsupported operation");
    }
}
