use crate::error::{AdbResult, AdbServerError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest DATA chunk the sync sub-protocol will carry in either direction.
pub const SYNC_DATA_MAX: u32 = 64 * 1024;

/// The 4-ASCII-byte command/response IDs that appear in a sync frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncId {
    Stat,
    List,
    Send,
    Recv,
    Data,
    Done,
    Okay,
    Fail,
    Dent,
    Quit,
}

impl SyncId {
    pub fn as_bytes(&self) -> &'static [u8; 4] {
        match self {
            SyncId::Stat => b"STAT",
            SyncId::List => b"LIST",
            SyncId::Send => b"SEND",
            SyncId::Recv => b"RECV",
            SyncId::Data => b"DATA",
            SyncId::Done => b"DONE",
            SyncId::Okay => b"OKAY",
            SyncId::Fail => b"FAIL",
            SyncId::Dent => b"DENT",
            SyncId::Quit => b"QUIT",
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<SyncId> {
        match bytes {
            b"STAT" => Some(SyncId::Stat),
            b"LIST" => Some(SyncId::List),
            b"SEND" => Some(SyncId::Send),
            b"RECV" => Some(SyncId::Recv),
            b"DATA" => Some(SyncId::Data),
            b"DONE" => Some(SyncId::Done),
            b"OKAY" => Some(SyncId::Okay),
            b"FAIL" => Some(SyncId::Fail),
            b"DENT" => Some(SyncId::Dent),
            b"QUIT" => Some(SyncId::Quit),
            _ => None,
        }
    }
}

/// Read one sync frame: 4-byte ASCII id + 4-byte LE length + that many bytes.
///
/// Rejects payloads over [`SYNC_DATA_MAX`] with a protocol error rather than
/// reading them; the caller is expected to answer with `FAIL("oversize")`
/// and keep the sync session alive.
pub async fn read_sync_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> AdbResult<(SyncId, u32, Vec<u8>)> {
    let mut header = [0u8; 8];
    reader
        .read_exact(&mut header)
        .await
        .map_err(|_| AdbServerError::ConnectionClosed)?;

    let id = SyncId::from_bytes(&header[0..4])
        .ok_or_else(|| AdbServerError::Protocol("unknown sync id".into()))?;
    let length = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

    if length > SYNC_DATA_MAX {
        return Err(AdbServerError::Protocol("oversize".into()));
    }

    let mut payload = vec![0u8; length as usize];
    reader.read_exact(&mut payload).await?;
    Ok((id, length, payload))
}

/// Write a sync frame: id + LE length + payload.
pub async fn write_sync_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    id: SyncId,
    payload: &[u8],
) -> AdbResult<()> {
    writer.write_all(id.as_bytes()).await?;
    writer
        .write_all(&(payload.len() as u32).to_le_bytes())
        .await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// `STAT`/directory-entry metadata, independent of the entry's name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileStat {
    pub mode: u32,
    pub size: u32,
    pub mtime: u32,
}

impl FileStat {
    pub fn to_bytes(self) -> [u8; 12] {
        let mut buf = [0u8; 12];
        buf[0..4].copy_from_slice(&self.mode.to_le_bytes());
        buf[4..8].copy_from_slice(&self.size.to_le_bytes());
        buf[8..12].copy_from_slice(&self.mtime.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> AdbResult<Self> {
        if buf.len() < 12 {
            return Err(AdbServerError::Protocol("STAT payload too short".into()));
        }
        Ok(Self {
            mode: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            size: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            mtime: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
        })
    }

    pub fn is_file(&self) -> bool {
        (self.mode & 0o170000) == 0o100000
    }

    pub fn is_directory(&self) -> bool {
        (self.mode & 0o170000) == 0o040000
    }
}

/// A `DENT` directory entry: [`FileStat`] plus a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dirent {
    pub name: String,
    pub mode: u32,
    pub size: u32,
    pub mtime: u32,
}

impl Dirent {
    /// Encode as `mode(4) + size(4) + mtime(4) + namelen(4) + name`, the
    /// bytes that follow the `DENT` id in a sync frame.
    pub fn to_bytes(&self) -> Vec<u8> {
        let name_bytes = self.name.as_bytes();
        let mut buf = Vec::with_capacity(16 + name_bytes.len());
        buf.extend_from_slice(&self.mode.to_le_bytes());
        buf.extend_from_slice(&self.size.to_le_bytes());
        buf.extend_from_slice(&self.mtime.to_le_bytes());
        buf.extend_from_slice(&(name_bytes.len() as u32).to_le_bytes());
        buf.extend_from_slice(name_bytes);
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> AdbResult<Self> {
        if buf.len() < 16 {
            return Err(AdbServerError::Protocol("DENT payload too short".into()));
        }
        let mode = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let size = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let mtime = u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);
        let namelen = u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]) as usize;
        if buf.len() < 16 + namelen {
            return Err(AdbServerError::Protocol("DENT name truncated".into()));
        }
        let name = String::from_utf8_lossy(&buf[16..16 + namelen]).to_string();
        Ok(Self {
            name,
            mode,
            size,
            mtime,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[test]
    fn test_sync_id_round_trip_all_variants() {
        let variants: &[(SyncId, &[u8; 4])] = &[
            (SyncId::Stat, b"STAT"),
            (SyncId::List, b"LIST"),
            (SyncId::Send, b"SEND"),
            (SyncId::Recv, b"RECV"),
            (SyncId::Data, b"DATA"),
            (SyncId::Done, b"DONE"),
            (SyncId::Okay, b"OKAY"),
            (SyncId::Fail, b"FAIL"),
            (SyncId::Dent, b"DENT"),
            (SyncId::Quit, b"QUIT"),
        ];
        for (id, bytes) in variants {
            assert_eq!(id.as_bytes(), *bytes);
            assert_eq!(SyncId::from_bytes(*bytes), Some(*id));
        }
    }

    #[test]
    fn test_sync_id_unknown() {
        assert_eq!(SyncId::from_bytes(b"XXXX"), None);
    }

    #[tokio::test]
    async fn test_read_write_sync_frame_round_trip() {
        let (mut client, mut server) = duplex(256);
        write_sync_frame(&mut client, SyncId::Data, b"hello").await.unwrap();
        let (id, len, payload) = read_sync_frame(&mut server).await.unwrap();
        assert_eq!(id, SyncId::Data);
        assert_eq!(len, 5);
        assert_eq!(payload, b"hello");
    }

    #[tokio::test]
    async fn test_read_sync_frame_max_data_chunk() {
        let (mut client, mut server) = duplex(70_000);
        let data = vec![7u8; SYNC_DATA_MAX as usize];
        write_sync_frame(&mut client, SyncId::Data, &data).await.unwrap();
        let (_, len, payload) = read_sync_frame(&mut server).await.unwrap();
        assert_eq!(len, SYNC_DATA_MAX);
        assert_eq!(payload.len(), SYNC_DATA_MAX as usize);
    }

    #[tokio::test]
    async fn test_read_sync_frame_oversize_rejected() {
        let (mut client, mut server) = duplex(64);
        let mut header = Vec::new();
        header.extend_from_slice(b"DATA");
        header.extend_from_slice(&(SYNC_DATA_MAX + 1).to_le_bytes());
        client.write_all(&header).await.unwrap();
        let err = read_sync_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, AdbServerError::Protocol(msg) if msg == "oversize"));
    }

    #[tokio::test]
    async fn test_read_sync_frame_unknown_id() {
        let (mut client, mut server) = duplex(64);
        client.write_all(b"NOPE\x00\x00\x00\x00").await.unwrap();
        let err = read_sync_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, AdbServerError::Protocol(_)));
    }

    #[test]
    fn test_file_stat_round_trip() {
        let stat = FileStat {
            mode: 0o100644,
            size: 1024,
            mtime: 1_700_000_000,
        };
        let bytes = stat.to_bytes();
        let parsed = FileStat::from_bytes(&bytes).unwrap();
        assert_eq!(stat, parsed);
        assert!(parsed.is_file());
        assert!(!parsed.is_directory());
    }

    #[test]
    fn test_dirent_round_trip() {
        let dirent = Dirent {
            name: "hello.txt".to_string(),
            mode: 0o100644,
            size: 42,
            mtime: 1_700_000_000,
        };
        let bytes = dirent.to_bytes();
        let parsed = Dirent::from_bytes(&bytes).unwrap();
        assert_eq!(dirent, parsed);
    }

    #[test]
    fn test_dirent_empty_name() {
        let dirent = Dirent {
            name: String::new(),
            mode: 0,
            size: 0,
            mtime: 0,
        };
        let bytes = dirent.to_bytes();
        let parsed = Dirent::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.name, "");
    }
}
