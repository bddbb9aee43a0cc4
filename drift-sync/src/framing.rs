//! Length-prefixed framing shared by the direct and relay transports.
//!
//! Every frame is a 4-byte big-endian length followed by that many payload
//! bytes. The relay server speaks the same framing.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum frame size accepted on any socket (1 MiB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Read one length-prefixed frame.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_size: usize,
) -> std::io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;

    if len > max_size {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame too large: {} > {}", len, max_size),
        ));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Write one length-prefixed frame.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    bytes: &[u8],
) -> std::io::Result<()> {
    let len = bytes.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(bytes).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frame_roundtrip() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        write_frame(&mut client, b"hello frame").await.unwrap();
        let frame = read_frame(&mut server, MAX_FRAME_SIZE).await.unwrap();
        assert_eq!(frame, b"hello frame");
    }

    #[tokio::test]
    async fn empty_frame_roundtrip() {
        let (mut client, mut server) = tokio::io::duplex(64);

        write_frame(&mut client, b"").await.unwrap();
        let frame = read_frame(&mut server, MAX_FRAME_SIZE).await.unwrap();
        assert!(frame.is_empty());
    }

    #[tokio::test]
    async fn oversized_frame_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);

        // Claim a frame far beyond the cap; the reader must refuse before
        // allocating.
        let len = (MAX_FRAME_SIZE as u32 + 1).to_be_bytes();
        tokio::io::AsyncWriteExt::write_all(&mut client, &len)
            .await
            .unwrap();

        let err = read_frame(&mut server, MAX_FRAME_SIZE).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn sender_order_preserved() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        for i in 0..5u8 {
            write_frame(&mut client, &[i]).await.unwrap();
        }
        for i in 0..5u8 {
            let frame = read_frame(&mut server, MAX_FRAME_SIZE).await.unwrap();
            assert_eq!(frame, vec![i]);
        }
    }
}
