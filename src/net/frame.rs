//! Length-prefixed framing over the raw TCP stream
//!
//! Each frame is a u32 big-endian body length followed by the message body
//! (`tag|payload`, UTF-8). The prefix makes reassembly exact: several logical
//! messages arriving in one read, or one message split across reads, decode
//! the same way.

use bytes::{BufMut, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::protocol::{DecodeError, Message};

/// Maximum accepted frame body size. Nothing in the protocol comes close;
/// anything larger is a misbehaving or hostile peer.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Errors reading a frame from the stream
#[derive(Debug, Error)]
pub enum FrameError {
    /// Stream-level failure; the connection is gone
    #[error("stream error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer announced a body larger than [`MAX_FRAME_SIZE`]
    #[error("frame body of {0} bytes exceeds limit of {MAX_FRAME_SIZE}")]
    Oversize(usize),

    /// Body read fine but did not decode; the connection stays usable
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Write one framed message
pub async fn write_frame<W>(writer: &mut W, msg: &Message) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let body = msg.encode();
    debug_assert!(body.len() <= MAX_FRAME_SIZE);

    let mut frame = BytesMut::with_capacity(4 + body.len());
    frame.put_u32(body.len() as u32);
    frame.put_slice(&body);

    writer.write_all(&frame).await?;
    writer.flush().await
}

/// Read one framed message
///
/// Returns `Ok(None)` on a clean end-of-stream at a frame boundary. An EOF
/// in the middle of a frame is reported as an I/O error.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Message>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(FrameError::Oversize(len));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;

    Ok(Some(Message::decode(&body)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::protocol::MessageKind;
    use tokio::io::duplex;

    #[tokio::test]
    async fn round_trip_over_stream() {
        let (mut client, mut server) = duplex(4096);

        let msg = Message::new(MessageKind::SetNickname, "Rex");
        write_frame(&mut client, &msg).await.unwrap();

        let got = read_frame(&mut server).await.unwrap().unwrap();
        assert_eq!(got, msg);
    }

    #[tokio::test]
    async fn two_frames_in_one_write_stay_separate() {
        let (mut client, mut server) = duplex(4096);

        let first = Message::new(MessageKind::PlayerPosition, "200,15,false");
        let second = Message::new(MessageKind::PlayerDied, "15");

        // Concatenate both frames into a single write, as TCP may deliver them.
        let mut bytes = Vec::new();
        for msg in [&first, &second] {
            let body = msg.encode();
            bytes.extend_from_slice(&(body.len() as u32).to_be_bytes());
            bytes.extend_from_slice(&body);
        }
        client.write_all(&bytes).await.unwrap();

        assert_eq!(read_frame(&mut server).await.unwrap().unwrap(), first);
        assert_eq!(read_frame(&mut server).await.unwrap().unwrap(), second);
    }

    #[tokio::test]
    async fn frame_split_across_writes_reassembles() {
        let (mut client, mut server) = duplex(4096);

        let msg = Message::new(MessageKind::GameStart, "1200,512,0;1200,677,1;1200,703,2");
        let body = msg.encode();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(body.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&body);

        let reader = tokio::spawn(async move { read_frame(&mut server).await });

        // Trickle the frame out a few bytes at a time.
        for chunk in bytes.chunks(3) {
            client.write_all(chunk).await.unwrap();
            client.flush().await.unwrap();
            tokio::task::yield_now().await;
        }

        let got = reader.await.unwrap().unwrap().unwrap();
        assert_eq!(got, msg);
    }

    #[tokio::test]
    async fn clean_eof_returns_none() {
        let (client, mut server) = duplex(64);
        drop(client);

        assert!(read_frame(&mut server).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversize_frame_rejected() {
        let (mut client, mut server) = duplex(64);

        tokio::spawn(async move {
            let len = (MAX_FRAME_SIZE as u32 + 1).to_be_bytes();
            let _ = client.write_all(&len).await;
        });

        assert!(matches!(
            read_frame(&mut server).await,
            Err(FrameError::Oversize(_))
        ));
    }

    #[tokio::test]
    async fn undecodable_body_is_a_decode_error() {
        let (mut client, mut server) = duplex(64);

        let body = b"99|whatever";
        client
            .write_all(&(body.len() as u32).to_be_bytes())
            .await
            .unwrap();
        client.write_all(body).await.unwrap();

        assert!(matches!(
            read_frame(&mut server).await,
            Err(FrameError::Decode(DecodeError::UnknownTag(99)))
        ));
    }
}
