use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("peer accepted zero bytes mid-write")]
    StalledWrite,

    #[error("short read: wanted {wanted} bytes, got {got}")]
    ShortRead { wanted: usize, got: usize },
}

/// Wraps one byte stream and absorbs partial reads and writes, so callers
/// only ever see whole-buffer sends and exact-length receives.
pub struct ReliableChannel<S> {
    stream: S,
}

impl<S: AsyncRead + AsyncWrite + Unpin> ReliableChannel<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Transmits the whole buffer or fails; there is no partial-success
    /// outcome. A write that makes no progress is reported as
    /// [`TransportError::StalledWrite`] rather than retried forever.
    pub async fn send_all(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        let mut written = 0;
        while written < buf.len() {
            let n = self.stream.write(&buf[written..]).await?;
            if n == 0 {
                return Err(TransportError::StalledWrite);
            }
            written += n;
        }
        self.stream.flush().await?;
        Ok(())
    }

    /// Reads exactly `len` bytes, accumulating across partial reads. A peer
    /// that closes the stream right after the final byte is still a success;
    /// end of stream before that is [`TransportError::ShortRead`].
    pub async fn recv_exact(&mut self, len: usize) -> Result<Vec<u8>, TransportError> {
        let mut buf = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            let n = self.stream.read(&mut buf[filled..]).await?;
            if n == 0 {
                return Err(TransportError::ShortRead {
                    wanted: len,
                    got: filled,
                });
            }
            filled += n;
        }
        Ok(buf)
    }
}
