use tokio::net::TcpStream;
use tokio::time;

use crate::config::ClientConfig;
use crate::protocol::{self, Bet, ProtocolError};
use crate::shutdown::ShutdownToken;
use crate::source::BetReader;
use crate::transport::{ReliableChannel, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum UplinkError {
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    #[error("batch send failed: {0}")]
    Send(TransportError),

    #[error("frame encoding failed: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("data source error: {0}")]
    Source(#[from] std::io::Error),
}

/// Failures while reading the winners reply. These never abort the client;
/// they are only reported through the log.
#[derive(Debug, thiserror::Error)]
enum WinnersError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// The client state machine: per-batch connect/send/confirm/delay, then the
/// finished frame and the winners query once the source dries up.
///
/// Failure policy: connection establishment and frame sends are fatal and
/// abort the loop; confirmation and winners reads are best effort and only
/// logged. Cancellation stops the loop at the next suspension point without
/// entering the finishing phase.
pub struct UplinkClient {
    config: ClientConfig,
    token: ShutdownToken,
}

impl UplinkClient {
    pub fn new(config: ClientConfig, token: ShutdownToken) -> Self {
        Self { config, token }
    }

    pub async fn run<R>(&self, mut source: BetReader<R>) -> Result<(), UplinkError>
    where
        R: tokio::io::AsyncBufRead + Unpin,
    {
        loop {
            if self.token.is_cancelled() {
                return self.stopped();
            }

            let bets = source.next_batch(self.config.batch_max).await?;
            if bets.is_empty() {
                // source exhausted, move on to the finishing phase
                break;
            }

            if !self.send_batch(&bets).await? {
                return self.stopped();
            }

            tokio::select! {
                _ = time::sleep(self.config.loop_period) => {}
                _ = self.token.cancelled() => return self.stopped(),
            }
        }

        tracing::info!(
            action = "agency_finished",
            result = "success",
            agency = self.config.agency,
        );
        self.fetch_winners().await?;
        tracing::info!(
            action = "loop_finished",
            result = "success",
            agency = self.config.agency,
        );
        Ok(())
    }

    fn stopped(&self) -> Result<(), UplinkError> {
        tracing::info!(
            action = "loop_stopped",
            result = "success",
            agency = self.config.agency,
        );
        Ok(())
    }

    /// Sends one batch over a fresh connection and waits for the one-byte
    /// confirmation. Returns `Ok(false)` when cancellation interrupted the
    /// exchange; the connection is dropped (and therefore closed) on every
    /// path out of this function.
    async fn send_batch(&self, bets: &[Bet]) -> Result<bool, UplinkError> {
        let frame = protocol::encode_batch(self.config.agency, bets)?;

        let Some(mut channel) = self.connect().await? else {
            return Ok(false);
        };

        let sent = tokio::select! {
            r = channel.send_all(&frame) => r,
            _ = self.token.cancelled() => return Ok(false),
        };
        sent.map_err(UplinkError::Send)?;
        tracing::info!(
            action = "send_batch",
            result = "success",
            agency = self.config.agency,
            batch_size = bets.len(),
            frame_len = frame.len(),
        );

        // absence of the confirmation byte is tolerated for this batch
        tokio::select! {
            r = channel.recv_exact(1) => match r {
                Ok(byte) => tracing::info!(
                    action = "receive_confirmation",
                    result = "success",
                    agency = self.config.agency,
                    confirmation = byte[0],
                ),
                Err(e) => tracing::error!(
                    action = "receive_confirmation",
                    result = "fail",
                    agency = self.config.agency,
                    error = %e,
                ),
            },
            _ = self.token.cancelled() => return Ok(false),
        }

        Ok(true)
    }

    /// Announces end of transmission and asks for the winning documents.
    async fn fetch_winners(&self) -> Result<(), UplinkError> {
        let Some(mut channel) = self.connect().await? else {
            return Ok(());
        };

        let frame = protocol::encode_finished(self.config.agency);
        let sent = tokio::select! {
            r = channel.send_all(&frame) => r,
            _ = self.token.cancelled() => return Ok(()),
        };
        sent.map_err(UplinkError::Send)?;

        let report = tokio::select! {
            r = read_winners(&mut channel) => r,
            _ = self.token.cancelled() => return Ok(()),
        };
        match report {
            Ok(documents) => tracing::info!(
                action = "receive_winners",
                result = "success",
                agency = self.config.agency,
                winners = documents.len(),
                documents = ?documents,
            ),
            // a lost or truncated reply still lets the client finish
            Err(e) => tracing::error!(
                action = "receive_winners",
                result = "fail",
                agency = self.config.agency,
                error = %e,
            ),
        }
        Ok(())
    }

    async fn connect(&self) -> Result<Option<ReliableChannel<TcpStream>>, UplinkError> {
        let addr = &self.config.server_addr;
        let stream = tokio::select! {
            r = TcpStream::connect(addr) => r.map_err(|source| UplinkError::Connect {
                addr: addr.clone(),
                source,
            })?,
            _ = self.token.cancelled() => return Ok(None),
        };
        tracing::debug!(
            action = "connect",
            result = "success",
            agency = self.config.agency,
        );
        Ok(Some(ReliableChannel::new(stream)))
    }
}

async fn read_winners(
    channel: &mut ReliableChannel<TcpStream>,
) -> Result<Vec<u32>, WinnersError> {
    let count = channel.recv_exact(1).await?[0];
    let payload = channel.recv_exact(count as usize * 4).await?;
    Ok(protocol::decode_winner_documents(count, &payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tokio::time::timeout;

    use crate::protocol::RECORD_SIZE;

    const CSV: &str = "Juan,Perez,30904465,1999-03-17,7863\n\
                       Maria,Diaz,20111222,1985-11-02,4321\n";

    fn config(addr: String, batch_max: usize, period_ms: u64) -> ClientConfig {
        ClientConfig {
            agency: 5,
            server_addr: addr,
            loop_period: Duration::from_millis(period_ms),
            batch_max,
            data_file: PathBuf::new(),
        }
    }

    async fn read_frame(socket: &mut tokio::net::TcpStream) -> (u8, u8, Vec<u8>) {
        let mut header = [0u8; 2];
        socket.read_exact(&mut header).await.unwrap();
        let mut body = vec![0u8; header[1] as usize * RECORD_SIZE];
        socket.read_exact(&mut body).await.unwrap();
        (header[0], header[1], body)
    }

    #[tokio::test]
    async fn uploads_batches_then_fetches_winners() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let (agency, count, body) = read_frame(&mut socket).await;
            assert_eq!((agency, count), (5, 2));
            assert_eq!(body.len(), 2 * RECORD_SIZE);
            assert_eq!(body[0], 5); // each record carries the agency byte
            socket.write_all(&[1]).await.unwrap();
            drop(socket);

            let (mut socket, _) = listener.accept().await.unwrap();
            let (agency, count, _) = read_frame(&mut socket).await;
            assert_eq!((agency, count), (5, 0));
            socket.write_all(&[2]).await.unwrap();
            socket.write_all(&30904465u32.to_le_bytes()).await.unwrap();
            socket.write_all(&20111222u32.to_le_bytes()).await.unwrap();
        });

        let client = UplinkClient::new(config(addr, 2, 10), ShutdownToken::new());
        let source = BetReader::new(CSV.as_bytes(), 5);
        timeout(Duration::from_secs(5), client.run(source))
            .await
            .expect("client should finish")
            .unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn missing_confirmation_does_not_abort_the_loop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            // swallow the batch and close without confirming
            let (mut socket, _) = listener.accept().await.unwrap();
            let (_, count, _) = read_frame(&mut socket).await;
            assert_eq!(count, 2);
            drop(socket);

            // the client must still reach the finishing phase
            let (mut socket, _) = listener.accept().await.unwrap();
            let (_, count, _) = read_frame(&mut socket).await;
            assert_eq!(count, 0);
            socket.write_all(&[0]).await.unwrap();
        });

        let client = UplinkClient::new(config(addr, 2, 10), ShutdownToken::new());
        let source = BetReader::new(CSV.as_bytes(), 5);
        timeout(Duration::from_secs(5), client.run(source))
            .await
            .expect("client should finish")
            .unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn cancellation_during_the_delay_stops_promptly() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let (first_batch_tx, first_batch_rx) = oneshot::channel();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let (_, count, _) = read_frame(&mut socket).await;
            assert_eq!(count, 1);
            socket.write_all(&[1]).await.unwrap();
            first_batch_tx.send(()).unwrap();
        });

        // a 30 second period guarantees the loop is parked in the delay
        let token = ShutdownToken::new();
        let client = UplinkClient::new(config(addr, 1, 30_000), token.clone());
        let handle = tokio::spawn(async move {
            let source = BetReader::new(CSV.as_bytes(), 5);
            client.run(source).await
        });

        first_batch_rx.await.unwrap();
        token.cancel();

        timeout(Duration::from_secs(1), handle)
            .await
            .expect("cancellation must cut the delay short")
            .unwrap()
            .unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn connect_failure_is_fatal() {
        // bind then drop to get an address nothing is listening on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let client = UplinkClient::new(config(addr, 2, 10), ShutdownToken::new());
        let source = BetReader::new(CSV.as_bytes(), 5);
        let err = timeout(Duration::from_secs(5), client.run(source))
            .await
            .expect("connect should fail fast")
            .unwrap_err();
        assert!(matches!(err, UplinkError::Connect { .. }));
    }

    #[tokio::test]
    async fn cancelled_token_prevents_any_batch() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let token = ShutdownToken::new();
        token.cancel();

        let client = UplinkClient::new(config(addr, 2, 10), token);
        let source = BetReader::new(CSV.as_bytes(), 5);
        client.run(source).await.unwrap();

        // nothing ever connected
        let mut accept = std::pin::pin!(listener.accept());
        assert!(
            timeout(Duration::from_millis(50), &mut accept).await.is_err(),
            "no connection should have been made"
        );
    }
}
