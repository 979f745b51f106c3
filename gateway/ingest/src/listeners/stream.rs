//! Byte-stream listeners for the temperature and smoke sensor families.
//!
//! Framing is deliberately loose: each read of up to 1024 bytes is one
//! reading, which is what the deployed producers send (one reading per
//! `send`, no delimiter). One connection is served at a time per
//! listener; a disconnect or reset tears the connection down and the
//! listener goes back to accepting.

use std::sync::Arc;

use anyhow::{Context, Result};
use iotqueue::{Envelope, Publish};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const READ_BUFFER_BYTES: usize = 1024;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum FrameError {
    #[error("payload is not valid utf-8")]
    NotUtf8,

    #[error("expected '<smoke>,<co>', got '{0}'")]
    BadPair(String),

    #[error("not a decimal number: '{0}'")]
    BadNumber(String),
}

/// Which wire framing a listener speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorFamily {
    Temperature,
    Smoke,
}

impl SensorFamily {
    fn label(&self) -> &'static str {
        match self {
            SensorFamily::Temperature => "temperature",
            SensorFamily::Smoke => "smoke",
        }
    }

    /// One received chunk is one reading.
    pub fn parse(&self, chunk: &[u8]) -> Result<Envelope, FrameError> {
        let text = std::str::from_utf8(chunk)
            .map_err(|_| FrameError::NotUtf8)?
            .trim();

        match self {
            SensorFamily::Temperature => Ok(Envelope::temperature(parse_decimal(text)?)),
            SensorFamily::Smoke => {
                let (smoke, co) = text
                    .split_once(',')
                    .ok_or_else(|| FrameError::BadPair(text.to_string()))?;
                Ok(Envelope::smoke(parse_decimal(smoke)?, parse_decimal(co)?))
            }
        }
    }
}

fn parse_decimal(s: &str) -> Result<f64, FrameError> {
    let s = s.trim();
    s.parse::<f64>()
        .map_err(|_| FrameError::BadNumber(s.to_string()))
}

#[derive(Debug, Clone)]
pub struct StreamListenerConfig {
    pub bind_addr: String,
    pub family: SensorFamily,
}

pub struct StreamListener {
    listener: TcpListener,
    family: SensorFamily,
}

impl StreamListener {
    pub async fn bind(cfg: StreamListenerConfig) -> Result<Self> {
        let listener = TcpListener::bind(&cfg.bind_addr)
            .await
            .with_context(|| {
                format!("binding {} listener on {}", cfg.family.label(), cfg.bind_addr)
            })?;
        info!("{} listener on {}", cfg.family.label(), cfg.bind_addr);

        Ok(Self {
            listener,
            family: cfg.family,
        })
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept loop. One connection is served to completion before the
    /// next accept; the loop only exits on shutdown.
    pub async fn run(self, publisher: Arc<dyn Publish>, shutdown: CancellationToken) -> Result<()> {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("{} listener shutting down", self.family.label());
                    return Ok(());
                }

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        info!("{} connection from {peer}", self.family.label());
                        self.serve(stream, publisher.as_ref(), &shutdown).await;
                    }
                    Err(e) => {
                        warn!("{} accept failed: {e}", self.family.label());
                    }
                },
            }
        }
    }

    /// Receive loop for one connection. Returns on disconnect, reset, or
    /// shutdown; the caller resumes accepting.
    async fn serve(
        &self,
        mut stream: TcpStream,
        publisher: &dyn Publish,
        shutdown: &CancellationToken,
    ) {
        let mut buf = [0u8; READ_BUFFER_BYTES];

        loop {
            let n = tokio::select! {
                _ = shutdown.cancelled() => return,

                read = stream.read(&mut buf) => match read {
                    Ok(0) => {
                        info!("{} peer disconnected", self.family.label());
                        return;
                    }
                    Ok(n) => n,
                    Err(e) => {
                        warn!("{} connection error: {e}", self.family.label());
                        return;
                    }
                },
            };

            match self.family.parse(&buf[..n]) {
                Ok(envelope) => {
                    if let Err(e) = publisher.publish(&envelope).await {
                        warn!("{} publish failed: {e}", self.family.label());
                    }
                }
                Err(e) => {
                    // One bad chunk never takes the connection down.
                    warn!("{} dropped malformed reading: {e}", self.family.label());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use iotqueue::PublishError;
    use tokio::io::AsyncWriteExt;
    use tokio::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingPublisher {
        seen: Mutex<Vec<Envelope>>,
    }

    #[async_trait::async_trait]
    impl Publish for RecordingPublisher {
        async fn publish(&self, envelope: &Envelope) -> Result<(), PublishError> {
            self.seen.lock().await.push(envelope.clone());
            Ok(())
        }
    }

    #[test]
    fn temperature_chunk_is_one_reading() {
        let env = SensorFamily::Temperature.parse(b"23.45").unwrap();
        assert_eq!(env, Envelope::temperature(23.45));
    }

    #[test]
    fn smoke_chunk_is_a_pair() {
        let env = SensorFamily::Smoke.parse(b"0.123,0.045").unwrap();
        assert_eq!(env, Envelope::smoke(0.123, 0.045));
    }

    #[test]
    fn malformed_chunks_are_rejected() {
        assert_eq!(
            SensorFamily::Temperature.parse(b"warm"),
            Err(FrameError::BadNumber("warm".to_string()))
        );
        assert_eq!(
            SensorFamily::Smoke.parse(b"0.5"),
            Err(FrameError::BadPair("0.5".to_string()))
        );
        assert_eq!(
            SensorFamily::Smoke.parse(b"0.5,high"),
            Err(FrameError::BadNumber("high".to_string()))
        );
        assert_eq!(
            SensorFamily::Temperature.parse(&[0xff, 0xfe]),
            Err(FrameError::NotUtf8)
        );
    }

    #[tokio::test]
    async fn listener_publishes_and_resumes_accepting() {
        let publisher = Arc::new(RecordingPublisher::default());
        let listener = StreamListener::bind(StreamListenerConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            family: SensorFamily::Temperature,
        })
        .await
        .unwrap();
        let addr = listener.local_addr().unwrap();

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(listener.run(
            publisher.clone() as Arc<dyn Publish>,
            shutdown.clone(),
        ));

        // First connection: one good reading, then disconnect.
        {
            let mut conn = TcpStream::connect(addr).await.unwrap();
            conn.write_all(b"23.45").await.unwrap();
            conn.shutdown().await.unwrap();
        }

        // Second connection: a malformed reading must not kill anything.
        {
            let mut conn = TcpStream::connect(addr).await.unwrap();
            conn.write_all(b"warm").await.unwrap();
            conn.shutdown().await.unwrap();
        }

        // Third connection still gets served.
        {
            let mut conn = TcpStream::connect(addr).await.unwrap();
            conn.write_all(b"24.0").await.unwrap();
            conn.shutdown().await.unwrap();
        }

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if publisher.seen.lock().await.len() >= 2 {
                break;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for published readings"
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let seen = publisher.seen.lock().await.clone();
        assert_eq!(seen, vec![Envelope::temperature(23.45), Envelope::temperature(24.0)]);

        shutdown.cancel();
        task.await.unwrap().unwrap();
    }
}
