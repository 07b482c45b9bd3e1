//! Bidirectional splice between a client and its backend.
//!
//! Each direction copies until its source reaches EOF, then half-closes its
//! destination. The relay finishes once both directions have finished. An
//! error in either direction cancels both, as does the idle deadline, which
//! only fires once neither direction has moved a byte for the whole window.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;

const RELAY_BUFFER_SIZE: usize = 8192;

/// Bytes moved by a finished relay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub client_to_backend: u64,
    pub backend_to_client: u64,
}

/// Last time either direction moved bytes, as millis since `started`.
struct Activity {
    started: Instant,
    last_ms: AtomicU64,
}

impl Activity {
    fn new() -> Self {
        Activity {
            started: Instant::now(),
            last_ms: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        let elapsed = self.started.elapsed().as_millis() as u64;
        self.last_ms.fetch_max(elapsed, Ordering::Relaxed);
    }

    fn last(&self) -> Instant {
        self.started + Duration::from_millis(self.last_ms.load(Ordering::Relaxed))
    }
}

pub async fn relay<C, B>(
    client: &mut C,
    backend: &mut B,
    idle_timeout: Option<Duration>,
) -> io::Result<RelayStats>
where
    C: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut backend_read, mut backend_write) = tokio::io::split(backend);
    let activity = Activity::new();

    let upstream = copy_direction(&mut client_read, &mut backend_write, &activity);
    let downstream = copy_direction(&mut backend_read, &mut client_write, &activity);
    let copies = async { tokio::try_join!(upstream, downstream) };

    let (client_to_backend, backend_to_client) = match idle_timeout {
        Some(idle) => tokio::select! {
            result = copies => result?,
            err = idle_watchdog(&activity, idle) => return Err(err),
        },
        None => copies.await?,
    };
    Ok(RelayStats {
        client_to_backend,
        backend_to_client,
    })
}

async fn idle_watchdog(activity: &Activity, idle: Duration) -> io::Error {
    loop {
        let deadline = activity.last() + idle;
        if Instant::now() >= deadline {
            return io::Error::new(io::ErrorKind::TimedOut, "relay idle timeout");
        }
        tokio::time::sleep_until(deadline).await;
    }
}

async fn copy_direction<R, W>(reader: &mut R, writer: &mut W, activity: &Activity) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut total = 0u64;
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        activity.touch();
        writer.write_all(&buf[..n]).await?;
        activity.touch();
        total += n as u64;
    }
    // The peer may already be gone; the other direction reports that.
    if let Err(err) = writer.shutdown().await {
        debug!("Half-close after EOF failed: {}", err);
    }
    Ok(total)
}
