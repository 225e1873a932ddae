use crate::error::SessionError;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug};

/// Direction names one half of a relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    ClientToTarget,
    TargetToClient,
}

/// RelayStats counts the bytes moved in each direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub client_to_target: u64,
    pub target_to_client: u64,
}

/// DirectionReport is sent exactly once by each copy task
#[derive(Debug)]
struct DirectionReport {
    direction: Direction,
    bytes: u64,
    result: Result<(), SessionError>,
}

/// relay pumps bytes between client and target until one direction sees
/// end-of-stream or an error. The other direction is then cancelled, both
/// directions report, and both streams have been dropped by the time this
/// returns. The first error reported wins.
///
/// A half-close is not kept open: once the client shuts down its write side,
/// anything the target still sends back is dropped
pub async fn relay<A, B>(
    client: A,
    target: B,
    buffer_size: usize,
) -> Result<RelayStats, SessionError>
where
    A: AsyncRead + AsyncWrite + Send + 'static,
    B: AsyncRead + AsyncWrite + Send + 'static,
{
    let (client_read, client_write) = tokio::io::split(client);
    let (target_read, target_write) = tokio::io::split(target);

    let token = CancellationToken::new();

    // Room for both reports so neither task waits on the collector
    let (reports_tx, mut reports_rx) = mpsc::channel(2);

    tokio::spawn(
        pump(
            client_read,
            target_write,
            Direction::ClientToTarget,
            buffer_size,
            token.clone(),
            reports_tx.clone(),
        )
        .in_current_span(),
    );
    tokio::spawn(
        pump(
            target_read,
            client_write,
            Direction::TargetToClient,
            buffer_size,
            token.clone(),
            reports_tx,
        )
        .in_current_span(),
    );

    let mut stats = RelayStats::default();
    let mut first_error = None;

    for _ in 0..2 {
        let Some(report) = reports_rx.recv().await else {
            // A task died without reporting
            token.cancel();
            if first_error.is_none() {
                first_error = Some(SessionError::TransportRead(io::Error::other(
                    "relay task ended without reporting",
                )));
            }
            break;
        };

        match report.direction {
            Direction::ClientToTarget => stats.client_to_target = report.bytes,
            Direction::TargetToClient => stats.target_to_client = report.bytes,
        }

        if let Err(e) = report.result {
            debug!("{:?} ended with error: {e}", report.direction);
            if first_error.is_none() {
                first_error = Some(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(stats),
    }
}

/// pump copies reader into writer through a bounded buffer until EOF,
/// an error, or cancellation by the peer direction
async fn pump<R, W>(
    mut reader: R,
    mut writer: W,
    direction: Direction,
    buffer_size: usize,
    token: CancellationToken,
    reports: mpsc::Sender<DirectionReport>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    // Peer direction is cancelled whenever this one exits, panics included
    let _cancel_peer = token.clone().drop_guard();

    let mut buf = vec![0u8; buffer_size.max(1)];
    let mut bytes = 0u64;

    let result = loop {
        let n = tokio::select! {
            _ = token.cancelled() => break Ok(()),
            read = reader.read(&mut buf) => match read {
                Ok(0) => break Ok(()),
                Ok(n) => n,
                Err(e) => break Err(SessionError::TransportRead(e)),
            },
        };

        tokio::select! {
            _ = token.cancelled() => break Ok(()),
            written = writer.write_all(&buf[..n]) => {
                if let Err(e) = written {
                    break Err(SessionError::TransportWrite(e));
                }
            }
        }

        bytes += n as u64;
    };

    // Pass the end-of-stream on to the far side
    let _ = writer.shutdown().await;
    drop(reader);
    drop(writer);

    debug!("{direction:?} finished after {bytes} bytes");

    let _ = reports
        .send(DirectionReport {
            direction,
            bytes,
            result,
        })
        .await;
}
