//! Executor read–dispatch–write loop.
//!
//! Reads request lines from the host, dispatches them one at a time in
//! arrival order, and writes each response as soon as it is ready. Malformed
//! lines are counted and skipped; they never end the loop.

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::dispatch::Dispatcher;
use crate::protocol::codec::{encode_line, Line, LineCodec};
use crate::protocol::{decode_line, Decoded, Request, Response};
use crate::{BridgeError, Result};

/// Totals reported when the loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeSummary {
    /// Requests dispatched.
    pub handled: u64,
    /// Lines discarded as malformed.
    pub noise: u64,
}

/// Serve requests from `input` until EOF or cancellation.
///
/// # Errors
///
/// Returns [`BridgeError::Io`] when reading or writing fails. Over-long lines
/// are counted as noise instead.
pub async fn serve<R, W>(
    input: R,
    mut output: W,
    dispatcher: &mut Dispatcher,
    max_line_bytes: usize,
    cancel: CancellationToken,
) -> Result<ServeSummary>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut framed = FramedRead::new(input, LineCodec::with_max_line_bytes(max_line_bytes));
    let mut summary = ServeSummary::default();

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("executor: cancellation received, stopping");
                break;
            }

            item = framed.next() => {
                match item {
                    None => {
                        info!(handled = summary.handled, noise = summary.noise, "executor: input closed");
                        break;
                    }

                    Some(Err(e)) => {
                        warn!(error = %e, "executor: read failed, stopping");
                        return Err(e);
                    }

                    Some(Ok(Line::TooLong)) => {
                        summary.noise += 1;
                        warn!(max_line_bytes, "executor: line too long, skipping");
                    }

                    Some(Ok(Line::Text(line))) => match decode_line::<Request>(&line) {
                        Decoded::Noise(reason) => {
                            summary.noise += 1;
                            warn!(reason = reason.as_str(), "executor: discarding malformed line");
                        }
                        Decoded::Packet(request) => {
                            summary.handled += 1;
                            debug!(id = ?request.id, reference = ?request.reference, "executor: request received");
                            if let Some(response) = dispatcher.dispatch(request).await {
                                write_response(&mut output, &response).await?;
                            }
                        }
                    },
                }
            }
        }
    }

    Ok(summary)
}

async fn write_response<W: AsyncWrite + Unpin>(output: &mut W, response: &Response) -> Result<()> {
    let bytes = encode_line(response)?;
    output.write_all(&bytes).await.map_err(|e| {
        warn!(id = response.id, error = %e, "executor: write failed");
        BridgeError::from(e)
    })?;
    output.flush().await?;
    Ok(())
}
