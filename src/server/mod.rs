//! Stdio Transport Adapter
//!
//! Line-delimited JSON transport: one request envelope per line on stdin,
//! one response envelope per line on stdout. Each decoded request runs in
//! its own task; responses are funneled through a single writer and come
//! back in completion order, so callers must match on the correlation id.

#[cfg(test)]
mod tests;

use crate::dispatch::Dispatcher;
use crate::protocol::{CorrelationId, ErrorKind, RequestEnvelope, ResponseEnvelope};
use anyhow::Result;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Bound on responses waiting for the writer before dispatch tasks
/// backpressure.
const RESPONSE_CHANNEL_CAPACITY: usize = 64;

/// Serves a dispatcher over stdin/stdout.
pub struct StdioServer {
    dispatcher: Dispatcher,
}

impl StdioServer {
    #[inline]
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Run the serve loop until stdin reaches EOF. In-flight requests
    /// drain before the loop exits.
    #[inline]
    pub async fn serve(self) -> Result<()> {
        info!("Starting dispatch server on stdio transport");
        let stdin = io::stdin();
        let stdout = io::stdout();
        serve_connection(self.dispatcher, BufReader::new(stdin), stdout).await?;
        info!("Dispatch server stopped");
        Ok(())
    }
}

/// Transport loop over arbitrary byte streams. Split out from
/// [`StdioServer::serve`] so tests can drive it with in-memory buffers.
#[inline]
pub async fn serve_connection<R, W>(dispatcher: Dispatcher, reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let (tx, mut rx) = mpsc::channel::<ResponseEnvelope>(RESPONSE_CHANNEL_CAPACITY);
    let mut tx = Some(tx);
    // Lines::next_line is cancel-safe, so losing a select race to the
    // writer arm never drops partial input.
    let mut lines = reader.lines();

    loop {
        tokio::select! {
            line = lines.next_line(), if tx.is_some() => {
                match line? {
                    Some(line) => {
                        if let Some(tx) = &tx {
                            accept_line(&dispatcher, &line, tx);
                        }
                    }
                    None => {
                        debug!("EOF reached, draining in-flight requests");
                        // Dropping the sender lets the loop end once every
                        // spawned request has produced its response.
                        tx = None;
                    }
                }
            }
            response = rx.recv() => {
                match response {
                    Some(response) => write_response(&mut writer, &response).await?,
                    None => break,
                }
            }
        }
    }

    Ok(())
}

/// Decode one input line and spawn its dispatch task. Undecodable lines
/// get a Failure response with an unknown correlation token instead of
/// tearing down the serve loop.
fn accept_line(dispatcher: &Dispatcher, line: &str, tx: &mpsc::Sender<ResponseEnvelope>) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    match serde_json::from_str::<RequestEnvelope>(line) {
        Ok(request) => {
            let dispatcher = dispatcher.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let response = dispatcher.handle(request).await;
                // A closed receiver means the transport is gone; the
                // response is dropped, not relayed.
                let _ = tx.send(response).await;
            });
        }
        Err(e) => {
            error!("Failed to decode request line: {}", e);
            let response = ResponseEnvelope::failure(
                CorrelationId::unknown(),
                ErrorKind::SchemaMismatch,
                format!("Request line is not a valid request envelope: {}", e),
                None,
            );
            // Sent from a task so a full channel cannot stall the reader
            // while the writer arm is parked in the same select loop.
            let tx = tx.clone();
            tokio::spawn(async move {
                let _ = tx.send(response).await;
            });
        }
    }
}

async fn write_response<W>(writer: &mut W, response: &ResponseEnvelope) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let json = serde_json::to_string(response)?;
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
