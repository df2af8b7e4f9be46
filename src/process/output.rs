// src/process/output.rs

//! Background readers draining the terminal's stdout and stderr.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::sinks::Sinks;

/// Reader tasks for one child, plus a receiver that yields `None` once every
/// reader has finished (all streams closed, or the readers were aborted).
pub struct OutputReaders {
    pub handles: Vec<JoinHandle<()>>,
    pub closed: mpsc::Receiver<()>,
}

/// Spawn one line reader per available stream. Each line, with its trailing
/// newline stripped, goes to the log sink.
pub fn spawn_output_readers<O, E>(
    stdout: Option<O>,
    stderr: Option<E>,
    sinks: Arc<Sinks>,
) -> OutputReaders
where
    O: AsyncRead + Unpin + Send + 'static,
    E: AsyncRead + Unpin + Send + 'static,
{
    // Every reader holds a sender; the receiver sees `None` when all are gone.
    let (tx, closed) = mpsc::channel::<()>(1);
    let mut handles = Vec::with_capacity(2);

    if let Some(out) = stdout {
        handles.push(spawn_line_reader("stdout", out, Arc::clone(&sinks), tx.clone()));
    }
    if let Some(err) = stderr {
        handles.push(spawn_line_reader("stderr", err, Arc::clone(&sinks), tx.clone()));
    }

    OutputReaders { handles, closed }
}

fn spawn_line_reader<R>(
    stream_name: &'static str,
    stream: R,
    sinks: Arc<Sinks>,
    alive: mpsc::Sender<()>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let _alive = alive;
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::with_capacity(256);

        // Raw bytes, decoded lossily: a stray non-UTF-8 byte must not stop
        // the draining, or the terminal dies on its next write.
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    sinks.child_line(line.trim_end_matches(['\r', '\n']));
                }
                Err(e) => {
                    warn!(stream = stream_name, error = %e, "error reading terminal output");
                    sinks.log(&format!("Error reading output: {e}"));
                    break;
                }
            }
        }

        debug!(stream = stream_name, "terminal output stream closed");
    })
}
