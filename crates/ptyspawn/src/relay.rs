//! Shuttling bytes between the invoking process and a pty

use ptyspawn_pty::{AsyncPtyMaster, PtySession};
use std::io::{self, Read};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

const INPUT_CHANNEL_CAPACITY: usize = 32;
const INPUT_CHUNK: usize = 4096;

/// Copy pty output to `output` until the pty hangs up, feeding chunks from
/// `input` to the program meanwhile. Returns the number of bytes copied out.
pub async fn relay<W>(
    pty: PtySession,
    mut output: W,
    input: Option<mpsc::Receiver<Vec<u8>>>,
) -> io::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let master = AsyncPtyMaster::new(pty)?;
    let (mut reader, mut writer) = tokio::io::split(master);

    let input_task = input.map(|mut rx| {
        tokio::spawn(async move {
            while let Some(chunk) = rx.recv().await {
                if let Err(e) = writer.write_all(&chunk).await {
                    warn!("pty write error: {}", e);
                    break;
                }
            }
            debug!("input closed");
        })
    });

    let copied = tokio::io::copy(&mut reader, &mut output).await;
    if let Some(task) = input_task {
        task.abort();
    }
    let copied = copied?;
    output.flush().await?;
    Ok(copied)
}

/// Read this process's stdin on a dedicated thread.
///
/// The thread blocks in `read(2)`, so it is left running when the relay
/// ends; the receiver side just goes away.
pub fn stdin_channel() -> mpsc::Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel(INPUT_CHANNEL_CAPACITY);
    let spawned = std::thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            let mut stdin = io::stdin().lock();
            let mut buf = [0u8; INPUT_CHUNK];
            loop {
                match stdin.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.blocking_send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        warn!("stdin read error: {}", e);
                        break;
                    }
                }
            }
        });
    if let Err(e) = spawned {
        warn!("failed to start stdin reader: {}", e);
    }
    rx
}
