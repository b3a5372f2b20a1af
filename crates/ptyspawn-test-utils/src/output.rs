use crate::CHILD_TIMEOUT;
use ptyspawn_pty::{AsyncPtyMaster, ExitStatus, Pid, ProcessRecord, ProcessTable};
use std::io;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;

/// Read everything the child writes until the pty hangs up.
pub async fn collect_output(record: &mut ProcessRecord) -> io::Result<Vec<u8>> {
    let pty = record
        .take_pty()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "record has no pty"))?;
    let mut master = AsyncPtyMaster::new(pty)?;
    let mut out = Vec::new();
    tokio::time::timeout(CHILD_TIMEOUT, master.read_to_end(&mut out))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "pty never hung up"))??;
    Ok(out)
}

/// Poll `reap_nonblocking` until `pid` shows up. Everything else reaped on
/// the way is returned along with it.
pub async fn reap_until(
    table: &mut ProcessTable,
    pid: Pid,
) -> Option<(ExitStatus, Vec<(Pid, ExitStatus)>)> {
    let deadline = Instant::now() + CHILD_TIMEOUT;
    let mut others = Vec::new();
    while Instant::now() < deadline {
        for (reaped, status) in table.reap_nonblocking() {
            if reaped == pid {
                return Some((status, others));
            }
            others.push((reaped, status));
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    None
}
