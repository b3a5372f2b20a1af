//! I/O through the pty master

#[cfg(unix)]
mod unix_tests {
    use ptyspawn_pty::{AsyncPtyMaster, ExitStatus, ProcessTable, SpawnOptions, Spawner};
    use ptyspawn_test_utils::{collect_output, reap_until, CHILD_TIMEOUT};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::time::timeout;

    async fn read_until(master: &mut AsyncPtyMaster, needle: &str) -> String {
        let mut seen = Vec::new();
        let mut buf = [0u8; 1024];
        timeout(CHILD_TIMEOUT, async {
            while !String::from_utf8_lossy(&seen).contains(needle) {
                let n = master.read(&mut buf).await.unwrap();
                assert!(n > 0, "pty closed before {needle:?} appeared");
                seen.extend_from_slice(&buf[..n]);
            }
        })
        .await
        .expect("timed out waiting for output");
        String::from_utf8_lossy(&seen).into_owned()
    }

    #[tokio::test]
    async fn test_cat_round_trip_and_eof() {
        let mut table = ProcessTable::new();
        let mut record = Spawner::new()
            .spawn(&mut table, &["cat"], &SpawnOptions::default())
            .unwrap();
        let mut master = AsyncPtyMaster::new(record.take_pty().unwrap()).unwrap();

        master.write_all(b"hello\n").await.unwrap();
        // once from the line discipline's echo, once from cat
        let output = read_until(&mut master, "hello\r\nhello\r\n").await;
        assert!(output.starts_with("hello\r\n"));

        // VEOF on an empty line ends cat's input
        master.write_all(&[0x04]).await.unwrap();
        let mut rest = Vec::new();
        timeout(CHILD_TIMEOUT, master.read_to_end(&mut rest))
            .await
            .expect("pty never hung up")
            .unwrap();

        let (status, _) = reap_until(&mut table, record.pid()).await.unwrap();
        assert_eq!(status, ExitStatus::Exited(0));
    }

    #[tokio::test]
    async fn test_large_output() {
        let mut table = ProcessTable::new();
        let script = "i=0; while [ $i -lt 500 ]; do echo line$i; i=$((i+1)); done";
        let mut record = Spawner::new()
            .spawn(&mut table, &["/bin/sh", "-c", script], &SpawnOptions::default())
            .unwrap();

        let output = String::from_utf8(collect_output(&mut record).await.unwrap()).unwrap();
        let lines: Vec<&str> = output.split("\r\n").filter(|l| !l.is_empty()).collect();
        assert_eq!(lines.len(), 500);
        assert_eq!(lines[0], "line0");
        assert_eq!(lines[499], "line499");
        reap_until(&mut table, record.pid()).await.unwrap();
    }

    #[tokio::test]
    async fn test_split_halves() {
        let mut table = ProcessTable::new();
        let mut record = Spawner::new()
            .spawn(
                &mut table,
                &["/bin/sh", "-c", "read line; echo got:$line"],
                &SpawnOptions::default(),
            )
            .unwrap();
        let master = AsyncPtyMaster::new(record.take_pty().unwrap()).unwrap();
        let (mut reader, mut writer) = tokio::io::split(master);

        writer.write_all(b"abc\n").await.unwrap();
        let mut out = Vec::new();
        timeout(CHILD_TIMEOUT, reader.read_to_end(&mut out))
            .await
            .unwrap()
            .unwrap();
        assert!(String::from_utf8_lossy(&out).contains("got:abc\r\n"));
        reap_until(&mut table, record.pid()).await.unwrap();
    }
}
