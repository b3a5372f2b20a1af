//! Process table reaping and lifecycle tests

#[cfg(unix)]
mod unix_tests {
    use nix::sys::wait::waitpid;
    use ptyspawn_pty::{ExitStatus, Pid, ProcessTable, Signal, SpawnOptions, Spawner, WaitError};
    use ptyspawn_test_utils::{collect_output, reap_until};

    #[tokio::test]
    async fn test_reap_is_idempotent() {
        let mut table = ProcessTable::new();
        let mut record = Spawner::new()
            .spawn(&mut table, &["/bin/true"], &SpawnOptions::default())
            .unwrap();
        collect_output(&mut record).await.unwrap();

        let (status, _) = reap_until(&mut table, record.pid()).await.unwrap();
        assert_eq!(status, ExitStatus::Exited(0));

        assert!(table.reap_nonblocking().is_empty());
        assert!(table.reap_nonblocking().is_empty());
        assert!(table.is_empty());
    }

    #[test]
    fn test_running_child_stays_tracked() {
        let mut table = ProcessTable::new();
        let record = Spawner::new()
            .spawn(&mut table, &["sleep", "30"], &SpawnOptions::default())
            .unwrap();

        assert!(table.reap_nonblocking().is_empty());
        assert!(table.is_tracked(record.pid()));

        record.signal(Signal::SIGKILL).unwrap();
        let status = table.wait(record.pid()).unwrap();
        assert_eq!(
            status,
            ExitStatus::Signaled {
                signal: Signal::SIGKILL,
                core_dumped: false
            }
        );
        assert!(!table.is_tracked(record.pid()));
    }

    #[test]
    fn test_stopped_child_reported_and_kept() {
        let mut table = ProcessTable::new();
        let record = Spawner::new()
            .spawn(&mut table, &["sleep", "30"], &SpawnOptions::default())
            .unwrap();

        record.signal(Signal::SIGSTOP).unwrap();
        assert_eq!(
            table.wait(record.pid()).unwrap(),
            ExitStatus::Stopped(Signal::SIGSTOP)
        );
        assert!(table.is_tracked(record.pid()));

        record.signal(Signal::SIGKILL).unwrap();
        assert!(table.wait(record.pid()).unwrap().is_terminated());
        assert!(matches!(
            table.wait(record.pid()),
            Err(WaitError::NotTracked(_))
        ));
    }

    #[tokio::test]
    async fn test_detached_child_not_reaped() {
        let mut table = ProcessTable::new();
        let mut record = Spawner::new()
            .spawn(&mut table, &["/bin/true"], &SpawnOptions::default())
            .unwrap();
        let pid = record.pid();

        assert!(table.detach(pid));
        collect_output(&mut record).await.unwrap();
        assert!(table.reap_nonblocking().is_empty());

        // the caller owns the lifecycle now
        waitpid(pid, None).unwrap();
    }

    #[tokio::test]
    async fn test_track_external_child() {
        let child = std::process::Command::new("true").spawn().unwrap();
        let pid = Pid::from_raw(child.id() as i32);

        let mut table = ProcessTable::new();
        assert!(table.track(pid));
        let (status, _) = reap_until(&mut table, pid).await.unwrap();
        assert_eq!(status, ExitStatus::Exited(0));
    }

    #[tokio::test]
    async fn test_reap_many() {
        let spawner = Spawner::new();
        let mut table = ProcessTable::new();
        let mut pids = Vec::new();
        for code in 0..4 {
            let script = format!("exit {code}");
            let mut record = spawner
                .spawn(&mut table, &["/bin/sh", "-c", script.as_str()], &SpawnOptions::default())
                .unwrap();
            collect_output(&mut record).await.unwrap();
            pids.push(record.pid());
        }
        assert_eq!(table.len(), 4);

        let mut seen = Vec::new();
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
        while seen.len() < 4 && std::time::Instant::now() < deadline {
            seen.extend(table.reap_nonblocking());
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        seen.sort_by_key(|(pid, _)| *pid);
        pids.sort();

        assert_eq!(seen.iter().map(|(pid, _)| *pid).collect::<Vec<_>>(), pids);
        let mut codes: Vec<i32> = seen.iter().filter_map(|(_, s)| s.code()).collect();
        codes.sort();
        assert_eq!(codes, vec![0, 1, 2, 3]);
        assert!(table.is_empty());
    }
}
