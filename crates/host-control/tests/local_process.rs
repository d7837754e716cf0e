//! Tests for launching, signalling and reaping local processes

use host_control::{AppSpec, LocalProcessControl, ProcessControl};
use std::time::Duration;

fn sleeper() -> AppSpec {
    let mut app = AppSpec::new("com.example.sleeper", "sleep");
    app.launch.args.push("30".to_string());
    app
}

fn is_alive(pid: u32) -> bool {
    use nix::sys::signal;
    use nix::unistd::Pid;

    signal::kill(Pid::from_raw(pid as i32), None).is_ok()
}

#[cfg(unix)]
#[smol_potat::test]
async fn test_launch_then_forced_kill_notifies_exit() {
    let control = LocalProcessControl::new();
    let app = sleeper();

    let pid = control.launch(&app).await.unwrap();
    assert!(is_alive(pid));
    assert!(control.can_signal(pid).await.unwrap());

    let notifier = control
        .exit_notifier(pid)
        .expect("launched processes are watched");
    assert!(!notifier.has_exited());

    control.terminate(pid, true).await.unwrap();

    let exited = smol::future::or(
        async {
            notifier.exited().await;
            true
        },
        async {
            smol::Timer::after(Duration::from_secs(5)).await;
            false
        },
    )
    .await;

    assert!(exited, "exit notification should fire after SIGKILL");
    assert!(!is_alive(pid), "reaped process must be gone");
    assert!(control.exit_notifier(pid).is_none());
}

#[cfg(unix)]
#[smol_potat::test]
async fn test_lookup_finds_launched_process() {
    let control = LocalProcessControl::new();
    let app = sleeper();

    let pid = control.launch(&app).await.unwrap();

    let process = control.lookup(&app).await.unwrap();
    assert!(process.running);
    assert_eq!(process.bundle_id, "com.example.sleeper");
    assert!(process.pid.is_some());

    control.terminate(pid, false).await.unwrap();
    if let Some(notifier) = control.exit_notifier(pid) {
        notifier.exited().await;
    }
    assert!(!is_alive(pid));
}

#[cfg(unix)]
#[smol_potat::test]
async fn test_launch_missing_program_fails() {
    let control = LocalProcessControl::new();
    let app = AppSpec::new("com.example.missing", "/nonexistent/clutch-test-binary");

    let err = control.launch(&app).await.unwrap_err();
    assert!(err.to_string().contains("failed to spawn process"));
}
