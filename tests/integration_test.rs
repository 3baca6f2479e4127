/// 統合テスト
///
/// ビルド済みバイナリを実際に起動して親子間のピンポンを検証する。
/// ハングはそれ自体が失敗なので、一定時間で打ち切るウォッチドッグを付ける

use nix::sys::resource::{setrlimit, Resource};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::os::unix::process::CommandExt;
use std::process::{Command, Output, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

const BIN: &str = env!("CARGO_BIN_EXE_signal-pingpong");

fn pingpong(args: &[&str]) -> Command {
    let mut cmd = Command::new(BIN);
    cmd.args(args)
        .env("RUST_LOG", "info")
        .env_remove("RUST_BACKTRACE")
        .process_group(0);
    cmd
}

/// 期限内に終わらなければプロセスグループごと止めて失敗させる
fn run_with_watchdog(mut cmd: Command, deadline: Duration) -> Output {
    let mut child = cmd
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to start signal-pingpong");

    let started = Instant::now();
    while child.try_wait().expect("try_wait failed").is_none() {
        if started.elapsed() > deadline {
            let _ = killpg(Pid::from_raw(child.id() as i32), Signal::SIGKILL);
            let output = child.wait_with_output().expect("wait failed");
            panic!(
                "signal-pingpong hung for {:?}\nstdout:\n{}",
                deadline,
                String::from_utf8_lossy(&output.stdout)
            );
        }
        sleep(Duration::from_millis(10));
    }

    child.wait_with_output().expect("Failed to collect output")
}

/// exec後も残る（CLOEXECでない）fdを閉じる。pre_exec内で呼ぶのでシステムコールだけを使う
fn close_inherited_fds() {
    for fd in 3..1024 {
        // SAFETY: fcntl(2) と close(2) はfork後でも安全
        unsafe {
            let flags = libc::fcntl(fd, libc::F_GETFD);
            if flags >= 0 && flags & libc::FD_CLOEXEC == 0 {
                libc::close(fd);
            }
        }
    }
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_deterministic_five_exchanges() {
    let output = run_with_watchdog(
        pingpong(&["--count", "5", "--jitter", "0"]),
        Duration::from_secs(30),
    );
    let stdout = stdout_of(&output);

    assert!(output.status.success(), "stderr: {}", stderr_of(&output));
    assert!(
        stdout.contains("parent completed 5 exchanges (5 deliveries, 5 signals sent)"),
        "stdout: {}",
        stdout
    );
    assert!(
        stdout.contains("child completed 5 exchanges (5 deliveries, 5 signals sent)"),
        "stdout: {}",
        stdout
    );
}

#[test]
fn test_jittered_run_reaches_target() {
    let output = run_with_watchdog(pingpong(&["--count", "2000"]), Duration::from_secs(120));
    let stdout = stdout_of(&output);

    assert!(output.status.success(), "stderr: {}", stderr_of(&output));
    assert!(stdout.contains("parent completed 2000 exchanges"), "stdout: {}", stdout);
    assert!(stdout.contains("child completed 2000 exchanges"), "stdout: {}", stdout);
}

#[test]
fn test_single_exchange_right_after_spawn() {
    // 子は起動直後にpingを送る。生成直後の通知も失われないこと
    let mut cmd = pingpong(&["--count", "1", "--jitter", "0", "--verbose"]);
    cmd.env("RUST_LOG", "debug");
    let output = run_with_watchdog(cmd, Duration::from_secs(30));
    let stdout = stdout_of(&output);

    assert!(output.status.success(), "stderr: {}", stderr_of(&output));
    assert!(stdout.contains("spawned child"), "stdout: {}", stdout);
    assert!(stdout.contains("reaped"), "stdout: {}", stdout);
    assert!(stdout.contains("child completed 1 exchanges"), "stdout: {}", stdout);
}

#[test]
fn test_channel_creation_failure_is_fatal() {
    let mut cmd = pingpong(&["--count", "5", "--jitter", "0"]);
    // 標準入出力のほかに空きfdを1つだけ残す。動的リンカーは1つずつ開いて閉じるので起動できるが、
    // 2つのfdを同時に必要とするパイプ作成は失敗する
    unsafe {
        cmd.pre_exec(|| {
            close_inherited_fds();
            setrlimit(Resource::RLIMIT_NOFILE, 4, 4).map_err(std::io::Error::from)
        });
    }

    let output = run_with_watchdog(cmd, Duration::from_secs(30));
    let stderr = stderr_of(&output);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr.contains("failed to create notification channel"), "stderr: {}", stderr);
    assert!(!stdout_of(&output).contains("completed"));
}

#[test]
fn test_help() {
    let output = run_with_watchdog(pingpong(&["--help"]), Duration::from_secs(30));
    assert!(output.status.success());
    assert!(stdout_of(&output).contains("--count"));
}

#[test]
fn test_invalid_argument() {
    let output = run_with_watchdog(pingpong(&["--count", "many"]), Duration::from_secs(30));
    // 使い方の誤りはclapが終了コード2で報告する
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr_of(&output).contains("invalid value"));
}
