/// ピアプロセスの生成
///
/// fork中にシグナルが届いたり失われたりしないよう、
/// 呼び出しスレッドの全シグナルをブロックしてからforkする

use nix::sys::signal::{pthread_sigmask, SigSet, SigmaskHow};
use nix::unistd::{fork, ForkResult, Pid};

use crate::errors::{PingPongError, Result};

/// 全シグナルをブロックした状態で `f` を実行し、元のマスクに戻す
pub fn with_signals_blocked<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> T,
{
    let mut saved = SigSet::empty();
    pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&SigSet::all()), Some(&mut saved))
        .map_err(PingPongError::Signal)?;

    let result = f();

    pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(&saved), None)
        .map_err(PingPongError::Signal)?;
    Ok(result)
}

/// ピアプロセスを生成し、親にはその PID を返す
///
/// 子プロセスはマスクを戻したあと `child_body` を実行し、
/// その戻り値を終了コードとしてそのまま終了する（呼び出し元には戻らない）
pub fn spawn_peer<F>(child_body: F) -> Result<Pid>
where
    F: FnOnce() -> i32,
{
    // SAFETY: このプロセスはシングルスレッドで、子は直後に自分の処理へ入る
    let forked = with_signals_blocked(|| unsafe { fork() })?;

    match forked.map_err(PingPongError::Spawn)? {
        ForkResult::Parent { child } => Ok(child),
        ForkResult::Child => {
            let code = child_body();
            std::process::exit(code)
        }
    }
}
