/// シグナルハンドラー
///
/// SIGUSR1（ピア通知）とSIGALRM（子プロセス生成トリガー）を受け取り、
/// 通知チャネルにトークンを1つ書き込むだけの最小限のハンドラー

use std::sync::atomic::{AtomicU64, Ordering};

use nix::errno::Errno;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

use crate::channel::{signal_ready, Token};
use crate::errors::{PingPongError, Result};

/// ピア通知のシグナル
pub const PEER_SIGNAL: Signal = Signal::SIGUSR1;

/// 子プロセス生成トリガーのシグナル
pub const SPAWN_SIGNAL: Signal = Signal::SIGALRM;

/// ハンドラーがピア通知を受け取った回数
static DELIVERIES: AtomicU64 = AtomicU64::new(0);

/// errnoを保存し、ドロップ時に復元する
///
/// ハンドラーが割り込んだ直後のコードはerrnoを見ているかもしれないので、
/// ハンドラー内のシステムコールで上書きされた値を元に戻す
pub struct ErrnoGuard {
    saved: i32,
}

impl ErrnoGuard {
    pub fn save() -> Self {
        Self {
            saved: Errno::last_raw(),
        }
    }
}

impl Drop for ErrnoGuard {
    fn drop(&mut self) {
        Errno::set_raw(self.saved);
    }
}

extern "C" fn on_signal(signo: libc::c_int) {
    let _errno = ErrnoGuard::save();

    let token = match signo {
        libc::SIGUSR1 => {
            DELIVERIES.fetch_add(1, Ordering::SeqCst);
            Token::Peer
        }
        libc::SIGALRM => Token::Spawn,
        _ => return,
    };
    signal_ready(token);
}

/// SIGALRMとSIGUSR1のハンドラーを登録する
pub fn install() -> Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(on_signal),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );

    for sig in [SPAWN_SIGNAL, PEER_SIGNAL] {
        // SAFETY: ハンドラーはアトミック操作とwrite(2)しか行わない
        unsafe { sigaction(sig, &action) }.map_err(PingPongError::Signal)?;
    }
    Ok(())
}

/// 1マイクロ秒後に一度だけSIGALRMが届くようにタイマーを設定する
pub fn arm_spawn_timer() -> Result<()> {
    let timer = libc::itimerval {
        it_interval: libc::timeval {
            tv_sec: 0,
            tv_usec: 0,
        },
        it_value: libc::timeval {
            tv_sec: 0,
            tv_usec: 1,
        },
    };

    // SAFETY: timerは有効なitimervalで、古い値は不要
    let rc = unsafe { libc::setitimer(libc::ITIMER_REAL, &timer, std::ptr::null_mut()) };
    Errno::result(rc).map(drop).map_err(PingPongError::Signal)
}

/// このプロセスでハンドラーが受け取ったピア通知の数
pub fn deliveries() -> u64 {
    DELIVERIES.load(Ordering::SeqCst)
}

/// fork直後の子プロセスで親のカウントを引き継がないようにする
pub fn reset_deliveries() {
    DELIVERIES.store(0, Ordering::SeqCst);
}
