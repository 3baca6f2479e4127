/// 通知チャネル（セルフパイプ）
///
/// シグナルハンドラーが非ブロッキングパイプに1バイト書き込み、
/// 制御ループがpoll(2)でそれを待つことで、非同期シグナルを
/// レベルトリガーの読み取り可能イベントに変換する

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::os::fd::{AsFd, AsRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicI32, Ordering};

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::unistd::pipe2;

use crate::errors::{PingPongError, Result};

/// ハンドラーが書き込む先のfd。ハンドラーから参照できるのはこのアトミックだけ
static WRITE_FD: AtomicI32 = AtomicI32::new(-1);

/// パイプに流れる1バイトのトークン
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    /// ピアからの通知（SIGUSR1）
    Peer,
    /// 子プロセス生成のトリガー（SIGALRM）
    Spawn,
}

impl Token {
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Peer => b'.',
            Self::Spawn => b'S',
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'.' => Some(Self::Peer),
            b'S' => Some(Self::Spawn),
            _ => None,
        }
    }
}

/// プロセスごとの通知チャネル
///
/// 生成時に書き込み側fdを公開し、ドロップ時にまだ自分が公開中なら取り消す
#[derive(Debug)]
pub struct NotificationChannel {
    reader: File,
    writer: OwnedFd,
}

impl NotificationChannel {
    /// O_NONBLOCKのパイプを作り、ハンドラー用に書き込み側を公開する
    pub fn create() -> Result<Self> {
        let (reader, writer) =
            pipe2(OFlag::O_NONBLOCK).map_err(PingPongError::ChannelCreation)?;
        WRITE_FD.store(writer.as_raw_fd(), Ordering::SeqCst);

        Ok(Self {
            reader: File::from(reader),
            writer,
        })
    }

    /// fork後の子プロセスで、親から継承したチャネルを新しいものに差し替えて閉じる
    pub fn replace_inherited(&mut self) -> Result<()> {
        let fresh = Self::create()?;
        let inherited = std::mem::replace(self, fresh);
        drop(inherited);
        Ok(())
    }

    /// 1トークンが読めるまでブロックし、それを消費して返す
    ///
    /// EINTRや、poll後に読めなかった場合（EAGAIN）は待機に戻る。
    /// 実際に読めたバイト以外を数えることはない
    pub fn wait_and_drain(&self) -> Result<Token> {
        loop {
            let mut fds = [PollFd::new(self.reader.as_fd(), PollFlags::POLLIN)];
            match poll(&mut fds, PollTimeout::NONE) {
                Ok(0) | Err(Errno::EINTR) => continue,
                Ok(_) => {}
                Err(e) => return Err(PingPongError::Io(e.into())),
            }

            if let Some(token) = self.try_drain()? {
                return Ok(token);
            }
        }
    }

    /// ブロックせずに1バイト読む。何もなければ `None`
    pub fn try_drain(&self) -> Result<Option<Token>> {
        let mut byte = [0u8; 1];
        match (&self.reader).read(&mut byte) {
            Ok(1) => Token::from_byte(byte[0]).map(Some).ok_or_else(|| {
                PingPongError::protocol(format!("unknown token byte {:#04x}", byte[0]))
            }),
            Ok(_) => Err(PingPongError::protocol("notification channel closed")),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn write_fd(&self) -> RawFd {
        self.writer.as_raw_fd()
    }
}

impl Drop for NotificationChannel {
    fn drop(&mut self) {
        let _ = WRITE_FD.compare_exchange(
            self.writer.as_raw_fd(),
            -1,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }
}

/// 現在ハンドラーが使う書き込み側fd（未作成なら -1）
pub fn published_write_fd() -> RawFd {
    WRITE_FD.load(Ordering::SeqCst)
}

/// ハンドラーから呼ばれる：公開中のパイプにトークンを1バイト書き込む
///
/// async-signal-safeな操作（アトミックの読み込みとwrite(2)）だけを使う。
/// 1バイト書けなければパイプが溢れたか壊れているので、プロセスを異常終了させる
pub fn signal_ready(token: Token) {
    let fd = WRITE_FD.load(Ordering::SeqCst);
    let byte = [token.as_byte()];
    // SAFETY: write(2) はasync-signal-safe。バッファは1バイトのローカル配列
    let written = unsafe { libc::write(fd, byte.as_ptr().cast(), 1) };
    if written != 1 {
        fatal(b"signal-pingpong: notification write did not complete\n");
    }
}

/// ハンドラー文脈で使える異常終了
fn fatal(msg: &[u8]) -> ! {
    // SAFETY: write(2) と abort(3) はどちらもasync-signal-safe
    unsafe {
        libc::write(libc::STDERR_FILENO, msg.as_ptr().cast(), msg.len());
        libc::abort()
    }
}

/// チャネルはプロセス全体で1つなので、触るテストは直列化する
#[cfg(test)]
pub(crate) fn test_guard() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(|e| e.into_inner())
}
