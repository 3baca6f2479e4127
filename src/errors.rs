/// エラー処理モジュール
///
/// ピンポン検証で発生するエラーを定義

use nix::unistd::Pid;
use thiserror::Error;

/// ピンポン検証で発生するエラーの定義
#[derive(Error, Debug)]
pub enum PingPongError {
    /// 通知チャネル（セルフパイプ）の作成に失敗
    #[error("failed to create notification channel: {0}")]
    ChannelCreation(#[source] nix::Error),

    /// シグナルハンドラーの登録やタイマー設定に失敗
    #[error("signal setup failed: {0}")]
    Signal(#[source] nix::Error),

    /// ピアプロセスの生成に失敗
    #[error("failed to spawn peer: {0}")]
    Spawn(#[source] nix::Error),

    /// ピアへのシグナル送信に失敗
    #[error("failed to signal peer {pid}: {source}")]
    Kill {
        pid: Pid,
        #[source]
        source: nix::Error,
    },

    /// 子プロセスの回収に失敗
    #[error("failed to wait for child: {0}")]
    Wait(#[source] nix::Error),

    /// プロトコル違反
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// 受信数が配送数を超えた（存在しないイベントを数えた）
    #[error("counted {exchanges} exchanges but only {deliveries} signals were delivered")]
    FabricatedEvents { exchanges: u64, deliveries: u64 },

    /// I/O操作でのエラー
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl PingPongError {
    /// カスタムプロトコルエラーを作成
    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        Self::Protocol(msg.into())
    }
}

/// 結果型のエイリアス
pub type Result<T> = std::result::Result<T, PingPongError>;
