/// 実行設定
///
/// 交換回数はコンパイル時定数が既定値。短時間の実行用にコマンドライン引数で上書きできる

use clap::Parser;

/// 親子それぞれが受信すべきピンポン回数
pub const NUM_PING_PONGS: u64 = 1_000_000;

/// ジッターのビジーループ回数の上限（この値未満で乱数を引く）
pub const JITTER_BOUND: u32 = 1000;

/// 進捗ログを出す間隔（交換回数）
pub const PROGRESS_INTERVAL: u64 = 100_000;

/// 実行設定
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(
    name = "signal-pingpong",
    about = "Self-pipe signal delivery stress test between a parent and a forked child",
    version
)]
pub struct Config {
    /// 各プロセスが数える交換回数
    #[arg(
        long = "count",
        value_name = "N",
        default_value_t = NUM_PING_PONGS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub exchanges: u64,

    /// ジッターの上限。0ならジッターなし（決定的な実行）
    #[arg(long = "jitter", value_name = "N", default_value_t = JITTER_BOUND)]
    pub jitter_bound: u32,

    /// 進捗ログの間隔
    #[arg(skip = PROGRESS_INTERVAL)]
    pub progress_interval: u64,

    /// 詳細ログ
    #[arg(short, long)]
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            exchanges: NUM_PING_PONGS,
            jitter_bound: JITTER_BOUND,
            progress_interval: PROGRESS_INTERVAL,
            verbose: false,
        }
    }
}
