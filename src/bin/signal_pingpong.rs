/// シグナルピンポン検証の実行可能ファイル
///
/// 親子で規定回数のピンポンを行い、すべて完了すれば終了コード0で終わる。
/// ハングやクラッシュそのものが検出結果になる

use anyhow::{Context, Result};
use clap::Parser;
use signal_pingpong::config::Config;
use signal_pingpong::lifecycle;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // コマンドライン引数の処理（誤りやヘルプはclapが終了コード付きで処理する）
    let config = Config::parse();

    // ログ初期化
    let default_level = if config.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    lifecycle::run(&config).context("ping-pong run failed")?;
    Ok(())
}
