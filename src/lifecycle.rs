/// プロセス全体の初期化と終了処理
///
/// 親：チャネル作成 → ハンドラー登録 → スポーンタイマー → ドライバー → 子の回収
/// 子：継承したチャネルを差し替え → ドライバー → 終了コード

use nix::sys::wait::waitpid;
use nix::unistd::{getppid, Pid};
use tracing::{debug, error, info};

use crate::channel::NotificationChannel;
use crate::config::Config;
use crate::driver::{Driver, ExchangeReport};
use crate::errors::{PingPongError, Result};
use crate::handler;

/// 親プロセスの初期化
///
/// チャネルを作ってからハンドラーを登録し、最後にタイマーを仕掛ける。
/// この順番なら最初のSIGALRMが届いた時点で書き込み先が必ず存在する
pub fn init() -> Result<NotificationChannel> {
    let channel = NotificationChannel::create()?;
    handler::install()?;
    handler::arm_spawn_timer()?;
    debug!("initialized, notification channel fd {}", channel.write_fd());
    Ok(channel)
}

/// 親として1回分の検証を実行する
pub fn run(config: &Config) -> Result<ExchangeReport> {
    info!(
        "starting ping-pong: {} exchanges, jitter bound {}",
        config.exchanges, config.jitter_bound
    );

    let mut channel = init()?;
    let report = Driver::parent(&mut channel, config).run()?;
    log_report(&report);

    let child = report
        .peer
        .ok_or_else(|| PingPongError::protocol("parent finished without a child"))?;
    shutdown(child)?;
    Ok(report)
}

/// 子プロセスの終了を待つ。終了ステータスは記録するだけで伝播しない
pub fn shutdown(child: Pid) -> Result<()> {
    let status = waitpid(child, None).map_err(PingPongError::Wait)?;
    debug!("child {} reaped: {:?}", child, status);
    Ok(())
}

/// fork直後の子プロセスのエントリーポイント。戻り値は終了コード
pub fn child_main(inherited: &mut NotificationChannel, config: &Config) -> i32 {
    handler::reset_deliveries();

    match run_child(inherited, config) {
        Ok(report) => {
            log_report(&report);
            0
        }
        Err(e) => {
            error!("child failed: {}", e);
            1
        }
    }
}

fn run_child(inherited: &mut NotificationChannel, config: &Config) -> Result<ExchangeReport> {
    inherited.replace_inherited()?;
    Driver::child(inherited, config, getppid()).run()
}

fn log_report(report: &ExchangeReport) {
    info!(
        "{} completed {} exchanges ({} deliveries, {} signals sent)",
        report.role, report.exchanges, report.deliveries, report.sent
    );
}
