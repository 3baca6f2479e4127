/// signal-pingpong ライブラリのルートモジュール
///
/// 親子2プロセス間でシグナルのピンポンを大量に繰り返し、
/// セルフパイプによるシグナル通知の競合を検出するための検証ハーネス

pub mod channel;
pub mod config;
pub mod driver;
pub mod errors;
pub mod handler;
pub mod jitter;
pub mod lifecycle;
pub mod spawner;

pub use config::{Config, NUM_PING_PONGS};
pub use errors::{PingPongError, Result};
