/// ピンポンドライバー
///
/// 親と子で同じ形の状態機械（待機 → 処理 → ピアへシグナル送信）を回す。
/// 子が最初のpingを送り、親はpongで応答する

use std::fmt;

use nix::sys::signal::kill;
use nix::unistd::Pid;
use tracing::{debug, info, trace};

use crate::channel::{NotificationChannel, Token};
use crate::config::Config;
use crate::errors::{PingPongError, Result};
use crate::handler::{self, PEER_SIGNAL};
use crate::{jitter, lifecycle, spawner};

/// プロセスの役割
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// 応答側。スポーントリガーで子を生成し、pingにpongを返す
    Parent,
    /// 開始側。pingを送ってからpongを待つ
    Child,
}

impl Role {
    fn initiates(self) -> bool {
        matches!(self, Self::Child)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parent => write!(f, "parent"),
            Self::Child => write!(f, "child"),
        }
    }
}

/// ドライバー終了時の集計
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeReport {
    pub role: Role,
    /// ピアから受け取って数えたイベント数
    pub exchanges: u64,
    /// ハンドラーが受け取ったピア通知の数
    pub deliveries: u64,
    /// ピアへ送ったシグナルの数
    pub sent: u64,
    pub peer: Option<Pid>,
}

pub struct Driver<'a> {
    role: Role,
    channel: &'a mut NotificationChannel,
    config: &'a Config,
    peer: Option<Pid>,
    exchanges: u64,
    sent: u64,
}

impl<'a> Driver<'a> {
    /// 親のドライバー。ピアはスポーントリガーを受けた時点で生成する
    pub fn parent(channel: &'a mut NotificationChannel, config: &'a Config) -> Self {
        Self::new(Role::Parent, channel, config, None)
    }

    /// 子のドライバー。ピアは親
    pub fn child(channel: &'a mut NotificationChannel, config: &'a Config, parent: Pid) -> Self {
        Self::new(Role::Child, channel, config, Some(parent))
    }

    fn new(
        role: Role,
        channel: &'a mut NotificationChannel,
        config: &'a Config,
        peer: Option<Pid>,
    ) -> Self {
        Self {
            role,
            channel,
            config,
            peer,
            exchanges: 0,
            sent: 0,
        }
    }

    /// 目標回数に達するまでピンポンを繰り返す
    pub fn run(mut self) -> Result<ExchangeReport> {
        info!(
            "{} driver started, waiting for {} exchanges",
            self.role, self.config.exchanges
        );

        while self.exchanges < self.config.exchanges {
            if self.role.initiates() {
                jitter::inject(self.config.jitter_bound);
                self.send()?;
            }

            jitter::inject(self.config.jitter_bound);
            match self.channel.wait_and_drain()? {
                Token::Peer => self.record_exchange()?,
                Token::Spawn => {
                    self.spawn()?;
                    continue;
                }
            }

            if !self.role.initiates() {
                jitter::inject(self.config.jitter_bound);
                self.send()?;
            }
        }

        self.finish()
    }

    fn record_exchange(&mut self) -> Result<()> {
        if self.peer.is_none() {
            return Err(PingPongError::protocol(format!(
                "{} received a peer notification before the peer exists",
                self.role
            )));
        }

        self.exchanges += 1;
        trace!(role = %self.role, exchanges = self.exchanges, "exchange");

        let interval = self.config.progress_interval;
        if interval > 0 && self.exchanges % interval == 0 {
            debug!("{} progress: {}/{}", self.role, self.exchanges, self.config.exchanges);
        }
        Ok(())
    }

    fn spawn(&mut self) -> Result<()> {
        if self.role != Role::Parent || self.peer.is_some() {
            return Err(PingPongError::protocol(format!(
                "unexpected spawn trigger in {}",
                self.role
            )));
        }

        let channel = &mut *self.channel;
        let config = self.config;
        let child = spawner::spawn_peer(|| lifecycle::child_main(channel, config))?;

        debug!("spawned child {}", child);
        self.peer = Some(child);
        Ok(())
    }

    fn send(&mut self) -> Result<()> {
        let pid = self
            .peer
            .ok_or_else(|| PingPongError::protocol(format!("{} has no peer to signal", self.role)))?;

        kill(pid, PEER_SIGNAL).map_err(|source| PingPongError::Kill { pid, source })?;
        self.sent += 1;
        Ok(())
    }

    fn finish(self) -> Result<ExchangeReport> {
        let deliveries = handler::deliveries();
        if self.exchanges > deliveries {
            return Err(PingPongError::FabricatedEvents {
                exchanges: self.exchanges,
                deliveries,
            });
        }

        Ok(ExchangeReport {
            role: self.role,
            exchanges: self.exchanges,
            deliveries,
            sent: self.sent,
            peer: self.peer,
        })
    }
}
