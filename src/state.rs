//! 扫描运行时共享状态
//!
//! 每个 [`crate::api::SubdomainBruteEngine`] 实例持有独立的一份，
//! 发送、接收、重试等循环通过 `Arc` 共享。

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use crate::ledger::Ledger;
use crate::structs::Counters;

/// 扫描生命周期
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    /// 所有循环运行中，等待状态表清空
    Running = 0,
    /// 状态表已空，等待迟到的响应
    Draining = 1,
    /// 已关闭抓包句柄和状态表
    Finished = 2,
}

impl Phase {
    fn from_u8(v: u8) -> Phase {
        match v {
            0 => Phase::Running,
            1 => Phase::Draining,
            _ => Phase::Finished,
        }
    }
}

/// 发送、接收、重试循环共享的状态
pub struct RunState {
    pub ledger: Ledger,
    pub counters: Counters,
    running: AtomicBool,
    feed_done: AtomicBool,
    // 已投递到发送队列但尚未写入状态表的新目标数
    queued_fresh: AtomicU64,
    phase: AtomicU8,
}

impl RunState {
    pub fn new(ledger: Ledger) -> Arc<Self> {
        Arc::new(RunState {
            ledger,
            counters: Counters::new(),
            running: AtomicBool::new(true),
            feed_done: AtomicBool::new(false),
            queued_fresh: AtomicU64::new(0),
            phase: AtomicU8::new(Phase::Running as u8),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    pub fn mark_feed_done(&self) {
        self.feed_done.store(true, Ordering::Release);
    }

    pub fn feed_done(&self) -> bool {
        self.feed_done.load(Ordering::Acquire)
    }

    pub fn track_fresh(&self) {
        self.queued_fresh.fetch_add(1, Ordering::AcqRel);
    }

    pub fn settle_fresh(&self) {
        self.queued_fresh.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn queued_fresh(&self) -> u64 {
        self.queued_fresh.load(Ordering::Acquire)
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// 只允许 Running -> Draining -> Finished 顺序推进
    pub fn advance(&self, next: Phase) -> bool {
        let current = self.phase();
        let allowed = matches!(
            (current, next),
            (Phase::Running, Phase::Draining) | (Phase::Draining, Phase::Finished)
        );
        if allowed {
            self.phase.store(next as u8, Ordering::Release);
            log::debug!("扫描状态 {:?} -> {:?}", current, next);
        }
        allowed
    }

    /// 进入 Draining 的条件：目标已全部投递、发送端已全部入表，且状态表为空
    pub fn should_drain(&self) -> bool {
        self.feed_done() && self.queued_fresh() == 0 && self.ledger.is_empty()
    }
}
