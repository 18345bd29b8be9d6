use std::sync::atomic::{AtomicU64, Ordering};

/// 全局计数器，发送、接收、重试多个循环并发更新，状态栏并发读取
#[derive(Debug, Default)]
pub struct Counters {
    sent: AtomicU64,
    success: AtomicU64,
    recv: AtomicU64,
    failed: AtomicU64,
}

/// 某一时刻的计数快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub sent: u64,
    pub success: u64,
    pub recv: u64,
    pub failed: u64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_success(&self) {
        self.success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_recv(&self) {
        self.recv.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            sent: self.sent.load(Ordering::Relaxed),
            success: self.success.load(Ordering::Relaxed),
            recv: self.recv.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Display for CounterSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Success:{} Sent:{} Recved:{} Faild:{}",
            self.success, self.sent, self.recv, self.failed
        )
    }
}
