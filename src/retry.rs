use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::model::QueryRecord;
use crate::state::RunState;
use crate::util::now_secs;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// 周期性遍历状态表，把超时的记录重新投递到发送队列
pub struct RetryScanner {
    state: Arc<RunState>,
    timeout: u64,
    interval: Duration,
}

impl RetryScanner {
    pub fn new(state: Arc<RunState>, timeout: u64, interval: Duration) -> Self {
        RetryScanner {
            state,
            timeout,
            interval,
        }
    }

    /// 收集 `now - time > timeout` 的记录，超时窗口内的记录不动
    pub fn sweep(&self, now: u64) -> Vec<QueryRecord> {
        let mut expired = Vec::new();
        let res = self.state.ledger.for_each(|record| {
            if now.saturating_sub(record.time) > self.timeout {
                expired.push(record);
            }
        });
        if let Err(e) = res {
            log::warn!("遍历状态表出错: {}", e);
        }
        expired
    }

    /// 重试循环，直到停止标志被清除或发送队列关闭
    pub async fn retry_cycle(self, work: mpsc::Sender<QueryRecord>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        while self.state.is_running() {
            ticker.tick().await;
            let expired = self.sweep(now_secs());
            if !expired.is_empty() {
                log::debug!("{} 个查询超时，重新投递", expired.len());
            }
            for record in expired {
                if work.send(record).await.is_err() {
                    return;
                }
            }
        }
    }
}
