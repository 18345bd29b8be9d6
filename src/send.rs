use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::capture::FrameSender;
use crate::codec::build_query_frame;
use crate::error::SendError;
use crate::limiter::RateLimiter;
use crate::model::{EthTable, QueryRecord};
use crate::state::RunState;
use crate::util::{chose_dns, now_secs};

/// 一次投递的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// 已写入状态表并发出
    Sent,
    /// 超过最大重试次数，已从状态表删除并计为失败
    Failed,
    /// 状态表中已没有该域名（已收到响应）或记录已被更新，丢弃
    Stale,
    /// 构造或写出报文失败，记录留在状态表中等待下次重试
    SendError,
}

pub struct SendDog {
    ether: EthTable,
    dns: Vec<Ipv4Addr>,
    handle: Mutex<Box<dyn FrameSender>>,
    src_port: u16,
    max_retry: u32,
    limiter: RateLimiter,
    state: Arc<RunState>,
}

impl SendDog {
    pub fn new(
        ether: EthTable,
        dns: Vec<Ipv4Addr>,
        handle: Box<dyn FrameSender>,
        src_port: u16,
        max_retry: u32,
        limiter: RateLimiter,
        state: Arc<RunState>,
    ) -> SendDog {
        log::debug!("发送端口: {}，限速: {} 包/秒，最大重试: {}", src_port, limiter.rate(), max_retry);
        SendDog {
            ether,
            dns,
            handle: Mutex::new(handle),
            src_port,
            max_retry,
            limiter,
            state,
        }
    }

    pub fn chose_dns(&self) -> Ipv4Addr {
        chose_dns(&self.dns)
    }

    /// 构造并写出一个查询帧
    pub fn send(&self, domain: &str, dns: Ipv4Addr) -> Result<(), SendError> {
        let frame = build_query_frame(&self.ether, self.src_port, dns, domain)?;
        let mut handle = match self.handle.lock() {
            Ok(handle) => handle,
            Err(poisoned) => poisoned.into_inner(),
        };
        handle.send_frame(&frame)?;
        self.state.counters.add_sent();
        Ok(())
    }

    /// 处理发送队列中的一条记录：重试计数、写状态表、限速、发包
    pub async fn process(&self, mut record: QueryRecord) -> SendOutcome {
        let ledger = &self.state.ledger;
        let counters = &self.state.counters;

        if record.retry > self.max_retry {
            return match ledger.delete(&record.domain) {
                Ok(Some(_)) => {
                    log::debug!("查询失败: {} (重试 {} 次)", record.domain, record.retry);
                    counters.add_failed();
                    SendOutcome::Failed
                }
                Ok(None) => SendOutcome::Stale,
                Err(e) => {
                    log::warn!("删除失败项 {} 出错: {}", record.domain, e);
                    SendOutcome::SendError
                }
            };
        }

        let fresh = record.is_fresh();
        let expected_retry = record.retry;
        record.retry += 1;
        record.time = now_secs();
        if !fresh {
            record.dns = self.chose_dns();
        }

        let stored = if fresh {
            let res = ledger.put(record.clone()).map(|_| true);
            self.state.settle_fresh();
            res
        } else {
            ledger.update_if_current(record.clone(), expected_retry)
        };
        match stored {
            Ok(true) => {}
            Ok(false) => return SendOutcome::Stale,
            Err(e) if fresh => {
                log::error!("写入状态表失败 {}: {}", record.domain, e);
                counters.add_failed();
                return SendOutcome::Failed;
            }
            Err(e) => {
                log::warn!("更新状态表失败 {}: {}", record.domain, e);
                return SendOutcome::SendError;
            }
        }

        self.limiter.acquire().await;
        match self.send(&record.domain, record.dns) {
            Ok(()) => SendOutcome::Sent,
            Err(e) => {
                log::warn!("发送 {} 失败: {}", record.domain, e);
                SendOutcome::SendError
            }
        }
    }
}

/// 发送循环，在整个扫描期间运行
pub async fn send_cycle(dog: Arc<SendDog>, mut work: mpsc::Receiver<QueryRecord>) {
    while let Some(record) = work.recv().await {
        dog.process(record).await;
    }
    log::debug!("发送队列已关闭");
}
