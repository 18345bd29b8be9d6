use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

use crate::codec::decode_frame;
use crate::model::ResolveResult;
use crate::state::RunState;

/// 单个帧的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// 不是发往本地端口的DNS响应
    Ignored,
    /// 状态表中没有该域名，重复或迟到的响应
    Unmatched,
    /// 匹配成功但没有应答记录（如NXDOMAIN）
    Empty,
    /// 匹配成功，结果已转发
    Resolved,
}

/// 解析响应帧、与状态表关联、转发结果
pub struct DnsHandler {
    state: Arc<RunState>,
    local_port: u16,
    results: UnboundedSender<ResolveResult>,
}

impl DnsHandler {
    pub fn new(state: Arc<RunState>, local_port: u16, results: UnboundedSender<ResolveResult>) -> Self {
        DnsHandler {
            state,
            local_port,
            results,
        }
    }

    pub fn handle_frame(&self, frame: &[u8]) -> HandleOutcome {
        let reply = match decode_frame(frame, self.local_port) {
            Some(reply) if !reply.name.is_empty() => reply,
            _ => return HandleOutcome::Ignored,
        };
        let counters = &self.state.counters;
        counters.add_recv();

        match self.state.ledger.delete(&reply.name) {
            Ok(Some(_)) => {}
            Ok(None) => return HandleOutcome::Unmatched,
            Err(e) => {
                log::warn!("删除 {} 出错: {}", reply.name, e);
                return HandleOutcome::Unmatched;
            }
        }

        if reply.answers.is_empty() {
            log::debug!("{} 无应答记录 (rcode {})", reply.name, reply.rcode);
            return HandleOutcome::Empty;
        }

        counters.add_success();
        let result = ResolveResult {
            subdomain: reply.name,
            answers: reply.answers,
        };
        if self.results.send(result).is_err() {
            log::debug!("结果通道已关闭");
        }
        HandleOutcome::Resolved
    }
}

/// 解析循环，消费抓包线程送来的帧
pub fn handle_dns_packet(handler: DnsHandler, frames: Receiver<Vec<u8>>) {
    let tick = Duration::from_millis(200);
    while handler.state.is_running() {
        match frames.recv_timeout(tick) {
            Ok(frame) => {
                handler.handle_frame(&frame);
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    log::debug!("解析循环退出");
}
