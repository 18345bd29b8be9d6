//! 抓包/发包句柄
//!
//! 发送和接收循环只依赖 [`FrameSender`] / [`FrameReceiver`]，
//! 实际运行时由 pnet 的数据链路通道实现。

use pnet::datalink::{self, Channel::Ethernet, DataLinkReceiver, DataLinkSender};
use std::io;
use std::time::Duration;

use crate::error::SetupError;

/// 抓包读超时，接收循环借此检查停止标志
pub const READ_TIMEOUT: Duration = Duration::from_millis(200);

pub trait FrameSender: Send {
    fn send_frame(&mut self, frame: &[u8]) -> io::Result<()>;
}

pub trait FrameReceiver: Send {
    /// 读取下一帧，读超时返回 `Ok(None)`
    fn next_frame(&mut self) -> io::Result<Option<Vec<u8>>>;
}

pub struct PnetSender {
    tx: Box<dyn DataLinkSender>,
}

pub struct PnetReceiver {
    rx: Box<dyn DataLinkReceiver>,
}

impl FrameSender for PnetSender {
    fn send_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        match self.tx.send_to(frame, None) {
            Some(res) => res,
            None => Err(io::Error::new(
                io::ErrorKind::Other,
                "No destination interface specified",
            )),
        }
    }
}

impl FrameReceiver for PnetReceiver {
    fn next_frame(&mut self) -> io::Result<Option<Vec<u8>>> {
        match self.rx.next() {
            Ok(packet) => Ok(Some(packet.to_vec())),
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// 在指定网卡上打开数据链路通道
pub fn open_capture(device: &str) -> Result<(PnetSender, PnetReceiver), SetupError> {
    let interfaces = datalink::interfaces();
    let interface = interfaces
        .iter()
        .find(|iface| iface.name == device && !iface.is_loopback())
        .ok_or_else(|| SetupError::NoDevice(device.to_string()))?;

    let config = datalink::Config {
        read_timeout: Some(READ_TIMEOUT),
        ..Default::default()
    };
    match datalink::channel(interface, config) {
        Ok(Ethernet(tx, rx)) => Ok((PnetSender { tx }, PnetReceiver { rx })),
        Ok(_) => Err(SetupError::Capture {
            device: device.to_string(),
            reason: "Unhandled channel type".to_string(),
        }),
        Err(e) => Err(SetupError::Capture {
            device: device.to_string(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! 内存中的模拟链路：把发出的查询交给应答函数，按需回送响应帧

    use super::*;
    use crate::codec::testutil::{build_response_frame, query_name};
    use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
    use std::net::Ipv4Addr;
    use std::sync::{Arc, Mutex};

    /// 根据查询域名返回 (应答地址, rcode)，None 表示不应答
    pub(crate) type Responder = Arc<dyn Fn(&str) -> Option<(Vec<Ipv4Addr>, u8)> + Send + Sync>;

    pub(crate) struct MockSender {
        responder: Responder,
        copies: usize,
        replies: Sender<Vec<u8>>,
        pub(crate) sent: Arc<Mutex<Vec<String>>>,
    }

    pub(crate) struct MockReceiver {
        replies: Receiver<Vec<u8>>,
    }

    /// `copies` 为每个应答重复回送的次数，用于模拟重复响应
    pub(crate) fn mock_link(responder: Responder, copies: usize) -> (MockSender, MockReceiver, Arc<Mutex<Vec<String>>>) {
        let (tx, rx) = unbounded();
        let sent = Arc::new(Mutex::new(Vec::new()));
        (
            MockSender {
                responder,
                copies,
                replies: tx,
                sent: sent.clone(),
            },
            MockReceiver { replies: rx },
            sent,
        )
    }

    impl FrameSender for MockSender {
        fn send_frame(&mut self, frame: &[u8]) -> io::Result<()> {
            let name = query_name(frame);
            self.sent.lock().unwrap().push(name.clone());
            if let Some((answers, rcode)) = (self.responder)(&name) {
                let reply = build_response_frame(frame, &answers, rcode);
                for _ in 0..self.copies {
                    let _ = self.replies.send(reply.clone());
                }
            }
            Ok(())
        }
    }

    impl FrameReceiver for MockReceiver {
        fn next_frame(&mut self) -> io::Result<Option<Vec<u8>>> {
            match self.replies.recv_timeout(Duration::from_millis(20)) {
                Ok(frame) => Ok(Some(frame)),
                Err(RecvTimeoutError::Timeout) => Ok(None),
                Err(RecvTimeoutError::Disconnected) => {
                    Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock link closed"))
                }
            }
        }
    }

    /// 写入总是失败的发送端
    pub(crate) struct BrokenSender;

    impl FrameSender for BrokenSender {
        fn send_frame(&mut self, _frame: &[u8]) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "link down"))
        }
    }
}
