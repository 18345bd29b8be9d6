use crossbeam_channel::Sender;
use std::sync::Arc;

use crate::capture::FrameReceiver;
use crate::state::RunState;

/// 抓包循环，运行在独立线程上
///
/// 读到的原始帧交给解析线程；读超时时检查停止标志。
/// 链路出错或解析端关闭后退出。
pub fn recv(mut rx: Box<dyn FrameReceiver>, frames: Sender<Vec<u8>>, state: Arc<RunState>) {
    while state.is_running() {
        match rx.next_frame() {
            Ok(Some(frame)) => {
                if frames.send(frame).is_err() {
                    break;
                }
            }
            Ok(None) => continue,
            Err(e) => {
                if state.is_running() {
                    log::error!("读取数据链路出错: {}", e);
                }
                break;
            }
        }
    }
    log::debug!("抓包循环退出");
}
