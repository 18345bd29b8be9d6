use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use std::iter::repeat_with;
use std::net::{Ipv4Addr, UdpSocket};

use crate::error::SetupError;

/// 未指定DNS服务器时使用
pub const DEFAULT_RESOLVERS: [&str; 6] = [
    "223.5.5.5",
    "223.6.6.6",
    "180.76.76.76",
    "119.29.29.29",
    "182.254.116.116",
    "114.114.114.115",
];

/// 解析DNS服务器列表，为空时使用默认列表
pub fn parse_resolvers(resolvers: &[String]) -> Result<Vec<Ipv4Addr>, SetupError> {
    if resolvers.is_empty() {
        return DEFAULT_RESOLVERS
            .iter()
            .map(|s| s.parse().map_err(|_| SetupError::InvalidResolver(s.to_string())))
            .collect();
    }
    resolvers
        .iter()
        .map(|s| {
            s.trim()
                .parse::<Ipv4Addr>()
                .map_err(|_| SetupError::InvalidResolver(s.clone()))
        })
        .collect()
}

/// 当前unix时间（秒）
pub fn now_secs() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// 生成一个长度为 n 的随机小写字符串
pub fn random_str(n: usize) -> String {
    let mut rng = thread_rng();
    repeat_with(|| rng.sample(Alphanumeric) as char)
        .take(n)
        .collect::<String>()
        .to_ascii_lowercase()
}

/// 从DNS服务器池中均匀随机选择一个
pub fn chose_dns(resolvers: &[Ipv4Addr]) -> Ipv4Addr {
    resolvers[thread_rng().gen_range(0..resolvers.len())]
}

/// 占用一个空闲UDP端口作为源端口
///
/// socket在扫描期间保持打开，内核不会对发往该端口的响应回复ICMP端口不可达。
pub fn alloc_port() -> Result<(UdpSocket, u16), SetupError> {
    let socket = UdpSocket::bind(("0.0.0.0", 0)).map_err(SetupError::PortAlloc)?;
    let port = socket.local_addr().map_err(SetupError::PortAlloc)?.port();
    Ok((socket, port))
}

/// 终端宽度，未知时返回0
pub fn window_width() -> usize {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}
