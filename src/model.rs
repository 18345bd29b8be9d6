use pnet::datalink::MacAddr;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// 链路层上下文，启动时确定，之后只读
#[derive(Debug)]
#[derive(Clone)]
pub struct EthTable {
    pub src_ip: Ipv4Addr,
    pub device: String,
    pub src_mac: MacAddr,
    pub dst_mac: MacAddr,
}

/// 状态表中的一条待响应查询
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub domain: String,      // 查询域名
    pub dns: Ipv4Addr,       // 本次使用的dns
    pub time: u64,           // 最近一次发送时间（秒）
    pub retry: u32,          // 已发送次数
    pub domain_level: u32,   // 域名层级
}

impl QueryRecord {
    /// 尚未发送过的新记录
    pub fn new(domain: impl Into<String>, dns: Ipv4Addr) -> Self {
        QueryRecord {
            domain: domain.into(),
            dns,
            time: 0,
            retry: 0,
            domain_level: 0,
        }
    }

    pub fn is_fresh(&self) -> bool {
        self.retry == 0
    }
}

/// 响应中的一条应答记录
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Answer {
    A(Ipv4Addr),
    AAAA(Ipv6Addr),
    CNAME(String),
    NS(String),
    MX(u16, String),
    TXT(String),
    PTR(String),
    Other(u16),
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Answer::A(ip) => write!(f, "{}", ip),
            Answer::AAAA(ip) => write!(f, "{}", ip),
            Answer::CNAME(name) => write!(f, "CNAME {}", name),
            Answer::NS(name) => write!(f, "NS {}", name),
            Answer::MX(pref, name) => write!(f, "MX {} {}", pref, name),
            Answer::TXT(text) => write!(f, "TXT {}", text),
            Answer::PTR(name) => write!(f, "PTR {}", name),
            Answer::Other(rtype) => write!(f, "TYPE{}", rtype),
        }
    }
}

/// 解析成功的域名
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolveResult {
    pub subdomain: String,
    pub answers: Vec<Answer>,
}

impl ResolveResult {
    pub fn ipv4s(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        self.answers.iter().filter_map(|a| match a {
            Answer::A(ip) => Some(*ip),
            _ => None,
        })
    }
}

impl fmt::Display for ResolveResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.subdomain)?;
        for answer in &self.answers {
            write!(f, " => {}", answer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_joins_answers() {
        let result = ResolveResult {
            subdomain: "www.example.com".to_string(),
            answers: vec![
                Answer::CNAME("edge.example.net".to_string()),
                Answer::A(Ipv4Addr::new(93, 184, 216, 34)),
            ],
        };
        assert_eq!(
            result.to_string(),
            "www.example.com => CNAME edge.example.net => 93.184.216.34"
        );
        assert_eq!(result.ipv4s().collect::<Vec<_>>(), vec![Ipv4Addr::new(93, 184, 216, 34)]);
    }

    #[test]
    fn record_roundtrips_through_json() {
        let mut record = QueryRecord::new("a.example.com", Ipv4Addr::new(8, 8, 8, 8));
        assert!(record.is_fresh());
        record.retry = 2;
        record.time = 1_700_000_000;
        let line = serde_json::to_string(&record).unwrap();
        let back: QueryRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(back, record);
    }
}
