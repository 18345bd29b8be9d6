use pnet::datalink::MacAddr;
use std::io;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rsubscan::capture::{FrameReceiver, FrameSender};
use rsubscan::model::EthTable;
use rsubscan::{Ledger, Phase, QueryRecord, SetupError, SubdomainBruteConfig, SubdomainBruteEngine};
use tokio_test::{assert_err, assert_ok};

/// 发出的帧全部丢弃
struct BlackHole {
    sent: Arc<AtomicUsize>,
}

impl FrameSender for BlackHole {
    fn send_frame(&mut self, _frame: &[u8]) -> io::Result<()> {
        self.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// 永远读不到帧
struct Silence;

impl FrameReceiver for Silence {
    fn next_frame(&mut self) -> io::Result<Option<Vec<u8>>> {
        std::thread::sleep(Duration::from_millis(20));
        Ok(None)
    }
}

fn link() -> EthTable {
    EthTable {
        src_ip: Ipv4Addr::new(10, 0, 0, 2),
        device: "test0".to_string(),
        src_mac: MacAddr::new(0x02, 0, 0, 0, 0, 0x02),
        dst_mac: MacAddr::new(0x02, 0, 0, 0, 0, 0x01),
    }
}

#[test]
fn test_config_defaults() {
    let config = SubdomainBruteConfig::default();
    assert_eq!(config.timeout, 6);
    assert_eq!(config.max_retry, 3);
    assert_eq!(config.memory_limit, 100_000);
    assert_eq!(config.drain, Duration::from_secs(5));
    assert_eq!(config.sweep_interval, Duration::from_secs(1));
    assert_eq!(config.effective_rate().unwrap(), 26214);
}

#[test]
fn test_config_validation() {
    let no_domains = SubdomainBruteConfig::default();
    assert!(matches!(no_domains.validate(), Err(SetupError::NoTargets(_))));

    let bad_resolver = SubdomainBruteConfig {
        domains: vec!["example.com".to_string()],
        resolvers: vec!["not-an-ip".to_string()],
        ..Default::default()
    };
    assert!(matches!(bad_resolver.validate(), Err(SetupError::InvalidResolver(_))));

    let bad_bandwidth = SubdomainBruteConfig {
        domains: vec!["example.com".to_string()],
        bandwidth_limit: Some("fast".to_string()),
        ..Default::default()
    };
    assert!(matches!(assert_err!(bad_bandwidth.validate()), SetupError::InvalidRate(_)));

    let zero_rate = SubdomainBruteConfig {
        domains: vec!["example.com".to_string()],
        rate: Some(0),
        ..Default::default()
    };
    assert!(matches!(assert_err!(zero_rate.effective_rate()), SetupError::InvalidRate(_)));

    let verify = SubdomainBruteConfig {
        domains: vec!["www.example.com".to_string()],
        verify_mode: true,
        ..Default::default()
    };
    assert_ok!(verify.validate());
}

#[test]
fn test_missing_dictionary_is_fatal() {
    let config = SubdomainBruteConfig {
        domains: vec!["example.com".to_string()],
        dictionary_file: Some("/nonexistent/rsubscan-words.txt".into()),
        ..Default::default()
    };
    let sent = Arc::new(AtomicUsize::new(0));
    let engine = SubdomainBruteEngine::with_link(config, link(), Box::new(BlackHole { sent }), Box::new(Silence), 40001);
    assert!(matches!(engine, Err(SetupError::Input { .. })));
}

#[test]
fn test_ledger_spills_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = assert_ok!(Ledger::new(2, Some(dir.path())));
    for i in 0..10 {
        assert_ok!(ledger.put(QueryRecord::new(format!("h{}.example.com", i), Ipv4Addr::new(8, 8, 8, 8))));
    }
    assert_eq!(ledger.len(), 10);
    assert_eq!(ledger.spilled(), 8);
    assert!(assert_ok!(ledger.contains("h9.example.com")));
    assert!(assert_ok!(ledger.delete("h9.example.com")).is_some());
    assert!(assert_ok!(ledger.get("h9.example.com")).is_none());
    ledger.close();
    assert!(ledger.is_empty());

    // 磁盘层数据库随状态表一起删除
    drop(ledger);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unanswered_queries_all_fail() {
    let sent = Arc::new(AtomicUsize::new(0));
    let config = SubdomainBruteConfig {
        domains: vec!["example.com".to_string()],
        resolvers: vec!["8.8.8.8".to_string()],
        rate: Some(1000),
        timeout: 0,
        max_retry: 0,
        memory_limit: 4,
        sweep_interval: Duration::from_millis(50),
        drain: Duration::from_millis(50),
        silent: true,
        ..Default::default()
    };
    let engine = SubdomainBruteEngine::with_link(
        config,
        link(),
        Box::new(BlackHole { sent: sent.clone() }),
        Box::new(Silence),
        40001,
    )
    .unwrap();
    let state = engine.state();

    let report = engine.run().await.unwrap();
    // 内置字典中的每个目标恰好发送一次并计为失败
    assert!(report.targets > 0);
    assert_eq!(report.counters.failed as usize, report.targets);
    assert_eq!(report.counters.sent as usize, report.targets);
    assert_eq!(sent.load(Ordering::Relaxed), report.targets);
    assert_eq!(report.counters.success, 0);
    assert!(report.results.is_empty());
    assert_eq!(state.phase(), Phase::Finished);
    assert!(state.ledger.is_empty());
}
