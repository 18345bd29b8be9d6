//! # rsubscan
//!
//! 无状态的DNS暴破解析引擎。
//!
//! ## 特性
//!
//! - **原始报文**: 直接构造以太网/IPv4/UDP/DNS帧，不为每个查询创建socket
//! - **限速发送**: 令牌桶控制每秒发包数，可按带宽换算
//! - **混合状态表**: 待响应查询超过内存上限后写入磁盘
//! - **超时重试**: 周期扫描状态表，超时的查询重新发送，超过次数计为失败
//! - **泛解析处理**: 扫描前跳过泛解析主域名，或扫描后过滤泛解析结果
//!
//! ## 快速开始
//!
//! ```rust,no_run
//! use rsubscan::brute_force_subdomains;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let domains = vec!["example.com".to_string()];
//!     let results = brute_force_subdomains(domains, None).await?;
//!
//!     println!("发现 {} 个子域名", results.len());
//!     for result in results.iter().take(5) {
//!         println!("  {}", result);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## 高级配置
//!
//! ```rust,no_run
//! use rsubscan::{SubdomainBruteConfig, SubdomainBruteEngine};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SubdomainBruteConfig {
//!         domains: vec!["example.com".to_string()],
//!         rate: Some(5000),
//!         max_retry: 2,
//!         drain: Duration::from_secs(3),
//!         silent: true,
//!         ..Default::default()
//!     };
//!
//!     let engine = SubdomainBruteEngine::new(config).await?;
//!     let report = engine.run().await?;
//!     println!("{}", report);
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod capture;
pub mod codec;
pub mod device;
pub mod error;
pub mod feed;
pub mod handle;
pub mod input;
pub mod ledger;
pub mod limiter;
pub mod logger;
pub mod model;
pub mod output;
pub mod recv;
pub mod retry;
pub mod send;
pub mod spill;
pub mod state;
pub mod structs;
pub mod subdata;
pub mod util;
pub mod wildcard;

// 重新导出主要的公共API
pub use api::{brute_force_subdomains, run_speed_test, ScanReport, SubdomainBruteConfig, SubdomainBruteEngine};

// 导出其他有用的类型
pub use error::{CodecError, LedgerError, SendError, SetupError};
pub use ledger::Ledger;
pub use model::{Answer, QueryRecord, ResolveResult};
pub use speed_test::{SpeedTestResult, SpeedTester};
pub use state::Phase;
pub use wildcard::WildcardDetector;

// 设备相关
pub use device::{list_network_devices, print_network_devices, NetworkDevice};
