use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::api::SubdomainBruteConfig;

#[derive(Parser, Debug)]
#[command(name = "rsubscan")]
#[command(version = "0.1")]
#[command(about = "A stateless DNS brute-force resolver", long_about = None, arg_required_else_help = true)]
pub struct Opts {
    /// base domains to enumerate; full names in verify mode
    #[arg(short, long)]
    pub domain: Vec<String>,

    /// wordlist path (verify mode: list of full names)
    #[arg(short, long)]
    pub file: Option<String>,

    /// read targets from stdin
    #[arg(long)]
    pub stdin: bool,

    /// verify mode: resolve the given names as-is
    #[arg(long)]
    pub verify: bool,

    /// resolver IPs, use default dns on default
    #[arg(short, long)]
    pub resolvers: Vec<String>,

    /// packets per second, overrides --bandwidth
    #[arg(long)]
    pub rate: Option<u64>,

    /// bandwidth limit (e.g., 3M, 5K, 10G)
    #[arg(short, long, default_value = "2M")]
    pub bandwidth: String,

    /// seconds before an unanswered query is retried
    #[arg(long, default_value_t = 6)]
    pub timeout: u64,

    /// max retransmissions per name
    #[arg(long, default_value_t = 3)]
    pub retry: u32,

    /// output file path
    #[arg(short, long)]
    pub output: Option<String>,

    /// silent, only print results
    #[arg(short, long)]
    pub silent: bool,

    /// skip wildcard base domains before the scan
    #[arg(long)]
    pub skip_wildcard: bool,

    /// drop wildcard results after the scan
    #[arg(long)]
    pub filter_wildcard: bool,

    /// also export <output>.csv
    #[arg(long)]
    pub csv: bool,

    /// manually specify network device
    #[arg(short = 'e', long)]
    pub device: Option<String>,

    /// list network
    #[arg(short, long)]
    pub list_network: bool,

    /// network speed test
    #[arg(long)]
    pub test: bool,

    /// pending queries kept in memory before spilling to disk
    #[arg(long, default_value_t = crate::ledger::DEFAULT_MEMORY_LIMIT)]
    pub memory_limit: usize,

    /// seconds to wait for late responses after the last query settles
    #[arg(long, default_value_t = 5)]
    pub drain: u64,

    /// debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Opts {
    pub fn into_config(self) -> SubdomainBruteConfig {
        SubdomainBruteConfig {
            domains: self.domain,
            resolvers: self.resolvers,
            dictionary_file: self.file.map(PathBuf::from),
            stdin: self.stdin,
            verify_mode: self.verify,
            rate: self.rate,
            bandwidth_limit: Some(self.bandwidth),
            timeout: self.timeout,
            max_retry: self.retry,
            memory_limit: self.memory_limit,
            drain: Duration::from_secs(self.drain),
            output: self.output.map(PathBuf::from),
            silent: self.silent,
            skip_wildcard: self.skip_wildcard,
            filter_wildcard: self.filter_wildcard,
            csv: self.csv,
            device: self.device,
            ..Default::default()
        }
    }
}

/// 解析带宽字符串为字节/秒
pub fn parse_bandwidth(bandwidth: &str) -> Result<u64, String> {
    let bandwidth = bandwidth.trim().to_uppercase();
    let (num_str, multiplier) = if let Some(n) = bandwidth.strip_suffix('K') {
        (n, 1024.0)
    } else if let Some(n) = bandwidth.strip_suffix('M') {
        (n, 1024.0 * 1024.0)
    } else if let Some(n) = bandwidth.strip_suffix('G') {
        (n, 1024.0 * 1024.0 * 1024.0)
    } else {
        return Err("Invalid bandwidth format. Use K, M, or G suffix.".to_string());
    };

    let num: f64 = num_str.parse().map_err(|_| "Invalid number in bandwidth".to_string())?;
    if num < 0.0 {
        return Err("Bandwidth must be positive".to_string());
    }
    Ok((num * multiplier) as u64)
}
