use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Mutex;
use trust_dns_resolver::config::*;
use trust_dns_resolver::TokioAsyncResolver;

use crate::model::ResolveResult;
use crate::util::random_str;

/// 每个主域名探测的随机子域名数量
const PROBE_COUNT: usize = 3;

/// 泛解析检测器
///
/// 用随机子域名探测主域名，多数探测都能解析时认为存在泛解析，
/// 并记录这些探测返回的地址集合。
pub struct WildcardDetector {
    resolver: TokioAsyncResolver,
    wildcard_cache: Mutex<HashMap<String, HashSet<Ipv4Addr>>>,
}

impl WildcardDetector {
    /// 使用扫描同一组DNS服务器
    pub fn new(resolvers: &[Ipv4Addr]) -> Self {
        let ips: Vec<IpAddr> = resolvers.iter().map(|ip| IpAddr::V4(*ip)).collect();
        let config = if ips.is_empty() {
            ResolverConfig::default()
        } else {
            ResolverConfig::from_parts(None, vec![], NameServerConfigGroup::from_ips_clear(&ips, 53, true))
        };
        let resolver = TokioAsyncResolver::tokio(config, ResolverOpts::default());
        WildcardDetector {
            resolver,
            wildcard_cache: Mutex::new(HashMap::new()),
        }
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, HashMap<String, HashSet<Ipv4Addr>>> {
        match self.wildcard_cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    async fn lookup_v4(&self, name: &str) -> Vec<Ipv4Addr> {
        match self.resolver.lookup_ip(name).await {
            Ok(response) => response
                .iter()
                .filter_map(|ip| match ip {
                    IpAddr::V4(v4) => Some(v4),
                    IpAddr::V6(_) => None,
                })
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// 检测域名是否存在泛解析
    pub async fn detect_wildcard(&self, domain: &str) -> bool {
        let mut resolved = 0;
        let mut ips = HashSet::new();
        for _ in 0..PROBE_COUNT {
            let probe = format!("{}.{}", random_str(10), domain);
            let answers = self.lookup_v4(&probe).await;
            if !answers.is_empty() {
                resolved += 1;
                ips.extend(answers);
            }
        }

        if resolved * 2 > PROBE_COUNT {
            self.record_wildcard(domain, ips);
            return true;
        }
        false
    }

    /// 记录一个主域名的泛解析地址集合
    pub fn record_wildcard(&self, domain: &str, ips: HashSet<Ipv4Addr>) {
        self.cache().insert(domain.to_ascii_lowercase(), ips);
    }

    pub fn is_wildcard_domain(&self, domain: &str) -> bool {
        self.cache().contains_key(&domain.to_ascii_lowercase())
    }

    /// 扫描前过滤，返回不存在泛解析的主域名
    pub async fn filter_domains(&self, domains: Vec<String>) -> Vec<String> {
        let mut kept = Vec::with_capacity(domains.len());
        for domain in domains {
            if self.detect_wildcard(&domain).await {
                log::warn!("域名 {} 存在泛解析记录，已跳过", domain);
            } else {
                kept.push(domain);
            }
        }
        kept
    }

    /// 结果的A记录全部落在其主域名的泛解析地址集合内
    pub fn is_wildcard_result(&self, result: &ResolveResult) -> bool {
        let cache = self.cache();
        let name = result.subdomain.as_str();
        let wildcard_ips = cache.iter().find(|(base, _)| {
            name.len() > base.len() && name.ends_with(base.as_str()) && name[..name.len() - base.len()].ends_with('.')
        });

        match wildcard_ips {
            Some((_, ips)) => {
                let mut v4 = result.ipv4s().peekable();
                v4.peek().is_some() && v4.all(|ip| ips.contains(&ip))
            }
            None => false,
        }
    }

    /// 扫描后过滤，去掉泛解析产生的结果
    pub fn filter_results(&self, results: Vec<ResolveResult>) -> Vec<ResolveResult> {
        let before = results.len();
        let kept: Vec<ResolveResult> = results.into_iter().filter(|r| !self.is_wildcard_result(r)).collect();
        if kept.len() < before {
            log::info!("泛解析过滤移除 {} 条结果", before - kept.len());
        }
        kept
    }
}
