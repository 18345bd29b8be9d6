use std::fmt;
use std::io::Write;
use std::net::{Ipv4Addr, UdpSocket};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::capture::{open_capture, FrameReceiver, FrameSender};
use crate::device;
use crate::error::SetupError;
use crate::feed::{FeedMode, TargetFeed, TargetSource};
use crate::handle::{self, DnsHandler};
use crate::input::parse_bandwidth;
use crate::ledger::{Ledger, DEFAULT_MEMORY_LIMIT};
use crate::limiter::RateLimiter;
use crate::model::{EthTable, ResolveResult};
use crate::output::{export_csv, remove_from_output, ResultSink};
use crate::recv;
use crate::retry::{RetryScanner, DEFAULT_SWEEP_INTERVAL};
use crate::send::{self, SendDog};
use crate::speed_test::{SpeedTestResult, SpeedTester};
use crate::state::{Phase, RunState};
use crate::structs::CounterSnapshot;
use crate::util::{alloc_port, parse_resolvers, window_width};
use crate::wildcard::WildcardDetector;

/// 按带宽换算速率时每个查询帧的估算字节数
const BYTES_PER_QUERY: u64 = 80;

/// 状态栏刷新间隔
const STATUS_INTERVAL: Duration = Duration::from_millis(500);

/// 域名暴破配置
#[derive(Debug, Clone)]
pub struct SubdomainBruteConfig {
    /// 目标域名列表，验证模式下为完整域名
    pub domains: Vec<String>,
    /// DNS服务器列表
    pub resolvers: Vec<String>,
    /// 字典文件路径
    pub dictionary_file: Option<PathBuf>,
    /// 从标准输入读取目标
    pub stdin: bool,
    /// 验证模式：目标即完整域名
    pub verify_mode: bool,
    /// 发包速率（包/秒），优先于带宽
    pub rate: Option<u64>,
    /// 带宽限制 (如 "3M", "5K", "10G")
    pub bandwidth_limit: Option<String>,
    /// 超时时间（秒）
    pub timeout: u64,
    /// 最大重试次数
    pub max_retry: u32,
    /// 超时扫描间隔
    pub sweep_interval: Duration,
    /// 内存中保存的待响应查询上限，超出部分写入磁盘
    pub memory_limit: usize,
    /// 磁盘层文件目录，默认为系统临时目录
    pub spill_dir: Option<PathBuf>,
    /// 状态表清空后等待迟到响应的时间
    pub drain: Duration,
    /// 结果文件
    pub output: Option<PathBuf>,
    /// 是否静默模式
    pub silent: bool,
    /// 扫描前跳过泛解析主域名
    pub skip_wildcard: bool,
    /// 扫描后过滤泛解析结果
    pub filter_wildcard: bool,
    /// 额外导出CSV
    pub csv: bool,
    /// 网络设备名称
    pub device: Option<String>,
}

impl Default for SubdomainBruteConfig {
    fn default() -> Self {
        SubdomainBruteConfig {
            domains: Vec::new(),
            resolvers: Vec::new(),
            dictionary_file: None,
            stdin: false,
            verify_mode: false,
            rate: None,
            bandwidth_limit: Some("2M".to_string()),
            timeout: 6,
            max_retry: 3,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            memory_limit: DEFAULT_MEMORY_LIMIT,
            spill_dir: None,
            drain: Duration::from_secs(5),
            output: None,
            silent: false,
            skip_wildcard: false,
            filter_wildcard: false,
            csv: false,
            device: None,
        }
    }
}

impl SubdomainBruteConfig {
    /// 实际使用的发包速率
    pub fn effective_rate(&self) -> Result<u64, SetupError> {
        let rate = match (self.rate, &self.bandwidth_limit) {
            (Some(rate), _) => rate,
            (None, Some(bandwidth)) => parse_bandwidth(bandwidth).map_err(SetupError::InvalidRate)? / BYTES_PER_QUERY,
            (None, None) => 1000,
        };
        if rate == 0 {
            return Err(SetupError::InvalidRate("速率必须大于0".to_string()));
        }
        Ok(rate)
    }

    /// 检查配置，返回启动前就能发现的错误
    pub fn validate(&self) -> Result<(), SetupError> {
        self.effective_rate()?;
        parse_resolvers(&self.resolvers)?;
        if self.verify_mode {
            if self.domains.is_empty() && self.dictionary_file.is_none() && !self.stdin {
                return Err(SetupError::NoTargets("验证模式需要 -d、-f 或 --stdin".to_string()));
            }
        } else if self.domains.is_empty() && !self.stdin {
            return Err(SetupError::NoTargets("需要至少一个主域名".to_string()));
        }
        Ok(())
    }

    /// 字典来源和投递模式
    fn targets(&self) -> Result<(Vec<String>, FeedMode), SetupError> {
        if self.verify_mode {
            let source = match (&self.dictionary_file, self.stdin) {
                (Some(path), _) => TargetSource::File(path.clone()),
                (None, true) => TargetSource::Stdin,
                (None, false) => TargetSource::Names(self.domains.clone()),
            };
            return Ok((source.load()?, FeedMode::Verify));
        }

        let mut domains = TargetSource::Names(self.domains.clone()).load()?;
        if self.stdin {
            domains.extend(TargetSource::Stdin.load()?);
        }
        let words = match &self.dictionary_file {
            Some(path) => TargetSource::File(path.clone()).load()?,
            None => TargetSource::BuiltIn.load()?,
        };
        Ok((words, FeedMode::Generate { domains }))
    }
}

/// 一次扫描的汇总
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub counters: CounterSnapshot,
    pub results: Vec<ResolveResult>,
    pub targets: usize,
    pub elapsed: Duration,
}

impl fmt::Display for ScanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} 目标:{} 用时:{:.1}s",
            self.counters,
            self.targets,
            self.elapsed.as_secs_f64()
        )
    }
}

/// 在阻塞线程上执行设备探测
async fn resolve_device(device_name: Option<String>, probe_dns: Ipv4Addr) -> Result<EthTable, SetupError> {
    let res = tokio::task::spawn_blocking(move || match device_name {
        Some(name) => device::get_device_by_name(&name, probe_dns),
        None => device::auto_get_devices(probe_dns),
    })
    .await;
    match res {
        Ok(eth) => eth,
        Err(e) => Err(SetupError::NoDevice(e.to_string())),
    }
}

/// 域名暴破引擎
pub struct SubdomainBruteEngine {
    config: SubdomainBruteConfig,
    ether: EthTable,
    resolvers: Vec<Ipv4Addr>,
    rate: u64,
    words: Vec<String>,
    mode: FeedMode,
    state: Arc<RunState>,
    link: (Box<dyn FrameSender>, Box<dyn FrameReceiver>),
    src_port: u16,
    // 扫描期间保持占用源端口
    _port_guard: Option<UdpSocket>,
    sink: ResultSink,
}

impl SubdomainBruteEngine {
    /// 探测网卡、打开抓包句柄、加载目标
    pub async fn new(config: SubdomainBruteConfig) -> Result<Self, SetupError> {
        config.validate()?;
        let resolvers = parse_resolvers(&config.resolvers)?;
        let ether = resolve_device(config.device.clone(), resolvers[0]).await?;
        log::info!("使用网络设备: {} ({})", ether.device, ether.src_ip);

        let (tx, rx) = open_capture(&ether.device)?;
        let (socket, port) = alloc_port()?;
        Self::build(config, ether, Box::new(tx), Box::new(rx), port, Some(socket))
    }

    /// 使用给定的链路句柄，不探测网卡
    pub fn with_link(
        config: SubdomainBruteConfig,
        ether: EthTable,
        tx: Box<dyn FrameSender>,
        rx: Box<dyn FrameReceiver>,
        src_port: u16,
    ) -> Result<Self, SetupError> {
        config.validate()?;
        Self::build(config, ether, tx, rx, src_port, None)
    }

    fn build(
        config: SubdomainBruteConfig,
        ether: EthTable,
        tx: Box<dyn FrameSender>,
        rx: Box<dyn FrameReceiver>,
        src_port: u16,
        port_guard: Option<UdpSocket>,
    ) -> Result<Self, SetupError> {
        let resolvers = parse_resolvers(&config.resolvers)?;
        let rate = config.effective_rate()?;
        let (words, mode) = config.targets()?;
        let ledger = Ledger::new(config.memory_limit, config.spill_dir.as_deref())?;
        let sink = ResultSink::new(config.output.as_deref(), config.silent, window_width())?;

        Ok(SubdomainBruteEngine {
            config,
            ether,
            resolvers,
            rate,
            words,
            mode,
            state: RunState::new(ledger),
            link: (tx, rx),
            src_port,
            _port_guard: port_guard,
            sink,
        })
    }

    pub fn state(&self) -> Arc<RunState> {
        self.state.clone()
    }

    /// 运行扫描直到状态表清空并等待完迟到的响应
    pub async fn run(self) -> Result<ScanReport, SetupError> {
        let start = Instant::now();
        let detector = if self.config.skip_wildcard || self.config.filter_wildcard {
            Some(WildcardDetector::new(&self.resolvers))
        } else {
            None
        };

        let mode = match (&self.mode, &detector) {
            (FeedMode::Generate { domains }, Some(detector)) if self.config.skip_wildcard => FeedMode::Generate {
                domains: detector.filter_domains(domains.clone()).await,
            },
            (mode, _) => mode.clone(),
        };

        let SubdomainBruteEngine {
            config,
            ether,
            resolvers,
            rate,
            words,
            state,
            link: (link_tx, link_rx),
            src_port,
            _port_guard,
            sink,
            ..
        } = self;

        let feed = TargetFeed::new(words, mode.clone(), resolvers.clone(), state.clone());
        let targets = feed.total();
        log::info!("目标数量: {}，速率: {} 包/秒，DNS服务器: {} 个", targets, rate, resolvers.len());

        let (work_tx, work_rx) = mpsc::channel(rate.min(1 << 20) as usize);
        let (result_tx, result_rx) = mpsc::unbounded_channel();
        let (frame_tx, frame_rx) = crossbeam_channel::unbounded();

        let capture_state = state.clone();
        let capture = std::thread::spawn(move || recv::recv(link_rx, frame_tx, capture_state));
        let handler = DnsHandler::new(state.clone(), src_port, result_tx);
        let decoder = std::thread::spawn(move || handle::handle_dns_packet(handler, frame_rx));

        let dog = Arc::new(SendDog::new(
            ether,
            resolvers.clone(),
            link_tx,
            src_port,
            config.max_retry,
            RateLimiter::new(rate),
            state.clone(),
        ));
        let sink_task = tokio::spawn(sink.sink_cycle(result_rx));
        let send_task = tokio::spawn(send::send_cycle(dog, work_rx));
        let scanner = RetryScanner::new(state.clone(), config.timeout, config.sweep_interval);
        let retry_task = tokio::spawn(scanner.retry_cycle(work_tx.clone()));
        let feed_task = tokio::spawn(feed.run(work_tx));

        let status = StatusPrinter {
            state: state.clone(),
            silent: config.silent,
        };

        // Running
        let mut ticker = tokio::time::interval(STATUS_INTERVAL);
        loop {
            ticker.tick().await;
            status.print("");
            if state.should_drain() {
                break;
            }
        }

        // Draining
        state.advance(Phase::Draining);
        let deadline = Instant::now() + config.drain;
        while Instant::now() < deadline {
            let left = deadline.saturating_duration_since(Instant::now());
            status.print(&format!(" 等待 {}s", left.as_secs() + 1));
            tokio::time::sleep(left.min(STATUS_INTERVAL)).await;
        }

        state.stop();
        feed_task.abort();
        retry_task.abort();
        send_task.abort();
        let joined = tokio::task::spawn_blocking(move || {
            let _ = capture.join();
            let _ = decoder.join();
        })
        .await;
        if let Err(e) = joined {
            log::warn!("等待抓包线程退出失败: {}", e);
        }

        let results = match sink_task.await {
            Ok(results) => results,
            Err(e) => {
                log::error!("结果输出任务异常: {}", e);
                Vec::new()
            }
        };
        status.print("\n");
        let results = post_process(&config, detector.as_ref(), &mode, results).await;

        // Finished
        finish(&state);
        let report = ScanReport {
            counters: state.counters.snapshot(),
            results,
            targets,
            elapsed: start.elapsed(),
        };
        log::info!("扫描完成 {}", report);
        Ok(report)
    }
}

/// 排空阶段的结果后处理：泛解析过滤、CSV导出
async fn post_process(
    config: &SubdomainBruteConfig,
    detector: Option<&WildcardDetector>,
    mode: &FeedMode,
    results: Vec<ResolveResult>,
) -> Vec<ResolveResult> {
    let mut results = results;
    if config.filter_wildcard {
        match (detector, mode) {
            (Some(detector), FeedMode::Generate { domains }) => {
                for domain in domains {
                    if !detector.is_wildcard_domain(domain) {
                        detector.detect_wildcard(domain).await;
                    }
                }
                let wildcard: Vec<&str> = results
                    .iter()
                    .filter(|r| detector.is_wildcard_result(r))
                    .map(|r| r.subdomain.as_str())
                    .collect();
                if let Some(path) = &config.output {
                    if let Err(e) = remove_from_output(path, &wildcard) {
                        log::error!("重写结果文件 {} 失败: {}", path.display(), e);
                    }
                }
                results = detector.filter_results(results);
            }
            (_, FeedMode::Verify) => log::warn!("验证模式没有主域名，跳过泛解析过滤"),
            (None, _) => {}
        }
    }

    if config.csv {
        match &config.output {
            Some(path) => match export_csv(path) {
                Ok(csv) => log::info!("结果已导出到 {}", csv.display()),
                Err(e) => log::error!("{}", e),
            },
            None => log::warn!("未指定结果文件，跳过CSV导出"),
        }
    }
    results
}

/// 进入 Finished 并释放状态表
fn finish(state: &RunState) {
    state.advance(Phase::Finished);
    state.ledger.close();
}

/// 交互模式下的状态栏
struct StatusPrinter {
    state: Arc<RunState>,
    silent: bool,
}

impl StatusPrinter {
    fn print(&self, suffix: &str) {
        if self.silent {
            return;
        }
        let mut stdout = std::io::stdout();
        let _ = write!(stdout, "\r{}{}", self.state.counters.snapshot(), suffix);
        let _ = stdout.flush();
    }
}

/// 便捷的域名暴破函数
pub async fn brute_force_subdomains(
    domains: Vec<String>,
    dictionary_file: Option<PathBuf>,
) -> Result<Vec<ResolveResult>, SetupError> {
    let config = SubdomainBruteConfig {
        domains,
        dictionary_file,
        ..Default::default()
    };

    let engine = SubdomainBruteEngine::new(config).await?;
    Ok(engine.run().await?.results)
}

/// 网速测试函数
pub async fn run_speed_test(
    device_name: Option<String>,
    target: Ipv4Addr,
    duration: Duration,
) -> Result<SpeedTestResult, SetupError> {
    let ether = resolve_device(device_name, target).await?;
    let (tx, _rx) = open_capture(&ether.device)?;
    let (_socket, port) = alloc_port()?;

    let res = tokio::task::spawn_blocking(move || {
        let mut tester = SpeedTester::new(ether, target, Box::new(tx), port);
        let result = tester.run_speed_test(duration);
        tester.display_result(&result);
        result
    })
    .await;
    res.map_err(|e| SetupError::Capture {
        device: "speed test".to_string(),
        reason: e.to_string(),
    })
}
