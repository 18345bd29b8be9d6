use clap::Parser;
use log::LevelFilter;
use std::net::Ipv4Addr;
use std::process::ExitCode;
use std::time::Duration;

use rsubscan::device;
use rsubscan::input::Opts;
use rsubscan::logger::init_logger;
use rsubscan::util::parse_resolvers;
use rsubscan::{run_speed_test, SetupError, SubdomainBruteEngine};

/// 网速测试时长
const SPEED_TEST_DURATION: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> ExitCode {
    let opts = Opts::parse();

    let level = if opts.verbose {
        LevelFilter::Debug
    } else if opts.silent {
        LevelFilter::Warn
    } else {
        LevelFilter::Info
    };
    if let Err(e) = init_logger(level) {
        eprintln!("初始化日志失败: {}", e);
    }

    // 网络接口列表
    if opts.list_network {
        println!("可用网络接口:");
        device::print_network_devices();
        return ExitCode::SUCCESS;
    }

    let result = if opts.test {
        network_speed_test(opts).await
    } else {
        subdomain_brute(opts).await
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// 运行网速测试，目标为第一个DNS服务器
async fn network_speed_test(opts: Opts) -> Result<(), SetupError> {
    let target = parse_resolvers(&opts.resolvers)?
        .first()
        .copied()
        .unwrap_or(Ipv4Addr::new(8, 8, 8, 8));
    run_speed_test(opts.device, target, SPEED_TEST_DURATION).await?;
    Ok(())
}

/// 执行域名暴破主逻辑
async fn subdomain_brute(opts: Opts) -> Result<(), SetupError> {
    let config = opts.into_config();
    let engine = SubdomainBruteEngine::new(config).await?;
    let report = engine.run().await?;
    if report.results.is_empty() {
        log::info!("未发现子域名");
    }
    Ok(())
}
