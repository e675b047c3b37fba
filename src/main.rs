use std::sync::Arc;

use anyhow::Context as _;
use crossterm::tty::IsTty;

use protoprobe::cli::Args;
use protoprobe::config::Config;
use protoprobe::core::{Orchestrator, ReqwestEngine, RunSettings, Target};
use protoprobe::ui::{self, BarsSink, LineSink, RenderSink, RunSummary};
use protoprobe::utils::logger::{self, Flush, LoggerActor};

#[actix::main]
async fn main() {
    // 解析参数和配置
    let (args, config) = match Args::parse_args() {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("参数解析失败: {}", e);
            std::process::exit(2);
        }
    };

    let logger = match LoggerActor::new(&config.log_file, config.level_filter(), config.log_max_size) {
        Ok(actor) => match logger::install(actor) {
            Ok(addr) => Some(addr),
            Err(e) => {
                eprintln!("无法安装日志: {}", e);
                None
            }
        },
        Err(e) => {
            eprintln!("无法打开日志文件 {}: {}", config.log_file, e);
            None
        }
    };

    log::info!("程序启动，配置文件: {}", args.config);
    log::debug!("{}", config.get_summary());

    let code = match run(&args, &config).await {
        Ok(()) => 0,
        Err(e) => {
            log::error!("运行失败: {:#}", e);
            ui::print_error(&format!("{:#}", e));
            1
        }
    };

    if let Some(addr) = logger {
        let _ = addr.send(Flush).await;
    }
    std::process::exit(code);
}

async fn run(args: &Args, config: &Config) -> anyhow::Result<()> {
    let target = Target::parse(args.target()?, config.http_port, config.https_port)?;
    log::info!("目标: {} ({} / {})", target.host(), target.plain_url(), target.tls_url());

    let engine = Arc::new(ReqwestEngine::new(config).context("初始化 HTTP 客户端失败")?);
    let mut orchestrator = Orchestrator::new(engine, RunSettings::from_config(config, &args.only));

    // 从探测开始就接管 Ctrl-C，保证日志能在退出前刷新
    let interrupt = interrupt_signal();
    tokio::pin!(interrupt);

    let Some(probe) = orchestrator.probe_until(&target, interrupt.as_mut()).await? else {
        ui::print_warning("探测被中断");
        return Ok(());
    };
    ui::print_capabilities(&probe);
    if args.probe_only {
        return Ok(());
    }

    let selected = orchestrator.select(&probe)?;
    let names: Vec<&str> = selected.iter().map(|p| p.label()).collect();
    ui::print_heading(&format!("开始并发下载测试: {}", names.join(", ")));

    let mut sink: Box<dyn RenderSink> = if std::io::stdout().is_tty() && !args.plain {
        Box::new(BarsSink::new(&selected))
    } else {
        Box::new(LineSink::stdout())
    };

    let report = orchestrator
        .download(&target, &probe, &selected, sink.as_mut(), interrupt.as_mut())
        .await;
    print!("{}", RunSummary::from(&report));
    log::info!(
        "测试结束，用时 {:.2} 秒{}",
        report.elapsed.as_secs_f64(),
        if report.interrupted { "（用户中断）" } else { "" }
    );
    Ok(())
}

/// Ctrl-C；注册失败时永不触发
async fn interrupt_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::warn!("无法监听 Ctrl-C: {}", e);
        futures::future::pending::<()>().await;
    }
}
