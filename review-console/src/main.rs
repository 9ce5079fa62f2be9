//! 审阅工作流控制台主程序

mod config;

use crate::config::ConsoleConfig;
use clap::{Parser, Subcommand};
use review_client::HttpCaseService;
use review_core::{ReviewResult, SourceDescriptor};
use review_workflow::{CaseStore, Navigator, StageSequencer};
use std::sync::Arc;
use tracing::{error, info};

/// 控制台命令行参数
#[derive(Parser, Debug)]
#[command(name = "review-console")]
#[command(about = "肺结节影像审阅工作流控制台")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 根资源地址，覆盖配置
    #[arg(short, long)]
    root_url: Option<String>,

    /// 日志级别，覆盖配置
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 发现端点并为影像新建病例
    Open {
        /// 影像来源 URI
        uri: String,
    },
    /// 加载病例并显示候选、结节和阶段
    Load { case_url: String },
    /// 提交候选的审阅结果（marked、dismissed、none）
    Review {
        case_url: String,
        candidate_url: String,
        result: ReviewResult,
    },
    /// 显示各阶段可达性和默认落地阶段
    Stages { case_url: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut settings = ConsoleConfig::load(args.config.as_deref())?;
    if let Some(root_url) = args.root_url {
        settings.api.root_url = root_url;
    }
    let log_level = args.log_level.unwrap_or_else(|| settings.logging.level.clone());

    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(&log_level)
        .init();

    info!("启动审阅工作流控制台...");
    info!("  根资源: {}", settings.api.root_url);
    info!("  请求超时: {}秒", settings.api.timeout_secs);

    let service = Arc::new(HttpCaseService::new(settings.client_config())?);
    let store = CaseStore::new(service);
    let sequencer = StageSequencer::default();

    if let Err(e) = run(args.command, &store, &sequencer).await {
        error!("命令执行失败: {}", e);
        return Err(e.into());
    }

    Ok(())
}

async fn run(
    command: Command,
    store: &CaseStore,
    sequencer: &StageSequencer,
) -> review_core::Result<()> {
    match command {
        Command::Open { uri } => {
            store.populate_endpoints().await?;
            store.start_new_case(&SourceDescriptor::new(uri)).await?;
            print_case(store);
            print_stages(store, sequencer);
        }
        Command::Load { case_url } => {
            store.load_case(&case_url).await?;
            print_case(store);
            print_stages(store, sequencer);
        }
        Command::Review {
            case_url,
            candidate_url,
            result,
        } => {
            store.load_case(&case_url).await?;
            let updated = store.review_candidate(&candidate_url, result).await?;
            println!("✅ 候选 {} 审阅结果: {}", updated.url, updated.review_result);
            if store.snapshot().candidate(&updated.url).is_none() {
                println!("⚠️  该候选不在当前病例中，本地列表未更新");
            }
            print_stages(store, sequencer);
        }
        Command::Stages { case_url } => {
            store.load_case(&case_url).await?;
            print_stages(store, sequencer);
        }
    }
    Ok(())
}

fn print_case(store: &CaseStore) {
    let case = store.snapshot();
    println!("📋 病例: {}", case.url.as_deref().unwrap_or("(无)"));
    println!("   图像: {}", case.image_paths().len());

    println!("   候选: {}", case.candidates.len());
    for candidate in &case.candidates {
        println!(
            "   - {} 概率 {:?} 审阅 {}",
            candidate.url, candidate.probability_concerning, candidate.review_result
        );
    }

    println!("   结节: {}", case.nodules.len());
    for nodule in &case.nodules {
        println!(
            "   - {} 来源 {}",
            nodule.url,
            nodule.candidate.as_deref().unwrap_or("手动添加")
        );
    }
}

fn print_stages(store: &CaseStore, sequencer: &StageSequencer) {
    println!("\n📊 阶段:");
    for status in sequencer.stage_report(store) {
        let mark = if status.enterable { "✅" } else { "⛔" };
        println!(
            "   {} {} ({}) 前置条件 {:?}",
            mark,
            status.stage,
            status.stage.path(),
            status.prerequisite
        );
    }

    let mut navigator = Navigator::new(sequencer.clone());
    let landing = navigator.land(store);
    println!("   默认落地: {}", landing);
    if let Some(next) = landing.next() {
        let hint = if sequencer.gate().can_enter(next, store) {
            "可进入"
        } else {
            "尚未满足前置条件"
        };
        println!("   下一阶段: {} ({})", next, hint);
    }
}
