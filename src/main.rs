use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use video_upload_rust::{
    config::{AppConfig, DEFAULT_CONFIG_PATH},
    history::to_tsv,
    logging,
    uploader::{scan::format_bytes, VideoScanner},
    HistoryStore, HttpTransport, Platform, SqliteHistoryStore, UploadEngine, UploadHooks,
    UploadManager, UploadTaskInfo, UploadTaskStatus,
};

#[derive(Parser, Debug)]
#[command(name = "video-upload", author, version, about, long_about = None)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 上传视频文件（可以是文件或文件夹）
    Upload {
        /// 文件或文件夹路径
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// 展示名称（只在上传单个文件时生效）
        #[arg(short, long)]
        name: Option<String>,

        /// 目标平台: Android / iOS / Web
        #[arg(short, long)]
        platform: Option<Platform>,
    },

    /// 上传历史
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Subcommand, Debug)]
enum HistoryAction {
    /// 列出上传记录
    List {
        /// 只显示指定日期 (YYYY-MM-DD, UTC)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// 删除一条记录
    Remove { id: i64 },
    /// 清空所有记录
    Clear,
    /// 以制表符分隔格式导出
    Export {
        /// 只导出指定日期 (YYYY-MM-DD, UTC)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

/// 上传期间保持唤醒的钩子
///
/// 命令行下只记录事件，界面层可以在这里申请和释放唤醒锁
struct KeepAwakeHooks;

impl UploadHooks for KeepAwakeHooks {
    fn on_uploading_start(&self, task: &UploadTaskInfo) {
        info!("保持唤醒: 开始上传 {}", task.remote_name);
    }

    fn on_progress(&self, task: &UploadTaskInfo) {
        debug!(
            "上传进度: {} {}% ({}/{})",
            task.remote_name, task.progress, task.completed_chunks, task.total_chunks
        );
    }

    fn on_uploading_end(&self, task: &UploadTaskInfo) {
        info!(
            "释放唤醒: {} 上传结束 ({:?})",
            task.remote_name, task.status
        );
    }
}

async fn run_upload(
    config: &AppConfig,
    history: Arc<dyn HistoryStore>,
    paths: Vec<PathBuf>,
    name: Option<String>,
    platform: Option<Platform>,
) -> anyhow::Result<()> {
    let videos = VideoScanner::new().scan(&paths)?;
    if videos.is_empty() {
        anyhow::bail!("没有找到可上传的视频文件");
    }

    let name = match name {
        Some(_) if videos.len() > 1 => {
            warn!("选择了多个文件，忽略 --name 参数");
            None
        }
        other => other,
    };

    let transport = Arc::new(HttpTransport::new(&config.upload)?);
    let engine = Arc::new(
        UploadEngine::new(transport, config.upload.max_concurrent_chunks)
            .with_hooks(Arc::new(KeepAwakeHooks)),
    );
    let manager = UploadManager::from_config(&config.upload, engine, history);

    let mut tasks = Vec::with_capacity(videos.len());
    for video in &videos {
        tasks.push(
            manager
                .prepare(&video.local_path, name.as_deref(), platform)
                .await?,
        );
    }

    // Ctrl-C 取消当前上传，剩余文件不再开始
    let cancel_token = CancellationToken::new();
    let signal_token = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("收到中断信号，正在取消上传...");
            signal_token.cancel();
        }
    });

    let outcomes = manager.upload_all(tasks, &cancel_token).await?;

    let mut failed = 0;
    for outcome in &outcomes {
        let task = &outcome.task;
        match task.status {
            UploadTaskStatus::Succeeded => {
                println!(
                    "✓ {}\t{}",
                    task.remote_name,
                    task.result_url.as_deref().unwrap_or_default()
                );
            }
            UploadTaskStatus::Failed => {
                failed += 1;
                println!(
                    "✗ {}\t{}",
                    task.remote_name,
                    task.error.as_deref().unwrap_or_default()
                );
            }
            UploadTaskStatus::Cancelled => println!("- {}\t已取消", task.remote_name),
            _ => println!("- {}\t未开始", task.remote_name),
        }

        if let Some(warning) = &outcome.storage_warning {
            eprintln!("⚠️  {} 已上传，但保存历史记录失败: {}", task.remote_name, warning);
        }
    }

    if failed > 0 {
        anyhow::bail!("{} 个文件上传失败", failed);
    }
    Ok(())
}

async fn run_history(history: &dyn HistoryStore, action: HistoryAction) -> anyhow::Result<()> {
    match action {
        HistoryAction::List { date } => {
            let records = match date {
                Some(date) => history.list_by_date(date).await?,
                None => history.list_all().await?,
            };

            if records.is_empty() {
                println!("暂无上传记录");
                return Ok(());
            }

            for record in records {
                println!(
                    "{}\t{}\t{}\t{}\t{}\t{}",
                    record.id,
                    record
                        .uploaded_at
                        .with_timezone(&Local)
                        .format("%Y-%m-%d %H:%M:%S"),
                    record.platform.map(|p| p.as_str()).unwrap_or("N/A"),
                    format_bytes(record.file_size),
                    record.file_name,
                    record.url
                );
            }
        }
        HistoryAction::Remove { id } => {
            history.remove(id).await?;
            println!("已删除记录 {}", id);
        }
        HistoryAction::Clear => {
            history.clear().await?;
            println!("已清空上传历史");
        }
        HistoryAction::Export { date } => {
            let records = match date {
                Some(date) => history.list_by_date(date).await?,
                None => history.list_all().await?,
            };
            println!("{}", to_tsv(&records));
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_or_default(&cli.config).await;

    // 必须保持 _log_guard 存活
    let _log_guard = logging::init_logging(&config.log);

    info!("Video Upload v{} 启动", env!("CARGO_PKG_VERSION"));

    let history: Arc<dyn HistoryStore> = Arc::new(
        SqliteHistoryStore::open(&config.history.db_path).with_context(|| {
            format!(
                "打开上传历史数据库失败: {}",
                config.history.db_path.display()
            )
        })?,
    );

    match cli.command {
        Command::Upload {
            paths,
            name,
            platform,
        } => run_upload(&config, history, paths, name, platform).await,
        Command::History { action } => run_history(history.as_ref(), action).await,
    }
}
