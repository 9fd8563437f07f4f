//! chat-translator 命令行入口

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use chat_translator::env::{generate_env_docs, storage::DataDir, EnvVar, LogLevel};
use chat_translator::translation::{
    config_file_exists, constants, ConfigManager, Delivery, FileStore, MessageLog, MessageRecord,
    PersistentStore, TranslationService, TranslationSink,
};

#[derive(Parser)]
#[command(name = "chat-translator")]
#[command(about = "Context-aware LLM translation and reply generation for chat logs", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (TOML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding persisted settings and cache
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate the most recent messages of a JSON message log
    Translate {
        /// JSON array of {channel_id, message_id, author, text}
        #[arg(short, long)]
        messages: PathBuf,
        #[arg(short, long, default_value_t = constants::MANUAL_SCAN_LIMIT)]
        limit: usize,
    },
    /// Generate a reply from the latest messages of a JSON message log
    Reply {
        #[arg(short, long)]
        messages: PathBuf,
        /// Reply preset id, or "random"
        #[arg(short, long)]
        preset: Option<String>,
        /// Extra instruction appended to the prompt
        #[arg(short, long)]
        instruction: Option<String>,
    },
    /// Remove every cached translation
    ClearCache,
    /// Print the effective settings (API key masked)
    ShowConfig,
    /// Write a configuration file with default settings
    InitConfig { path: PathBuf },
    /// List the supported environment variables
    EnvDocs,
}

/// 把译文打印到标准输出
struct PrintSink;

impl TranslationSink for PrintSink {
    fn deliver(&self, delivery: Delivery) {
        let marker = if delivery.from_cache { " (cached)" } else { "" };
        println!("{}{}\t{}", delivery.message, marker, delivery.text);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let cli = Cli::parse();

    match &cli.command {
        Commands::InitConfig { path } => {
            ConfigManager::generate_example_config(path)?;
            println!("已生成配置文件: {}", path.display());
            return Ok(());
        }
        Commands::EnvDocs => {
            print!("{}", generate_env_docs());
            return Ok(());
        }
        _ => {}
    }

    let store: Arc<dyn PersistentStore> = Arc::new(FileStore::open(data_dir(cli.data_dir.as_deref()))?);
    let config = config_manager(&store, cli.config.as_deref());

    match cli.command {
        Commands::Translate { messages, limit } => {
            let log = load_messages(&messages)?;
            let service = TranslationService::builder(Arc::clone(&store), Arc::new(log))
                .config_manager(config)
                .translation_sink(Arc::new(PrintSink))
                .build()?;

            let summary = service.scan_recent(limit, true)?;
            service.drain().await?;
            service.shutdown().await;

            let stats = service.stats();
            eprintln!(
                "queued {}, cached {}, failed {}",
                summary.queued, summary.cached, stats.translations_failed
            );
        }
        Commands::Reply {
            messages,
            preset,
            instruction,
        } => {
            let log = load_messages(&messages)?;
            let service = TranslationService::builder(Arc::clone(&store), Arc::new(log))
                .config_manager(config)
                .build()?;

            let preset_id = preset.unwrap_or_else(|| service.settings().reply_preset_id);
            let result = service
                .generate_reply_with_preset(&preset_id, instruction.as_deref())
                .await;
            service.shutdown().await;

            let reply = result?;
            eprintln!("preset: {} ({})", reply.preset.label, reply.preset.id);
            println!("{}", reply.text);
        }
        Commands::ClearCache => {
            let service = TranslationService::builder(Arc::clone(&store), Arc::new(MessageLog::new()))
                .config_manager(config)
                .build()?;
            service.reset_cache()?;
            service.shutdown().await;
            println!("已清空翻译缓存");
        }
        Commands::ShowConfig => {
            if cli.config.is_none() && !config_file_exists() {
                eprintln!("未找到配置文件，使用默认设置");
            }
            let settings = config.load().redacted();
            print!("{}", toml::to_string_pretty(&settings)?);
        }
        Commands::InitConfig { .. } | Commands::EnvDocs => {}
    }

    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(LogLevel::get().unwrap_or_else(|_| "info".to_string()))
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn data_dir(cli_value: Option<&Path>) -> PathBuf {
    if let Some(dir) = cli_value {
        return dir.to_path_buf();
    }
    match DataDir::lookup() {
        Ok(Some(dir)) => PathBuf::from(dir),
        _ => PathBuf::from(shellexpand::tilde(constants::DEFAULT_DATA_DIR).as_ref()),
    }
}

fn config_manager(store: &Arc<dyn PersistentStore>, path: Option<&Path>) -> ConfigManager {
    let manager = ConfigManager::new(Arc::clone(store));
    match path {
        Some(path) => manager.with_config_file(path),
        None => manager,
    }
}

fn load_messages(path: &Path) -> Result<MessageLog, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    let records: Vec<MessageRecord> = serde_json::from_str(&raw)?;
    let log = MessageLog::new();
    log.extend(records);
    Ok(log)
}
