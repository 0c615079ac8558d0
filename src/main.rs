use cache_pounder::batch::{ConsoleSink, CsvSink, Fanout};
use cache_pounder::cache::build_store;
use cache_pounder::config::{DEFAULT_CONFIG_PATH, DEFAULT_CSV_PATH, messages};
use cache_pounder::error::ErrorContext;
use cache_pounder::{Pounder, Result, WorkloadConfig};
use clap::{ArgAction, Parser};
use env_logger::{Builder, Env};
use log::{LevelFilter, error};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "cache-pounder")]
#[command(about = "Pound a tiered cache with a mixed read/write workload")]
struct Cli {
    /// YAML 配置文件
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// 批次采样 CSV 输出
    #[arg(long, default_value = DEFAULT_CSV_PATH, conflicts_with = "no_csv")]
    csv: PathBuf,

    /// 不写 CSV
    #[arg(long)]
    no_csv: bool,

    /// 日志更详细（可重复）
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// 只输出错误日志
    #[arg(short, long)]
    quiet: bool,
}

fn log_level(cli: &Cli) -> LevelFilter {
    if cli.quiet {
        return LevelFilter::Error;
    }
    match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn pound(cli: &Cli) -> Result<()> {
    let config = WorkloadConfig::from_path(&cli.config)?;
    println!(" Printing Pounder YAML config values:");
    println!("{}", config);

    let store = build_store(&config).with_context(messages::STORE_BUILD_FAILED)?;

    let mut sink = Fanout::new().with(ConsoleSink);
    if !cli.no_csv {
        sink = sink.with(CsvSink::create(&cli.csv)?);
    }

    let results = Pounder::new(&config, store.as_ref(), &sink)?
        .run()
        .with_context(messages::RUN_FAILED)?;
    println!("{}", results);

    if let Some(stats) = store.tier_stats() {
        println!("{} tier stats: {}", store.name(), stats);
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // 没有 -v/-q 且设置了 RUST_LOG 时以环境变量为准
    let mut logger = if cli.verbose == 0 && !cli.quiet && std::env::var_os("RUST_LOG").is_some() {
        Builder::from_env(Env::default())
    } else {
        let mut builder = Builder::new();
        builder.filter_level(log_level(&cli));
        builder
    };
    logger.format_timestamp_millis().init();

    match pound(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
