use anyhow::Result;
use clap::Parser;
use leaf_diagnosis::{config::Config, diagnosis::HealthPolicy, web::serve};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "leaf-diagnosis")]
#[command(about = "ONNX-powered plant leaf disease diagnosis service")]
struct Args {
    /// Server bind address
    #[arg(long, default_value = "0.0.0.0:8501")]
    bind: String,

    /// Number of worker threads
    #[arg(long)]
    workers: Option<usize>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Model directory path
    #[arg(long, default_value = "models")]
    models_dir: String,

    /// Model file name inside the model directory
    #[arg(long, default_value = leaf_diagnosis::config::DEFAULT_MODEL_FILE)]
    model_file: String,

    /// Download URL used when the model file is missing
    #[arg(long, env = "LEAF_MODEL_URL")]
    model_url: Option<String>,

    /// Load the model at startup instead of on the first request
    #[arg(long)]
    preload: bool,

    /// Disease catalog JSON (defaults to the built-in table)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// How a label is judged healthy
    #[arg(long, value_enum, default_value_t = HealthPolicy::Substring)]
    health_policy: HealthPolicy,

    /// Stylesheet inlined into the page
    #[arg(long, default_value = "static/style.css")]
    stylesheet: PathBuf,

    /// Analyze as soon as an image is selected
    #[arg(long)]
    auto_analyze: bool,

    /// Minimum spinner duration in milliseconds
    #[arg(long, default_value_t = 1000)]
    min_spinner_ms: u64,

    /// Number of candidate classes returned
    #[arg(long, default_value_t = 3)]
    top_k: usize,

    /// Enable development mode
    #[arg(long)]
    dev: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志系统
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_target(false)
        .init();

    tracing::info!("Starting leaf disease diagnosis service...");
    tracing::info!("Bind address: {}", args.bind);
    tracing::info!("Models directory: {}", args.models_dir);

    // 创建配置
    let config = Config::new(args.bind, args.models_dir, args.workers, args.dev)?
        .with_model_file(args.model_file)
        .with_model_url(args.model_url)
        .with_preload(args.preload)
        .with_catalog(args.catalog)
        .with_health_policy(args.health_policy)
        .with_stylesheet(Some(args.stylesheet))
        .with_auto_analyze(args.auto_analyze)
        .with_min_spinner_ms(args.min_spinner_ms)
        .with_top_k(args.top_k);

    tracing::info!("Model file: {}", config.model_path().display());
    tracing::info!("Health policy: {}", config.health_policy.as_str());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.workers.max(1))
        .enable_all()
        .build()?;

    runtime.block_on(serve(config))?;

    Ok(())
}
