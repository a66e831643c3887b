use clap::{Parser, ValueEnum};
use cpp_reindex::config::{IndexerConfig, IndexerMode};
use cpp_reindex::engine::DigestEngine;
use cpp_reindex::index::{INDEX_EVENT_CHANNEL_BUFFER_SIZE, IndexStore, MemoryIndex, SharedIndex};
use cpp_reindex::io::{FileSystemTrait, RealFileSystem};
use cpp_reindex::logging::{LogConfig, init_logging};
use cpp_reindex::project::{ProjectId, ProjectModel, ScanOptions};
use cpp_reindex::task::{
    IndexScheduler, Indexer, TASK_EVENT_CHANNEL_BUFFER_SIZE, TaskEvent, TaskMonitor,
    UpdateOptions, UpdateScope,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Fast,
    Full,
}

impl From<ModeArg> for IndexerMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Fast => IndexerMode::Fast,
            ModeArg::Full => IndexerMode::Full,
        }
    }
}

/// CLI arguments for the C/C++ re-indexer
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Project root directory (defaults to current directory)
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Build directory containing compile_commands.json
    #[arg(long, value_name = "DIR")]
    build_dir: Option<PathBuf>,

    /// Task flavor used for parsing
    #[arg(long, value_enum, default_value = "fast")]
    mode: ModeArg,

    /// Run an update pass instead of a full rebuild
    #[arg(long)]
    update: bool,

    /// With --update, compare content hashes as well as timestamps
    #[arg(long)]
    check_hash: bool,

    /// Index sources that are not part of the build configuration
    #[arg(long)]
    index_all_files: bool,

    /// Index headers on their own instead of through an includer
    #[arg(long)]
    index_unused_headers: bool,

    /// Disable include heuristics in full mode
    #[arg(long)]
    no_heuristics: bool,

    /// Additional include directory (repeatable)
    #[arg(long = "include", value_name = "DIR")]
    include_paths: Vec<PathBuf>,

    /// Print index statistics as JSON
    #[arg(long)]
    json: bool,

    /// Log level (overrides RUST_LOG env var)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Log file path (overrides REINDEX_LOG_FILE env var)
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

fn build_config(args: &Args) -> Result<IndexerConfig, Box<dyn std::error::Error>> {
    let mut builder = IndexerConfig::builder()
        .index_all_files(args.index_all_files)
        .index_unused_headers(args.index_unused_headers)
        .include_heuristics(!args.no_heuristics);
    for path in &args.include_paths {
        let path = if path.is_absolute() {
            path.clone()
        } else {
            std::env::current_dir()?.join(path)
        };
        builder = builder.add_include_path(path);
    }
    Ok(builder.build()?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let log_config = LogConfig::from_env().with_overrides(args.log_level.clone(), args.log_file.clone());
    if let Err(e) = init_logging(log_config) {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    }

    let root = match &args.root {
        Some(root) => root.clone(),
        None => std::env::current_dir()?,
    };
    let id = ProjectId::new(
        root.file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "project".to_string()),
    );

    let options = ScanOptions {
        build_dir: args.build_dir.clone(),
        ..ScanOptions::default()
    };
    let model = match ProjectModel::scan(id, &root, &options) {
        Ok(model) => model,
        Err(e) => {
            eprintln!("Failed to scan project at {}: {}", root.display(), e);
            std::process::exit(1);
        }
    };
    info!(
        "Scanned {} at {}: {} translation units, {} include directories",
        model.id(),
        model.root().display(),
        model.unit_count(),
        model.include_dirs().len()
    );

    let config = build_config(&args)?;
    let fs: Arc<dyn FileSystemTrait> = Arc::new(RealFileSystem);
    let engine = DigestEngine::new(Arc::clone(&fs))?;

    let (index_tx, mut index_rx) = mpsc::channel(INDEX_EVENT_CHANNEL_BUFFER_SIZE);
    let index = SharedIndex::new(MemoryIndex::new()).with_events(index_tx);
    tokio::spawn(async move {
        while let Some(event) = index_rx.recv().await {
            debug!("Index event: {:?}", event);
        }
    });

    let indexer = Indexer::builder(Arc::new(model), index.clone(), Arc::new(engine))
        .config(config)
        .mode(args.mode.into())
        .file_system(fs)
        .build();

    let (task_tx, mut task_rx) = mpsc::channel(TASK_EVENT_CHANNEL_BUFFER_SIZE);
    tokio::spawn(async move {
        while let Some(event) = task_rx.recv().await {
            match event {
                TaskEvent::FileFailed { path, error, .. } => {
                    warn!("{}: {}", path.display(), error)
                }
                TaskEvent::Finished { state, progress, .. } => info!(
                    "Task {}: {} files indexed, {} skipped",
                    state,
                    progress.completed(),
                    progress.skipped
                ),
                other => debug!("Task event: {:?}", other),
            }
        }
    });
    let scheduler = IndexScheduler::new(TaskMonitor::with_sender(task_tx));

    let task = if args.update {
        indexer.update_task(
            UpdateScope::Project,
            UpdateOptions {
                check_content_hash: args.check_hash,
                ..UpdateOptions::default()
            },
        )
    } else {
        indexer.rebuild_task()
    };
    scheduler.enqueue(Arc::clone(&task));
    scheduler.wait_idle().await;

    let statistics = index.read().await?.statistics();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&statistics)?);
    } else {
        println!("{}", statistics.summary());
    }
    info!("{} task finished: {}", task.kind().name(), task.state());

    Ok(())
}
