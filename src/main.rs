//! rsfilterset 命令行入口

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use rsfilterset::{
    load_session, save_session, AlwaysReload, AutoImportDir, ConfigManager, FilterConfig,
    FilterSession, FsCatalogStorage, JsonFileSettingsStore, NeverReload, ReloadPrompt, RuleStatus,
};

#[derive(Parser, Debug)]
#[command(name = "rsfilterset", version, about = "Log line highlighting filters")]
struct Cli {
    /// 键值存储文件
    #[arg(long, global = true)]
    settings: Option<PathBuf>,
    /// 目录文件在磁盘上变化时的处理方式
    #[arg(long, global = true, value_enum, default_value_t = ReloadMode::Ask)]
    reload: ReloadMode,
    #[arg(short, long, global = true, action = clap::ArgAction::SetTrue)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReloadMode {
    Always,
    Never,
    Ask,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 对日志文件逐行求值，`-` 表示标准输入
    Match { log: PathBuf },
    /// 列出工作集与已加载的目录
    List,
    /// 导入目录文件
    Import {
        file: PathBuf,
        /// 同时激活目录中的全部规则
        #[arg(long)]
        activate: bool,
    },
    /// 删除目录及其已激活的规则
    RemoveCatalog { id: usize },
    /// 将工作集规则导出为目录文件（默认全部）
    Export { file: PathBuf, positions: Vec<usize> },
    /// 加载并以当前格式写回（迁移旧版数据）
    Migrate,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn ask_on_terminal(file_identity: &str) -> bool {
    eprint!("Filter file {} changed on disk, reload it? [y/N] ", file_identity);
    let _ = io::stderr().flush();
    let mut answer = String::new();
    io::stdin().read_line(&mut answer).is_ok()
        && matches!(answer.trim(), "y" | "Y" | "yes" | "Yes")
}

fn build_config(cli: &Cli) -> FilterConfig {
    let mut builder = ConfigManager::custom().verbose(cli.verbose);
    if let Some(settings) = &cli.settings {
        builder = builder.settings_path(settings.clone());
    }
    builder.build()
}

fn print_session(session: &FilterSession) {
    println!("Filters:");
    for (index, rule) in session.working_set().iter().enumerate() {
        let status = match session.rule_status(index) {
            Ok(RuleStatus::Local) | Err(_) => " ",
            Ok(RuleStatus::Loaded) => "L",
            Ok(RuleStatus::Modified) => "M",
        };
        println!("  {:>3} {} {}", index, status, rule);
    }

    println!("Filter sets:");
    for (catalog_id, catalog) in session.registry().iter().enumerate() {
        let changed = session.catalog_has_changes(catalog_id).unwrap_or(false);
        println!(
            "  {:>3} {}{}{}",
            catalog_id,
            catalog.file_identity,
            if catalog.is_missing { " (missing)" } else { "" },
            if changed { " (modified)" } else { "" },
        );
        let active = session.active_offsets(catalog_id).unwrap_or_default();
        for (offset, rule) in catalog.rules.iter().enumerate() {
            let marker = if active.contains(&offset) { "*" } else { " " };
            println!("      {:>3} {} {}", offset, marker, rule);
        }
    }
}

fn run_match(session: &FilterSession, log: &Path) -> Result<()> {
    let reader: Box<dyn BufRead> = if log.as_os_str() == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let file = File::open(log).with_context(|| format!("cannot open {}", log.display()))?;
        Box::new(BufReader::new(file))
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for line in reader.lines() {
        let line = line?;
        match session.working_set().evaluate(&line) {
            Some((fore, back)) => writeln!(out, "{}/{}\t{}", fore, back, line)?,
            None => writeln!(out, "-\t{}", line)?,
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = build_config(&cli);
    let auto_import = AutoImportDir::from_config(&config);
    let storage = FsCatalogStorage::new();
    let mut store = JsonFileSettingsStore::open(&config.settings_path)
        .with_context(|| format!("cannot open settings {}", config.settings_path.display()))?;

    let prompt: &dyn ReloadPrompt = match cli.reload {
        ReloadMode::Always => &AlwaysReload,
        ReloadMode::Never => &NeverReload,
        ReloadMode::Ask => &ask_on_terminal,
    };
    let mut session = load_session(
        &mut store,
        &storage,
        auto_import.as_ref(),
        prompt,
        config.equivalence,
    );
    debug!("Using settings {}", config.settings_path.display());

    let modified = match &cli.command {
        Command::Match { log } => {
            run_match(&session, log)?;
            false
        }
        Command::List => {
            print_session(&session);
            false
        }
        Command::Import { file, activate } => {
            let identity = file.to_string_lossy().to_string();
            let catalog_id = session.import_catalog(&storage, &identity)?;
            if *activate {
                for offset in session.available_offsets(catalog_id)? {
                    session.activate(catalog_id, offset)?;
                }
            }
            info!("Imported {} as filter set {}", identity, catalog_id);
            true
        }
        Command::RemoveCatalog { id } => {
            let catalog = session.remove_catalog(*id)?;
            info!("Removed filter set {}", catalog.file_identity);
            true
        }
        Command::Export { file, positions } => {
            let positions: Vec<usize> = if positions.is_empty() {
                (0..session.working_set().len()).collect()
            } else {
                positions.clone()
            };
            let identity = file.to_string_lossy().to_string();
            let written = session.export_rules(&storage, &positions, &identity)?;
            info!("Exported {} filters to {}", written, identity);
            false
        }
        Command::Migrate => true,
    };

    if modified || session.registry_needs_save() {
        save_session(&mut store, &mut session, auto_import.as_ref())?;
    }
    Ok(())
}
