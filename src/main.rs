//! tupgraph - keeps a build graph in step with the filesystem.
//!
//! Usage:
//!   tupg sync [PATH]         Scan a project and record pending work
//!   tupg resolve PATH        Resolve a path against the stored graph
//!   tupg show                List every tracked entity
//!   tupg gc                  Reclaim unreferenced ghosts and groups
//!   tupg --help              Show help

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, eyre};
use jwalk::WalkDir;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use tupgraph_sync::{
    EntityId, EntityKind, FileTracker, MemoryStore, Mtime, NodeStore, Resolution, ResolveMode,
    TrackerConfig, Variant, WorkList,
};

/// State file written into the project root when `--state` is not given.
const DEFAULT_STATE_FILE: &str = ".tupgraph.json";

#[derive(Parser)]
#[command(
    name = "tupgraph",
    version,
    about = "Keep a build graph consistent with the filesystem",
    long_about = "tupgraph tracks files, directories, commands and ghosts of a \
                  file-based build, and records which directories must be \
                  re-parsed and which commands must re-run after changes.\n\n\
                  Run `tupg sync` in a project to update the stored graph."
)]
struct Cli {
    /// Log every graph decision
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a project and ingest every change since the last sync
    Sync {
        /// Project root
        #[arg(default_value = ".")]
        path: PathBuf,

        /// State file (defaults to .tupgraph.json in the project root)
        #[arg(short, long)]
        state: Option<PathBuf>,

        /// Out-of-tree variant directory, relative to the project root.
        /// Its directories are linked to the source directories they mirror.
        #[arg(long = "variant")]
        variants: Vec<String>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Resolve a path against the stored graph
    Resolve {
        /// Path to resolve, relative to the project root or absolute
        path: String,

        /// Project root
        #[arg(short = 'C', long, default_value = ".")]
        root: PathBuf,

        /// State file (defaults to .tupgraph.json in the project root)
        #[arg(short, long)]
        state: Option<PathBuf>,

        /// What to do with missing components
        #[arg(short, long, default_value = "forbidden")]
        mode: Mode,

        /// Track paths outside the project
        #[arg(long)]
        full_deps: bool,
    },

    /// List every tracked entity
    Show {
        /// Project root
        #[arg(short = 'C', long, default_value = ".")]
        root: PathBuf,

        /// State file (defaults to .tupgraph.json in the project root)
        #[arg(short, long)]
        state: Option<PathBuf>,
    },

    /// Reclaim ghosts and groups nothing refers to
    Gc {
        /// Project root
        #[arg(short = 'C', long, default_value = ".")]
        root: PathBuf,

        /// State file (defaults to .tupgraph.json in the project root)
        #[arg(short, long)]
        state: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Forbidden,
    IgnoreDirs,
    CreateDirs,
}

impl From<Mode> for ResolveMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Forbidden => ResolveMode::Forbidden,
            Mode::IgnoreDirs => ResolveMode::IgnoreDirs,
            Mode::CreateDirs => ResolveMode::CreateDirs,
        }
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Sync {
            path,
            state,
            variants,
            format,
        } => run_sync(&path, state, &variants, format),
        Command::Resolve {
            path,
            root,
            state,
            mode,
            full_deps,
        } => run_resolve(&root, state, &path, mode.into(), full_deps),
        Command::Show { root, state } => run_show(&root, state),
        Command::Gc { root, state } => run_gc(&root, state),
    }
}

/// Install the log subscriber. `RUST_LOG` wins over `--verbose`.
fn init_logging(verbose: bool) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Scan the project, ingest everything, and report pending work.
fn run_sync(path: &Path, state: Option<PathBuf>, variants: &[String], format: OutputFormat) -> Result<()> {
    let root = path.canonicalize().context("Invalid path")?;
    let state_path = state.unwrap_or_else(|| root.join(DEFAULT_STATE_FILE));
    let mut tracker = open_tracker(&root, &state_path, false)?;

    for dir in variants {
        let id = tracker
            .resolve_path(EntityId::PROJECT_ROOT, dir, ResolveMode::IgnoreDirs, false)?
            .id()
            .ok_or_else(|| eyre!("Variant directory '{dir}' is not inside the project"))?;
        tracker.store_mut().add_variant(Variant::shadow(dir.as_str(), id));
    }

    eprintln!("Scanning {}...", root.display());
    let seen = scan_project(&mut tracker, &root, &state_path)?;
    // Shadow directories can be scanned before their sources
    for &id in &seen {
        tracker.link_shadow_source(id)?;
    }
    let removed = reconcile(&mut tracker, &seen)?;
    debug!(seen = seen.len(), removed, "Scan finished");

    let warnings = tracker.take_warnings();
    let create = entity_paths(&tracker, WorkList::Create);
    let modify = entity_paths(&tracker, WorkList::Modify);
    let config = entity_paths(&tracker, WorkList::Config);

    match format {
        OutputFormat::Text => {
            println!();
            println!("{}", "─".repeat(60));
            println!(" {}", root.display());
            println!(" {} entities tracked, {} missing", tracker.store().len(), removed);
            println!("{}", "─".repeat(60));
            print_list("Re-parse", &create);
            print_list("Re-check", &modify);
            print_list("Re-import", &config);

            if !warnings.is_empty() {
                println!();
                println!("{} warning(s) during sync", warnings.len());
            }
        }
        OutputFormat::Json => {
            let report = serde_json::json!({
                "root": root,
                "create": create,
                "modify": modify,
                "config": config,
                "warnings": warnings,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    save_store(tracker.store(), &state_path)
}

/// Walk the project in sorted order, observing every entry.
///
/// Returns the ids of everything found on disk.
fn scan_project(
    tracker: &mut FileTracker<MemoryStore>,
    root: &Path,
    state_path: &Path,
) -> Result<HashSet<EntityId>> {
    let mut dirs: HashMap<PathBuf, EntityId> = HashMap::from([(root.to_path_buf(), EntityId::PROJECT_ROOT)]);
    let mut seen = HashSet::from([EntityId::PROJECT_ROOT]);

    let walker = WalkDir::new(root).sort(true).skip_hidden(true).min_depth(1);

    for entry_result in walker {
        let entry = match entry_result {
            Ok(e) => e,
            Err(err) => {
                warn!(error = %err, "Skipping unreadable entry");
                continue;
            }
        };

        let path = entry.path();
        if path == state_path {
            continue;
        }
        let Some(dir) = path.parent().and_then(|p| dirs.get(p)).copied() else {
            continue;
        };
        let name = entry.file_name().to_string_lossy().to_string();

        if entry.file_type().is_dir() {
            let observed = tracker.observe_dir(dir, &name)?;
            dirs.insert(path, observed.id);
            seen.insert(observed.id);
            continue;
        }

        let modified = match entry.metadata() {
            Ok(meta) => meta.modified(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Skipping entry without metadata");
                continue;
            }
        };
        let Some(mtime) = entry_mtime(&path, modified) else {
            continue;
        };
        let observed = tracker.observe_change(dir, &name, mtime, false, false)?;
        seen.insert(observed.id);
    }

    Ok(seen)
}

/// Convert a modification time read during the scan, warning when the
/// platform could not provide one.
fn entry_mtime(path: &Path, modified: std::io::Result<SystemTime>) -> Option<Mtime> {
    match modified {
        Ok(time) => Some(Mtime::from(time)),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Skipping entry without modification time");
            None
        }
    }
}

/// Hand every tracked entity the scan did not find to deletion.
///
/// Only the topmost missing entity of a subtree is reconciled; deleting a
/// directory takes care of what is below it.
fn reconcile(tracker: &mut FileTracker<MemoryStore>, seen: &HashSet<EntityId>) -> Result<usize> {
    let missing: Vec<EntityId> = tracker
        .store()
        .entities()
        .filter(|e| {
            matches!(
                e.kind,
                EntityKind::File | EntityKind::Dir | EntityKind::GeneratedFile | EntityKind::GeneratedDir
            )
        })
        .filter(|e| !seen.contains(&e.id))
        .filter(|e| e.parent.is_some_and(|p| seen.contains(&p)))
        .map(|e| e.id)
        .collect();

    for &id in &missing {
        if tracker.store().contains(id) {
            tracker.reconcile_missing(id)?;
        }
    }
    Ok(missing.len())
}

/// Resolve a single path and describe the result.
fn run_resolve(
    root: &Path,
    state: Option<PathBuf>,
    path: &str,
    mode: ResolveMode,
    full_deps: bool,
) -> Result<()> {
    let root = root.canonicalize().context("Invalid path")?;
    let state_path = state.unwrap_or_else(|| root.join(DEFAULT_STATE_FILE));
    let mut tracker = open_tracker(&root, &state_path, full_deps)?;

    match tracker.resolve_path(EntityId::PROJECT_ROOT, path, mode, full_deps)? {
        Resolution::Found(id) => {
            let entity = tracker
                .store()
                .get(id)?
                .ok_or_else(|| eyre!("Entity {id} vanished"))?;
            println!(
                "{} {} {} (mtime {})",
                entity.id,
                entity.kind,
                tracker.entity_path(id)?,
                entity.mtime
            );
        }
        Resolution::NoMatch => println!("no match"),
        Resolution::AboveRoot => println!("above the project root"),
    }

    if !matches!(mode, ResolveMode::Forbidden) {
        save_store(tracker.store(), &state_path)?;
    }
    Ok(())
}

/// Print every tracked entity.
fn run_show(root: &Path, state: Option<PathBuf>) -> Result<()> {
    let root = root.canonicalize().context("Invalid path")?;
    let state_path = state.unwrap_or_else(|| root.join(DEFAULT_STATE_FILE));
    let tracker = open_tracker(&root, &state_path, false)?;

    for entity in tracker.store().entities() {
        println!(
            "{:>6} {:<14} {:<20} {}",
            entity.id,
            entity.kind,
            entity.mtime,
            tracker.entity_path(entity.id)?
        );
    }
    Ok(())
}

/// Run the ghost collection pass.
fn run_gc(root: &Path, state: Option<PathBuf>) -> Result<()> {
    let root = root.canonicalize().context("Invalid path")?;
    let state_path = state.unwrap_or_else(|| root.join(DEFAULT_STATE_FILE));
    let mut tracker = open_tracker(&root, &state_path, false)?;

    let reclaimed = tracker.store_mut().reclaim_ghosts();
    println!("Reclaimed {reclaimed} entities");
    save_store(tracker.store(), &state_path)
}

fn open_tracker(root: &Path, state_path: &Path, full_deps: bool) -> Result<FileTracker<MemoryStore>> {
    let config = TrackerConfig::builder()
        .project_root(root)
        .full_deps(full_deps)
        .build()
        .context("Invalid configuration")?;
    Ok(FileTracker::new(load_store(state_path)?, config))
}

fn load_store(state_path: &Path) -> Result<MemoryStore> {
    if !state_path.exists() {
        return Ok(MemoryStore::new());
    }
    let json = fs::read_to_string(state_path)
        .with_context(|| format!("Failed to read {}", state_path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Corrupt state file {}", state_path.display()))
}

fn save_store(store: &MemoryStore, state_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(store)?;
    fs::write(state_path, json).with_context(|| format!("Failed to write {}", state_path.display()))
}

/// Paths of the entities on a work list.
fn entity_paths(tracker: &FileTracker<MemoryStore>, list: WorkList) -> Vec<String> {
    tracker
        .store()
        .queued(list)
        .into_iter()
        .map(|id| {
            tracker
                .entity_path(id)
                .unwrap_or_else(|_| format!("<entity {id}>"))
        })
        .collect()
}

fn print_list(title: &str, paths: &[String]) {
    println!();
    println!(" {} ({})", title, paths.len());
    for path in paths {
        println!("   {path}");
    }
}
