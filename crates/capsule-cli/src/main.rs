mod server;

use std::path::{Path, PathBuf};

use std::io::Write;

use anyhow::{Context, Result};
use capsule_core::{DatmReport, NewCapsule, PartialDatm, SearchRequest, Source};
use capsule_store::{CapsuleService, Config, default_config_path};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "capsule", about = "Knowledge capsule store, search and HTTP API")]
struct Cli {
    /// Config file (default: $CAPSULE_DATA_DIR/capsule.toml or ~/.knowledge-capsule/capsule.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Bind host (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Bind port (overrides config and PORT)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Create a capsule
    Create {
        #[arg(long)]
        title: String,

        /// Explicit id (generated when omitted)
        #[arg(long)]
        id: Option<String>,

        #[arg(long)]
        content: Option<String>,

        /// Tag, repeatable
        #[arg(long = "tag")]
        tags: Vec<String>,

        #[arg(long)]
        university: Option<String>,

        #[arg(long)]
        author: Option<String>,

        #[arg(long)]
        date: Option<String>,

        #[arg(long)]
        url: Option<String>,

        #[command(flatten)]
        datm: DatmArgs,
    },

    /// Search capsules, newest first
    Search {
        /// Substring of title or content
        #[arg(long)]
        keyword: Option<String>,

        /// Exact match on the source university
        #[arg(long)]
        university: Option<String>,

        /// Substring of the serialized tag list
        #[arg(long)]
        tags: Option<String>,

        /// Every DATM dimension must be at least this
        #[arg(long)]
        min_datm: Option<f64>,

        #[arg(long)]
        limit: Option<usize>,

        /// Print the full result set as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print one capsule as JSON
    Get {
        id: String,
    },

    /// Score a DATM vector without storing anything
    Datm {
        #[command(flatten)]
        datm: DatmArgs,
    },

    /// Show store statistics
    Stats,

    /// Manage the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args)]
struct DatmArgs {
    #[arg(long)]
    truth: Option<f64>,

    #[arg(long)]
    goodness: Option<f64>,

    #[arg(long)]
    beauty: Option<f64>,

    #[arg(long)]
    intelligence: Option<f64>,
}

impl DatmArgs {
    fn to_partial(&self) -> PartialDatm {
        PartialDatm {
            truth: self.truth,
            goodness: self.goodness,
            beauty: self.beauty,
            intelligence: self.intelligence,
        }
    }
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective config
    Show,
}

fn config_path(cli: &Cli) -> PathBuf {
    cli.config.clone().unwrap_or_else(default_config_path)
}

fn load_config(cli: &Cli) -> Result<Config> {
    let path = config_path(cli);
    let mut config = Config::load(&path)
        .with_context(|| format!("failed to load config {}", path.display()))?;
    config.apply_env(|key| std::env::var(key).ok());
    Ok(config)
}

fn open_service(config: &Config) -> Result<CapsuleService> {
    CapsuleService::open(config).context("failed to open capsule store")
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Serve { host, port } => cmd_serve(&cli, host.as_deref(), *port).await,
        Commands::Create {
            title,
            id,
            content,
            tags,
            university,
            author,
            date,
            url,
            datm,
        } => {
            let mut payload = NewCapsule::new(title);
            payload.id = id.clone();
            payload.content = content.clone();
            payload.tags = (!tags.is_empty()).then(|| tags.clone());
            payload.source = Some(Source {
                university: university.clone(),
                author: author.clone(),
                date: date.clone(),
                url: url.clone(),
            });
            payload.datm = Some(datm.to_partial());
            cmd_create(&cli, payload)
        }
        Commands::Search {
            keyword,
            university,
            tags,
            min_datm,
            limit,
            json,
        } => {
            let request = SearchRequest {
                keyword: keyword.clone(),
                university: university.clone(),
                tags: tags.clone(),
                min_datm: *min_datm,
                limit: *limit,
            };
            cmd_search(&cli, &request, *json)
        }
        Commands::Get { id } => cmd_get(&cli, id),
        Commands::Datm { datm } => cmd_datm(&cli, &datm.to_partial()),
        Commands::Stats => cmd_stats(&cli),
        Commands::Config { action } => match action {
            ConfigAction::Init { force } => cmd_config_init(&cli, *force),
            ConfigAction::Show => cmd_config_show(&cli),
        },
    }
}

// ---------------------------------------------------------------------------
// Advisory pidfile for observability
// ---------------------------------------------------------------------------

fn pidfile_path(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("capsule-serve.pid")
}

/// Advisory pidfile for a running `serve`. Removed when dropped.
struct Pidfile {
    path: PathBuf,
}

impl Pidfile {
    /// Record this process at `path`. A pidfile left by a dead process is
    /// replaced; a live one only gets a warning, since the second server
    /// fails at bind if it targets the same address.
    fn acquire(path: PathBuf) -> Option<Self> {
        let previous = std::fs::read_to_string(&path)
            .ok()
            .and_then(|content| content.trim().parse::<u32>().ok())
            .filter(|&pid| pid != 0);
        match previous {
            Some(pid) if is_process_alive(pid) => {
                tracing::warn!("capsule serve PID {pid} is already running from this data directory");
            }
            Some(pid) => tracing::info!("replacing stale pidfile left by PID {pid}"),
            None => {}
        }

        let written = path
            .parent()
            .map_or(Ok(()), std::fs::create_dir_all)
            .and_then(|()| std::fs::File::create(&path))
            .and_then(|mut f| write!(f, "{}", std::process::id()));
        match written {
            Ok(()) => {
                tracing::debug!("pidfile {}", path.display());
                Some(Self { path })
            }
            Err(e) => {
                tracing::warn!("could not write pidfile {}: {e}", path.display());
                None
            }
        }
    }
}

impl Drop for Pidfile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::debug!("pidfile {} not removed: {e}", self.path.display());
        }
    }
}

#[cfg(unix)]
fn is_process_alive(pid: u32) -> bool {
    // kill with signal 0 delivers nothing; it only reports whether the PID exists
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
fn is_process_alive(_pid: u32) -> bool {
    false
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_serve(cli: &Cli, host: Option<&str>, port: Option<u16>) -> Result<()> {
    let mut config = load_config(cli)?;
    if let Some(host) = host {
        config.server.host = host.to_string();
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    let service = open_service(&config)?;
    tracing::info!("serving capsules from {}", config.db_path().display());

    let _pidfile = Pidfile::acquire(pidfile_path(&config_path(cli)));
    server::serve(service, &config.bind_addr()).await
}

fn cmd_create(cli: &Cli, payload: NewCapsule) -> Result<()> {
    let config = load_config(cli)?;
    let service = open_service(&config)?;
    let id = service
        .create_capsule(payload)
        .context("failed to create capsule")?;
    println!("created {id}");
    Ok(())
}

fn cmd_search(cli: &Cli, request: &SearchRequest, json: bool) -> Result<()> {
    let config = load_config(cli)?;
    let service = open_service(&config)?;
    let found = service
        .search_capsules(request)
        .context("failed to search capsules")?;

    if json {
        let out = serde_json::to_string_pretty(&found).context("failed to serialize results")?;
        println!("{out}");
        return Ok(());
    }

    for capsule in &found.results {
        println!(
            "{}  {} {:.2}  {}",
            capsule.id,
            capsule.datm.grade(),
            capsule.overall(),
            capsule.title
        );
    }
    println!("{} capsule(s)", found.count);
    Ok(())
}

fn cmd_get(cli: &Cli, id: &str) -> Result<()> {
    let config = load_config(cli)?;
    let service = open_service(&config)?;
    let capsule = service.get_capsule(id).context("failed to get capsule")?;
    let out = serde_json::to_string_pretty(&capsule).context("failed to serialize capsule")?;
    println!("{out}");
    Ok(())
}

fn cmd_datm(cli: &Cli, partial: &PartialDatm) -> Result<()> {
    let config = load_config(cli)?;
    let report = DatmReport::compute(partial, config.datm.zero_score);
    let d = report.datm;
    println!(
        "datm:     truth={} goodness={} beauty={} intelligence={}",
        d.truth, d.goodness, d.beauty, d.intelligence
    );
    println!("overall:  {}", report.overall);
    println!("grade:    {}", report.grade);
    Ok(())
}

fn cmd_stats(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let service = open_service(&config)?;
    let store = service.store();

    let count = store.count().context("failed to count capsules")?;
    let db_size = store.db_size().context("failed to read database size")?;
    let schema = store
        .schema_version()
        .context("failed to read schema version")?
        .map_or_else(|| "none".to_string(), |v| format!("v{v}"));

    println!("capsules:  {count}");
    println!("schema:    {schema}");
    println!("db_size:   {:.1}MB", db_size as f64 / (1024.0 * 1024.0));
    println!("db_path:   {}", config.db_path().display());
    Ok(())
}

fn cmd_config_init(cli: &Cli, force: bool) -> Result<()> {
    let path = config_path(cli);
    if path.exists() && !force {
        anyhow::bail!(
            "config already exists at {} (use --force to overwrite)",
            path.display()
        );
    }
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    Config::for_base(base)
        .save(&path)
        .with_context(|| format!("failed to write config {}", path.display()))?;
    println!("wrote {}", path.display());
    Ok(())
}

fn cmd_config_show(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let out = toml::to_string_pretty(&config).context("failed to serialize config")?;
    println!("# {}", config_path(cli).display());
    print!("{out}");
    Ok(())
}
