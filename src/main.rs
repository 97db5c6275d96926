use anyhow::{anyhow, bail, Context, Result};
use chrono::{Local, NaiveDateTime, TimeZone, Timelike, Utc};
use clap::{Parser, Subcommand};
use reqwest::Url;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use vk_autopost::config::{self, Config};
use vk_autopost::events::TaskHandle;
use vk_autopost::maintenance;
use vk_autopost::model::{parse_group_id, validate_interval};
use vk_autopost::pause::{PauseGate, PauseState};
use vk_autopost::publish::format_timestamp;
use vk_autopost::state::{PersistedRunState, StateStore};
use vk_autopost::vk::{VkClient, VkService};
use vk_autopost::{EngineEvent, PosterEngine, RunParameters};

const START_FORMAT: &str = "%d.%m.%Y %H:%M";

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upload the photo folder and schedule one postponed post per batch
    Post(PostArgs),
    /// Count postponed posts on the community wall
    Count(Target),
    /// Delete every postponed post on the community wall
    Clear {
        #[command(flatten)]
        target: Target,
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Debug, clap::Args)]
struct Target {
    /// VK access token (defaults to the last one used)
    #[arg(long)]
    token: Option<String>,
    /// Community id; a positive id is negated (defaults to the last one used)
    #[arg(long, allow_hyphen_values = true)]
    group: Option<String>,
}

#[derive(Debug, clap::Args)]
struct PostArgs {
    #[command(flatten)]
    target: Target,
    /// Hours between posts
    #[arg(long, default_value_t = 2)]
    interval: i64,
    /// Folder with the images (defaults to app.photos_dir)
    #[arg(long)]
    dir: Option<PathBuf>,
    /// First post time, "dd.mm.yyyy HH:MM" in local time
    #[arg(long)]
    start: Option<String>,
    /// Photos per post, 1-9 (defaults to the last one used, else 1)
    #[arg(long)]
    batch_size: Option<usize>,
    /// Text of every post
    #[arg(long, default_value = "")]
    caption: String,
    /// Append a random decoration from the config to each post
    #[arg(long)]
    decorate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load_or_default(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    let store = StateStore::new(&cfg.app.state_file);
    let saved = store.load();

    match args.command {
        Command::Post(post) => run_post(&cfg, store, &saved, post).await,
        Command::Count(target) => {
            let (service, group_id) = connect(&cfg, &saved, &target)?;
            let handle = maintenance::spawn_count(service, group_id, cfg.engine_settings());
            drain(handle).await.map(|_| ())
        }
        Command::Clear { target, yes } => {
            if !yes {
                bail!("refusing to delete postponed posts without --yes");
            }
            let (service, group_id) = connect(&cfg, &saved, &target)?;
            let handle = maintenance::spawn_clear(service, group_id, cfg.engine_settings());
            drain(handle).await.map(|_| ())
        }
    }
}

fn resolve_target(saved: &PersistedRunState, target: &Target) -> Result<(String, String)> {
    let token = target
        .token
        .clone()
        .unwrap_or_else(|| saved.token.clone());
    let group = target
        .group
        .clone()
        .or_else(|| saved.group_id.map(|g| g.to_string()))
        .ok_or_else(|| anyhow!("no community id given and none saved; use --group"))?;
    if token.trim().is_empty() {
        bail!("no access token given and none saved; use --token");
    }
    Ok((token, group))
}

fn client(cfg: &Config, token: &str) -> Result<Arc<dyn VkService>> {
    let base = Url::parse(&cfg.vk.api_base).context("invalid vk.api_base")?;
    let client = VkClient::with_base_url(token.to_string(), cfg.vk.api_version.clone(), base)
        .context("cannot create the VK API client")?;
    Ok(Arc::new(client))
}

fn connect(
    cfg: &Config,
    saved: &PersistedRunState,
    target: &Target,
) -> Result<(Arc<dyn VkService>, i64)> {
    let (token, group) = resolve_target(saved, target)?;
    let group_id = parse_group_id(&group)?;
    Ok((client(cfg, &token)?, group_id))
}

fn parse_start(raw: &str) -> Result<i64> {
    let naive = NaiveDateTime::parse_from_str(raw.trim(), START_FORMAT)
        .with_context(|| format!("start time must look like 18.10.2026 14:00, got {:?}", raw))?;
    let local = Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| anyhow!("{:?} does not exist in the local time zone", raw))?;
    Ok(local.timestamp())
}

fn current_minute() -> i64 {
    let now = Local::now();
    now.timestamp() - i64::from(now.second())
}

async fn run_post(
    cfg: &Config,
    store: StateStore,
    saved: &PersistedRunState,
    post: PostArgs,
) -> Result<()> {
    let (token, group) = resolve_target(saved, &post.target)?;
    validate_interval(post.interval)?;
    let interval_seconds = post.interval * 3600;
    let mut start = match post.start.as_deref() {
        Some(raw) => parse_start(raw)?,
        None => saved
            .next_start(interval_seconds)
            .unwrap_or_else(current_minute),
    };
    let now = Utc::now().timestamp();
    if start < now {
        println!(
            "[WARN] {} is already in the past, starting from now",
            format_timestamp(start)
        );
        start = now;
    }

    let dir = post
        .dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(&cfg.app.photos_dir));
    let batch_size = post.batch_size.or(saved.batch_size).unwrap_or(1);
    let params = RunParameters::new(&token, &group, post.interval, dir, start, batch_size)?
        .with_caption(post.caption.clone())
        .with_decorations(post.decorate, cfg.decorations.clone());

    info!(?params, "starting posting run");
    let service = client(cfg, &token)?;
    let engine = PosterEngine::new(params, service, cfg.engine_settings(), store)?;
    spawn_pause_toggler(engine.pause_gate());
    println!("[INFO] press Enter to pause or resume between posts");

    let mut handle = engine.start();
    while let Some(event) = handle.next_event().await {
        match event {
            EngineEvent::Log(line) => println!("{}", line),
            EngineEvent::Progress(t) => println!(
                "[INFO] next run would start at {}",
                format_timestamp(t.saturating_add(interval_seconds))
            ),
            EngineEvent::Count(_) => {}
            EngineEvent::Finished => break,
        }
    }
    let (report, _) = handle.join().await?;
    info!(?report, "posting run done");
    if report.aborted {
        bail!("run aborted after {} scheduled posts", report.posted);
    }
    Ok(())
}

/// Enter on stdin toggles the gate. A plain thread, so a pending read never
/// holds up runtime shutdown.
fn spawn_pause_toggler(gate: PauseGate) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            if line.is_err() {
                break;
            }
            match gate.toggle() {
                PauseState::Paused => {
                    println!("[INFO] pause requested; the current post finishes first")
                }
                PauseState::Running => println!("[INFO] resumed"),
            }
        }
    });
}

async fn drain(mut handle: TaskHandle<Option<u64>>) -> Result<Option<u64>> {
    while let Some(event) = handle.next_event().await {
        match event {
            EngineEvent::Log(line) => println!("{}", line),
            EngineEvent::Count(total) => println!("{}", total),
            EngineEvent::Progress(_) => {}
            EngineEvent::Finished => break,
        }
    }
    let (result, _) = handle.join().await?;
    result
        .map(Some)
        .ok_or_else(|| anyhow!("maintenance action failed"))
}
