use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use log::{error, info};

use playlist_curator::catalog::{load_catalog, save_catalog, CatalogLock};
use playlist_curator::config::{
    default_config_path, load_or_create_config, write_default_config, Config,
};
use playlist_curator::mosaic::{compose_mosaic, save_banner, AreaHeuristicLayout};
use playlist_curator::remote::{MetadataSource, YoutubeClient};
use playlist_curator::sync::{SyncEngine, SyncOptions};
use playlist_curator::tags::TagPolicy;
use playlist_curator::thumbnails::DirThumbnailCache;

type AppResult<T> = Result<T, Box<dyn std::error::Error>>;

fn cli() -> Command {
    Command::new("playlist-curator")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Catalogs a video playlist, caches thumbnails, and composes a mosaic banner")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Path to config.toml (defaults to the user config directory)"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Enable debug logging"),
        )
        .subcommand(
            Command::new("sync")
                .about("Reconcile the catalog and thumbnail cache with the playlist")
                .arg(
                    Arg::new("playlist")
                        .long("playlist")
                        .help("Playlist URL (overrides source.playlist_url)"),
                ),
        )
        .subcommand(Command::new("mosaic").about("Compose the banner from cached thumbnails"))
        .subcommand(
            Command::new("run")
                .about("Sync, then compose the banner")
                .arg(
                    Arg::new("playlist")
                        .long("playlist")
                        .help("Playlist URL (overrides source.playlist_url)"),
                ),
        )
        .subcommand(
            Command::new("init-config")
                .about("Write the default configuration file")
                .arg(
                    Arg::new("force")
                        .long("force")
                        .action(ArgAction::SetTrue)
                        .help("Overwrite an existing file"),
                ),
        )
}

fn config_path(matches: &ArgMatches) -> AppResult<PathBuf> {
    match matches.get_one::<PathBuf>("config") {
        Some(path) => Ok(path.clone()),
        None => Ok(default_config_path()?),
    }
}

fn run_sync(config: &Config, playlist_override: Option<&String>) -> AppResult<()> {
    let playlist_url = playlist_override
        .cloned()
        .unwrap_or_else(|| config.source.playlist_url.clone());
    if playlist_url.trim().is_empty() {
        return Err("no playlist URL: set source.playlist_url or pass --playlist".into());
    }

    let tag_policy = TagPolicy::from_config(&config.tags)?;
    let _lock = CatalogLock::acquire(&config.catalog.path)?;
    let mut store = load_catalog(&config.catalog.path)?;
    let mut thumbnails = DirThumbnailCache::open(&config.thumbnails.dir).map_err(|err| {
        format!(
            "Failed to open thumbnail cache {}: {}",
            config.thumbnails.dir.display(),
            err
        )
    })?;

    let client = YoutubeClient::new(&config.source);
    info!("Fetching playlist {playlist_url}");
    let video_ids = client.fetch_playlist_video_ids(&playlist_url)?;
    info!("Playlist has {} videos", video_ids.len());

    let options = SyncOptions {
        thumbnail_url_template: config.thumbnails.url_template.clone(),
        placeholder_max_bytes: config.thumbnails.placeholder_max_bytes,
        request_delay: Duration::from_millis(config.source.request_delay_ms),
        rights: config.catalog.rights.clone(),
        rights_statement: config.catalog.rights_statement.clone(),
        addition_date: chrono::Local::now().format("%Y-%m-%d").to_string(),
    };
    let outcome = SyncEngine::new(&client, &client, &mut thumbnails, &tag_policy, options)
        .sync(&video_ids, &mut store);

    // Records appended before a cache write failure are kept.
    save_catalog(&config.catalog.path, &store)?;
    let report = outcome?;
    report.log_summary();
    Ok(())
}

fn run_mosaic(config: &Config) -> AppResult<()> {
    let thumbnails = DirThumbnailCache::open(&config.thumbnails.dir).map_err(|err| {
        format!(
            "Failed to open thumbnail cache {}: {}",
            config.thumbnails.dir.display(),
            err
        )
    })?;
    let images = thumbnails.load_images();
    info!(
        "Composing {}x{} banner from {} thumbnails",
        config.banner.width,
        config.banner.height,
        images.len()
    );
    let banner = compose_mosaic(
        &images,
        config.banner.width,
        config.banner.height,
        &AreaHeuristicLayout,
    );
    save_banner(&banner, &config.banner.path)?;
    Ok(())
}

fn run_init_config(matches: &ArgMatches, path: &Path) -> AppResult<()> {
    if path.exists() && !matches.get_flag("force") {
        return Err(format!(
            "config already exists at {}; pass --force to overwrite",
            path.display()
        )
        .into());
    }
    write_default_config(path)?;
    info!("Default config written. path={}", path.display());
    Ok(())
}

fn dispatch(matches: &ArgMatches) -> AppResult<()> {
    let path = config_path(matches)?;
    let Some((command, args)) = matches.subcommand() else {
        return Ok(());
    };
    if command == "init-config" {
        return run_init_config(args, &path);
    }

    let config = load_or_create_config(&path)?;
    match command {
        "sync" => run_sync(&config, args.get_one::<String>("playlist")),
        "mosaic" => run_mosaic(&config),
        "run" => {
            run_sync(&config, args.get_one::<String>("playlist"))?;
            run_mosaic(&config)
        }
        other => Err(format!("unknown command {other}").into()),
    }
}

fn main() {
    let matches = cli().get_matches();

    let mut clog = colog::default_builder();
    clog.filter(
        None,
        if matches.get_flag("verbose") {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        },
    );
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    if let Err(err) = dispatch(&matches) {
        error!("{err}");
        std::process::exit(1);
    }
}
