use asset_rill::{AspectDecoders, Assets, AssetsConfig, PlainText, RawBytes, RawBytesDecoder, StructuredValue, TextDecoder, TomlValueDecoder};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use vfs_rill::{LogicalPath, Vfs};

#[derive(Parser, Debug)]
struct CliArgs
{
    // real directory mounted at assets/
    #[arg(long, default_value = ".")]
    assets_dir: PathBuf,

    #[arg(long, default_value_t = 2)]
    workers: usize,

    // logical paths to load as raw bytes, e.g. assets/textures/wall.png
    paths: Vec<String>,
}

fn main()
{
    let default_log_levels = match cfg!(debug_assertions)
    {
        true => (log::LevelFilter::Warn, log::LevelFilter::Debug),
        false => (log::LevelFilter::Warn, log::LevelFilter::Info),
    };
    colog::basic_builder()
        .filter_level(default_log_levels.0)
        .filter_module("rill", default_log_levels.1)
        .filter_module("asset_rill", default_log_levels.1)
        .filter_module("vfs_rill", default_log_levels.1)
        .parse_default_env()
        .init();

    let args = CliArgs::parse();

    let vfs = Vfs::new();
    vfs.mount_dir("assets", &args.assets_dir);
    vfs.mount_memory("builtin",
    [
        (LogicalPath::new("motd.txt"), Arc::from(&b"rill asset demo"[..])),
        (LogicalPath::new("defaults.toml"), Arc::from(&b"tick_rate = 60"[..])),
    ]);

    let decoders = AspectDecoders::default()
        .add::<RawBytes, _>(RawBytesDecoder)
        .add::<PlainText, _>(TextDecoder)
        .add::<StructuredValue, _>(TomlValueDecoder);

    let assets = Assets::new(decoders, Arc::new(vfs), AssetsConfig { worker_count: args.workers });

    // startup-style blocking loads from the in-memory mount
    match assets.blocking_load::<PlainText>("builtin/motd.txt")
    {
        Ok(motd) => log::info!("motd: {}", motd.0),
        Err(err) => log::error!("motd failed to load: {err}"),
    }
    match assets.blocking_load::<StructuredValue>("builtin/defaults.toml")
    {
        Ok(defaults) => log::info!("defaults: {}", defaults.0),
        Err(err) => log::error!("defaults failed to load: {err}"),
    }

    // async loads, settled by pumping commits as a frame loop would
    let requested: Vec<_> = args.paths.iter()
        .map(|p| (p.clone(), assets.request_aspect::<RawBytes>(p.as_str())))
        .collect();

    while assets.n_to_load() > 0
    {
        assets.pump_commits();
        std::thread::sleep(Duration::from_millis(1));
    }

    for (path, aspect) in &requested
    {
        match aspect.payload()
        {
            Some(bytes) => log::info!("{path}: {} byte(s)", bytes.0.len()),
            None => log::warn!("{path}: {:?}", aspect.error()),
        }
    }

    log::info!("loaded {} job(s) total", assets.total_loaded());
}
