mod app;
mod config;

use crate::app::App;
use crate::config::{DEFAULT_CONFIG_PATH, ViewerConfig};
use std::path::{Path, PathBuf};
use vista_runtime::Graphics;
use winit::event_loop::{DeviceEvents, EventLoop};

fn run_app(event_loop: EventLoop<Graphics>, mut app: App) {
    if let Err(err) = event_loop.run_app(&mut app) {
        log::error!("event loop stopped: {err}");
    }
}

fn main() {
    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let loaded = ViewerConfig::load(&config_path);
    let filter = match &loaded {
        Ok(Some(cfg)) => cfg.logging.filter.clone(),
        _ => ViewerConfig::default().logging.filter,
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let config = match loaded {
        Ok(Some(cfg)) => {
            log::info!("loaded {}", config_path.display());
            cfg
        }
        Ok(None) => {
            log::warn!("{} not found, using defaults", config_path.display());
            ViewerConfig::default()
        }
        Err(err) => {
            match std::error::Error::source(&err) {
                Some(source) => log::error!("{err}: {source}"),
                None => log::error!("{err}"),
            }
            std::process::exit(1);
        }
    };
    let base_dir = config_path.parent().unwrap_or(Path::new("."));
    let setup = config.runtime_setup(base_dir);

    let event_loop = match EventLoop::<Graphics>::with_user_event().build() {
        Ok(event_loop) => event_loop,
        Err(err) => {
            log::error!("could not create event loop: {err}");
            std::process::exit(1);
        }
    };
    event_loop.listen_device_events(DeviceEvents::Always);

    let app = App::new(&event_loop, &config.window, setup);
    run_app(event_loop, app);
}
