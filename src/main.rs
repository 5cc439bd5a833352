use std::path::PathBuf;

use emberd::config::Config;
use emberd::{logging, server};

fn main() -> anyhow::Result<()> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let cfg = Config::load(config_path.as_deref())?;

    let _guard = logging::init(&cfg.log);

    server::listener::run(&cfg)
}
