use anyhow::Result;
use clap::Parser;

use frpdeck::app::load_settings;
use frpdeck::cli::CommandArgs;

fn main() -> Result<()> {
    let args = CommandArgs::parse();
    let settings = load_settings(args.settings.as_deref())?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(settings.logging.level.as_str()),
    )
    .init();

    frpdeck::run(args, settings)
}
