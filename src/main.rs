use clap::Parser;
use color_eyre::Result;
use std::io;
use things3::{
    ActionLog, Config, Profile,
    cli::Cli,
    commands::{self, App},
    logging,
    things::ThingsChannel,
    utils,
};

fn main() -> Result<()> {
    // Set up error reporting with color-eyre
    color_eyre::install()?;
    logging::init_logging();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Determine profile: --dev flag enables dev mode, otherwise use prod
    let profile = if cli.dev { Profile::Dev } else { Profile::Prod };

    let config = match cli.config.as_deref() {
        Some(path) => Config::load_from(&utils::expand_path(path))?,
        None => Config::load_with_profile(profile)?,
    };

    let action_log = config
        .action_log_path()
        .map(ActionLog::at)
        .or_else(|| ActionLog::default_location(profile).ok());

    let mut stdout = io::stdout().lock();
    let mut stderr = io::stderr().lock();
    let mut channel = ThingsChannel;
    let mut app = App::new(config, &mut stdout, &mut stderr, &mut channel)
        .with_database(cli.db)
        .with_action_log(action_log)
        .with_dry_run(cli.dry_run);

    commands::run(&mut app, cli.command)?;
    Ok(())
}
