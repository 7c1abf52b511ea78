//! Binary entry point: loads configuration, starts logging and runs the
//! interactive session until the user says goodbye.

use anyhow::Result;

use jarvis::config::AppConfig;
use jarvis::logging::init_logging;
use jarvis::session::Session;

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let config = AppConfig::load();
    if let Err(err) = init_logging(&config.log_level, config.log_dir.as_deref()) {
        eprintln!("Logging disabled: {err:#}");
    }
    let mut session = Session::from_config(config)?;
    session.greet();
    session.run();
    Ok(())
}
