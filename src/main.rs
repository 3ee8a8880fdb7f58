// Entrypoint for the CLI application.
// - Keeps `main` small: load the config, create an API client and hand it
//   to the menu loop.
// - A missing or invalid config is fatal: we print a sample and exit
//   non-zero before the menu is ever shown.

use anyhow::Context;
use kualitee_cli::{api::ApiClient, config, logging, ui::main_menu};

fn main() -> anyhow::Result<()> {
    if let Err(e) = logging::init() {
        eprintln!("Warning: file logging disabled: {:#}", e);
    }

    let path = config::resolve_config_path();
    let cfg = match config::load_config(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("Startup failed: {}", e);
            eprintln!("Error: {}", e);
            eprintln!("Create {} with your token and project_id:", config::CONFIG_FILE);
            eprintln!("{}", config::SAMPLE_CONFIG);
            return Err(e).context("Cannot start without a valid configuration");
        }
    };
    tracing::info!(
        "Loaded config from {} (project {}, token {})",
        path.display(),
        cfg.project_id,
        logging::mask_token(&cfg.token)
    );

    let api = ApiClient::from_config(&cfg)?;
    main_menu(&api)?;
    Ok(())
}
