mod settings;

use config::{Config, Environment, File};

use crate::utils::error::RelayError;
use settings::PartialSettings;

pub use settings::{LogSettings, RelaySettings, ServerSettings, Settings};

/// Prefix for environment overrides, e.g. `CHATRELAY_SERVER__PORT=9000`.
pub const ENV_PREFIX: &str = "CHATRELAY";

/// Loads the configuration from the default file, a `.env` file and environment variables.
/// Whatever is missing falls back to `Settings::default()`.
pub fn load_config() -> Result<Settings, RelayError> {
    // .env is optional; variables already set in the environment win
    let _ = dotenvy::dotenv();

    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(Settings::merged(partial))
}
