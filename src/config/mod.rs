mod settings;

use crate::config::settings::PartialSettings;
use config::{Config, ConfigError, Environment, File};

pub use settings::{BrokerSettings, LogSettings, Settings, MAX_CHANNEL_CAPACITY};

/// Prefix for environment overrides, e.g. `SSEHUB_BROKER__INBOUND_CAPACITY=128`.
pub const ENV_PREFIX: &str = "SSEHUB";

/// Loads the configuration from `config/default`, a `.env` file and
/// environment variables, merged over `Settings::default()`.
///
/// Fails when a channel capacity exceeds [`MAX_CHANNEL_CAPACITY`].
pub fn load_config() -> Result<Settings, ConfigError> {
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

    let settings = merge(partial, Settings::default());
    validate(&settings)?;
    Ok(settings)
}

fn validate(settings: &Settings) -> Result<(), ConfigError> {
    let capacities = [
        ("broker.inbound_capacity", settings.broker.inbound_capacity),
        ("broker.subscriber_capacity", settings.broker.subscriber_capacity),
    ];
    for (key, value) in capacities {
        if value > MAX_CHANNEL_CAPACITY {
            return Err(ConfigError::Message(format!(
                "{key} = {value} exceeds the maximum of {MAX_CHANNEL_CAPACITY}"
            )));
        }
    }
    Ok(())
}

fn merge(partial: PartialSettings, default: Settings) -> Settings {
    let broker = partial.broker;
    let log = partial.log;

    Settings {
        broker: BrokerSettings {
            inbound_capacity: broker
                .as_ref()
                .and_then(|b| b.inbound_capacity)
                .unwrap_or(default.broker.inbound_capacity),
            subscriber_capacity: broker
                .as_ref()
                .and_then(|b| b.subscriber_capacity)
                .unwrap_or(default.broker.subscriber_capacity),
            delivery_timeout_ms: broker
                .as_ref()
                .and_then(|b| b.delivery_timeout_ms)
                .unwrap_or(default.broker.delivery_timeout_ms),
            strict_serialization: broker
                .as_ref()
                .and_then(|b| b.strict_serialization)
                .unwrap_or(default.broker.strict_serialization),
        },
        log: LogSettings {
            level: log
                .and_then(|l| l.level)
                .unwrap_or(default.log.level),
        },
    }
}
