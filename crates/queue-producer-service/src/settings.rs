//! Layered loading of the service configuration.
//!
//! Sources (applied in order, later sources override earlier ones):
//!  1. `/etc/queue-producer/service.yaml`: system-wide defaults
//!  2. `./config/service.yaml`: deployment-local override
//!  3. The file given by `--config-file` / `QP_CONFIG_FILE`
//!  4. Environment variables prefixed `QP__` (double-underscore separator),
//!     e.g. `QP__SERVER__PORT=9090` sets `server.port = 9090`
//!
//! Absent files 1 and 2 are skipped; every configuration field has a default.
//! A missing explicit file, a malformed file or a value that cannot be
//! coerced to its field type is an error.

use queue_producer_api::ServiceConfig;
use std::path::Path;

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;

pub const SYSTEM_CONFIG_FILE: &str = "/etc/queue-producer/service";
pub const LOCAL_CONFIG_FILE: &str = "config/service";
pub const ENV_PREFIX: &str = "QP";

/// Load the service configuration from files and environment
pub fn load_config(explicit_path: Option<&Path>) -> Result<ServiceConfig, config::ConfigError> {
    let mut builder = config::Config::builder()
        .add_source(
            config::File::with_name(SYSTEM_CONFIG_FILE)
                .required(false)
                .format(config::FileFormat::Yaml),
        )
        .add_source(
            config::File::with_name(LOCAL_CONFIG_FILE)
                .required(false)
                .format(config::FileFormat::Yaml),
        );

    if let Some(path) = explicit_path {
        builder = builder.add_source(
            config::File::from(path)
                .required(true)
                .format(config::FileFormat::Yaml),
        );
    }

    builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("producer.reservation_ids"),
        )
        .build()?
        .try_deserialize()
}
