//! Configuration loaded from environment variables.

use common::RevisionNumberKind;

use crate::telemetry::{LogFormat, TelemetryConfig};
use crate::{CustomRevisionEntityInformation, Result, RevisionEntityInformation, RevisionError};

const DEFAULT_NUMBER_FIELD: &str = "rev";
const DEFAULT_TIMESTAMP_FIELD: &str = "timestamp";

/// Revision repository configuration.
///
/// Reads from environment variables:
/// - `REVISION_ENTITY`: `default` or the name of a custom revision marker (default: `default`)
/// - `REVISION_NUMBER_FIELD`: number field of a custom marker (default: `rev`)
/// - `REVISION_TIMESTAMP_FIELD`: timestamp field of a custom marker (default: `timestamp`)
/// - `REVISION_NUMBER_TYPE`: `i32`, `i64`, `u32` or `u64` (default: `i64` for custom markers)
/// - `DATABASE_URL`: PostgreSQL connection string, if any
/// - `RUST_LOG`: tracing filter directive (default: `info`)
/// - `LOG_FORMAT`: `pretty` or `json` (default: `pretty`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevisionConfig {
    pub revision_entity: RevisionEntityInformation,
    pub database_url: Option<String>,
    pub telemetry: TelemetryConfig,
}

impl RevisionConfig {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let number_kind = lookup("REVISION_NUMBER_TYPE")
            .map(|kind| {
                kind.parse::<RevisionNumberKind>()
                    .map_err(|e| RevisionError::Misconfiguration(e.to_string()))
            })
            .transpose()?;

        let custom_name = lookup("REVISION_ENTITY")
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty() && !name.eq_ignore_ascii_case("default"));

        let revision_entity = match custom_name {
            None => {
                if let Some(kind) = number_kind
                    && kind != RevisionNumberKind::I32
                {
                    return Err(RevisionError::Misconfiguration(format!(
                        "the default revision entity uses i32 revision numbers, not {kind}"
                    )));
                }
                RevisionEntityInformation::Default
            }
            Some(name) => RevisionEntityInformation::Custom(CustomRevisionEntityInformation::new(
                name,
                lookup("REVISION_NUMBER_FIELD").unwrap_or_else(|| DEFAULT_NUMBER_FIELD.to_string()),
                lookup("REVISION_TIMESTAMP_FIELD")
                    .unwrap_or_else(|| DEFAULT_TIMESTAMP_FIELD.to_string()),
                number_kind.unwrap_or(RevisionNumberKind::I64),
            )),
        };

        let format = match lookup("LOG_FORMAT") {
            Some(format) => format.parse::<LogFormat>()?,
            None => LogFormat::default(),
        };

        Ok(Self {
            revision_entity,
            database_url: lookup("DATABASE_URL"),
            telemetry: TelemetryConfig {
                log_level: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
                format,
            },
        })
    }
}
