use crate::{models::access::AccessType, services::validator::AccessPolicy};
use anyhow::{Context, Result, bail};
use axum::http::HeaderName;
use clap::{Parser, Subcommand};
use std::{env, str::FromStr, time::Duration};
use uuid::Uuid;

/// Longest default lifetime accepted for signed links (ten years).
pub const MAX_SIGNED_TTL_MINUTES: i64 = 10 * 366 * 24 * 60;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments; built once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub base_url: String,
    pub prefix: String,
    pub signed_prefix: String,
    pub signed_enabled: bool,
    pub signing_secret: String,
    pub default_ttl_minutes: i64,
    pub require_auth: bool,
    pub strict: bool,
    pub cache_max_age_secs: u64,
    pub chunk_size: usize,
    /// Request header trusted to carry the principal id. Unset means only
    /// principals placed in the request extensions are honoured.
    pub principal_header: Option<String>,
    pub request_timeout_secs: u64,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Authorized media delivery with signed links")]
pub struct Args {
    /// Host to bind to (overrides MEDIA_GATE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides MEDIA_GATE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Root for relative media paths (overrides MEDIA_GATE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides MEDIA_GATE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Public base URL used when printing links (overrides MEDIA_GATE_BASE_URL)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print a signed URL for a media id and exit
    Sign {
        /// view, download or stream
        #[arg(long)]
        access: AccessType,

        #[arg(long)]
        id: Uuid,

        /// Minutes until expiry (defaults to MEDIA_GATE_SIGNED_TTL_MINUTES)
        #[arg(long, allow_hyphen_values = true)]
        minutes: Option<i64>,
    },
}

/// What the binary was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Serve,
    Migrate,
    Sign {
        access: AccessType,
        id: Uuid,
        minutes: Option<i64>,
    },
}

impl AppConfig {
    /// Defaults for everything except the signing secret.
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            storage_dir: "./data/media".into(),
            database_url: "sqlite://./data/meta/media_gate.db".into(),
            base_url: "http://localhost:3000".into(),
            prefix: "media".into(),
            signed_prefix: "media-signed".into(),
            signed_enabled: true,
            signing_secret: secret.into(),
            default_ttl_minutes: 60,
            require_auth: true,
            strict: true,
            cache_max_age_secs: 3600,
            chunk_size: 8 * 1024,
            principal_header: None,
            request_timeout_secs: 30,
        }
    }

    /// Parse environment variables + CLI args into AppConfig and the run mode.
    pub fn from_env_and_args() -> Result<(Self, Mode)> {
        // Parse CLI once
        let args = Args::parse();
        Self::resolve(args, |key| env::var(key).ok())
    }

    /// Merge parsed arguments over values from `lookup` (the environment in
    /// production), then validate.
    pub fn resolve(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<(Self, Mode)> {
        let defaults = Self::with_secret(String::new());

        // --- Environment fallback ---
        let env_string = |key: &str, default: String| lookup(key).unwrap_or(default);

        let signing_secret = lookup("MEDIA_GATE_SIGNING_SECRET").unwrap_or_default();

        let cfg = Self {
            host: args
                .host
                .unwrap_or_else(|| env_string("MEDIA_GATE_HOST", defaults.host.clone())),
            port: match args.port {
                Some(port) => port,
                None => parse_env(lookup("MEDIA_GATE_PORT"), "MEDIA_GATE_PORT", defaults.port)?,
            },
            storage_dir: args.storage_dir.unwrap_or_else(|| {
                env_string("MEDIA_GATE_STORAGE_DIR", defaults.storage_dir.clone())
            }),
            database_url: args.database_url.unwrap_or_else(|| {
                env_string("MEDIA_GATE_DATABASE_URL", defaults.database_url.clone())
            }),
            base_url: args
                .base_url
                .unwrap_or_else(|| env_string("MEDIA_GATE_BASE_URL", defaults.base_url.clone())),
            prefix: env_string("MEDIA_GATE_PREFIX", defaults.prefix.clone()),
            signed_prefix: env_string("MEDIA_GATE_SIGNED_PREFIX", defaults.signed_prefix.clone()),
            signed_enabled: parse_env_bool(
                lookup("MEDIA_GATE_SIGNED_ENABLED"),
                "MEDIA_GATE_SIGNED_ENABLED",
                defaults.signed_enabled,
            )?,
            signing_secret,
            default_ttl_minutes: parse_env(
                lookup("MEDIA_GATE_SIGNED_TTL_MINUTES"),
                "MEDIA_GATE_SIGNED_TTL_MINUTES",
                defaults.default_ttl_minutes,
            )?,
            require_auth: parse_env_bool(
                lookup("MEDIA_GATE_REQUIRE_AUTH"),
                "MEDIA_GATE_REQUIRE_AUTH",
                defaults.require_auth,
            )?,
            strict: parse_env_bool(lookup("MEDIA_GATE_STRICT"), "MEDIA_GATE_STRICT", defaults.strict)?,
            cache_max_age_secs: parse_env(
                lookup("MEDIA_GATE_CACHE_MAX_AGE"),
                "MEDIA_GATE_CACHE_MAX_AGE",
                defaults.cache_max_age_secs,
            )?,
            chunk_size: parse_env(
                lookup("MEDIA_GATE_CHUNK_SIZE"),
                "MEDIA_GATE_CHUNK_SIZE",
                defaults.chunk_size,
            )?,
            principal_header: lookup("MEDIA_GATE_PRINCIPAL_HEADER")
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .or(defaults.principal_header.clone()),
            request_timeout_secs: parse_env(
                lookup("MEDIA_GATE_REQUEST_TIMEOUT"),
                "MEDIA_GATE_REQUEST_TIMEOUT",
                defaults.request_timeout_secs,
            )?,
        };
        cfg.validate()?;

        let mode = match args.command {
            Some(Command::Sign {
                access,
                id,
                minutes,
            }) => Mode::Sign {
                access,
                id,
                minutes,
            },
            None if args.migrate => Mode::Migrate,
            None => Mode::Serve,
        };

        Ok((cfg, mode))
    }

    /// Reject configurations the server cannot run safely with.
    pub fn validate(&self) -> Result<()> {
        if self.signing_secret.trim().is_empty() {
            bail!("MEDIA_GATE_SIGNING_SECRET must be set to a non-empty value");
        }
        if !(1..=MAX_SIGNED_TTL_MINUTES).contains(&self.default_ttl_minutes) {
            bail!(
                "signed link TTL must be between 1 and {} minutes, got {}",
                MAX_SIGNED_TTL_MINUTES,
                self.default_ttl_minutes
            );
        }
        if self.chunk_size == 0 {
            bail!("chunk size must be greater than zero");
        }
        for (name, prefix) in [("prefix", &self.prefix), ("signed prefix", &self.signed_prefix)] {
            if prefix.is_empty() || prefix.contains('/') {
                bail!("{} `{}` must be a single non-empty path segment", name, prefix);
            }
        }
        if self.prefix == self.signed_prefix {
            bail!("session and signed prefixes must differ");
        }
        self.principal_header_name()?;
        Ok(())
    }

    pub fn principal_header_name(&self) -> Result<Option<HeaderName>> {
        self.principal_header
            .as_deref()
            .map(|name| {
                HeaderName::from_str(name)
                    .with_context(|| format!("invalid principal header `{}`", name))
            })
            .transpose()
    }

    pub fn policy(&self) -> AccessPolicy {
        AccessPolicy {
            require_auth: self.require_auth,
            strict: self.strict,
        }
    }

    pub fn cache_max_age(&self) -> Duration {
        Duration::from_secs(self.cache_max_age_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_env<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        None => Ok(default),
    }
}

fn parse_env_bool(value: Option<String>, key: &str, default: bool) -> Result<bool> {
    let Some(value) = value else {
        return Ok(default);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("parsing {} value `{}`: expected a boolean", key, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn resolve(argv: &[&str], vars: &[(&str, &str)]) -> Result<(AppConfig, Mode)> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let args = Args::try_parse_from(argv)?;
        AppConfig::resolve(args, |key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_the_secret_is_set() {
        let (cfg, mode) =
            resolve(&["media-gate"], &[("MEDIA_GATE_SIGNING_SECRET", "s3cret")]).unwrap();

        assert_eq!(mode, Mode::Serve);
        assert_eq!(cfg.addr(), "0.0.0.0:3000");
        assert_eq!(cfg.default_ttl_minutes, 60);
        assert!(cfg.require_auth && cfg.strict && cfg.signed_enabled);
        assert_eq!(cfg.chunk_size, 8192);
        assert_eq!(cfg.cache_max_age(), Duration::from_secs(3600));
    }

    #[test]
    fn missing_or_blank_secret_is_rejected() {
        assert!(resolve(&["media-gate"], &[]).is_err());
        assert!(resolve(&["media-gate"], &[("MEDIA_GATE_SIGNING_SECRET", "   ")]).is_err());
    }

    #[test]
    fn cli_overrides_environment() {
        let (cfg, _) = resolve(
            &["media-gate", "--port", "8080", "--host", "127.0.0.1"],
            &[
                ("MEDIA_GATE_SIGNING_SECRET", "s"),
                ("MEDIA_GATE_PORT", "9000"),
                ("MEDIA_GATE_HOST", "10.0.0.1"),
            ],
        )
        .unwrap();
        assert_eq!(cfg.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn environment_switches_are_parsed() {
        let (cfg, _) = resolve(
            &["media-gate"],
            &[
                ("MEDIA_GATE_SIGNING_SECRET", "s"),
                ("MEDIA_GATE_STRICT", "false"),
                ("MEDIA_GATE_REQUIRE_AUTH", "0"),
                ("MEDIA_GATE_SIGNED_TTL_MINUTES", "15"),
                ("MEDIA_GATE_SIGNED_ENABLED", "off"),
            ],
        )
        .unwrap();
        assert!(!cfg.strict);
        assert!(!cfg.require_auth);
        assert!(!cfg.signed_enabled);
        assert_eq!(cfg.default_ttl_minutes, 15);
    }

    #[test]
    fn bad_values_name_the_offending_key() {
        let err = resolve(
            &["media-gate"],
            &[("MEDIA_GATE_SIGNING_SECRET", "s"), ("MEDIA_GATE_PORT", "eighty")],
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("MEDIA_GATE_PORT"));

        let err = resolve(
            &["media-gate"],
            &[("MEDIA_GATE_SIGNING_SECRET", "s"), ("MEDIA_GATE_STRICT", "maybe")],
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("MEDIA_GATE_STRICT"));
    }

    #[test]
    fn invalid_route_layout_is_rejected() {
        let base = AppConfig::with_secret("s");
        assert!(base.validate().is_ok());

        let same = AppConfig {
            signed_prefix: "media".into(),
            ..base.clone()
        };
        assert!(same.validate().is_err());

        let nested = AppConfig {
            prefix: "a/b".into(),
            ..base.clone()
        };
        assert!(nested.validate().is_err());

        let header = AppConfig {
            principal_header: Some("bad header".into()),
            ..base
        };
        assert!(header.validate().is_err());
    }

    #[test]
    fn principal_header_is_opt_in() {
        let (cfg, _) =
            resolve(&["media-gate"], &[("MEDIA_GATE_SIGNING_SECRET", "s")]).unwrap();
        assert_eq!(cfg.principal_header, None);
        assert_eq!(cfg.principal_header_name().unwrap(), None);

        let (cfg, _) = resolve(
            &["media-gate"],
            &[
                ("MEDIA_GATE_SIGNING_SECRET", "s"),
                ("MEDIA_GATE_PRINCIPAL_HEADER", "X-Authenticated-User"),
            ],
        )
        .unwrap();
        assert_eq!(
            cfg.principal_header_name().unwrap(),
            Some(HeaderName::from_static("x-authenticated-user"))
        );
    }

    #[test]
    fn signed_ttl_must_be_positive_and_bounded() {
        for ttl in ["0", "-5", "9223372036854775807"] {
            let err = resolve(
                &["media-gate"],
                &[
                    ("MEDIA_GATE_SIGNING_SECRET", "s"),
                    ("MEDIA_GATE_SIGNED_TTL_MINUTES", ttl),
                ],
            )
            .unwrap_err();
            assert!(format!("{err:#}").contains("TTL"), "{ttl}: {err:#}");
        }

        let longest = AppConfig {
            default_ttl_minutes: MAX_SIGNED_TTL_MINUTES,
            ..AppConfig::with_secret("s")
        };
        assert!(longest.validate().is_ok());
    }

    #[test]
    fn sign_subcommand_and_migrate_flag_select_the_mode() {
        let id = Uuid::new_v4();
        let id_arg = id.to_string();
        let (_, mode) = resolve(
            &["media-gate", "sign", "--access", "download", "--id", &id_arg, "--minutes", "-1"],
            &[("MEDIA_GATE_SIGNING_SECRET", "s")],
        )
        .unwrap();
        assert_eq!(
            mode,
            Mode::Sign {
                access: AccessType::Download,
                id,
                minutes: Some(-1)
            }
        );

        let (_, mode) = resolve(
            &["media-gate", "--migrate"],
            &[("MEDIA_GATE_SIGNING_SECRET", "s")],
        )
        .unwrap();
        assert_eq!(mode, Mode::Migrate);
    }
}
