//! Application configuration loading for CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

/// File configuration for transfer limits and loop timing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Max connections across all transfers.
    pub max_connections: Option<usize>,
    /// Max connections to a single host.
    pub max_host_connections: Option<usize>,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// Upload pacing in bytes per second (0 disables).
    pub upload_rate: Option<u64>,
    /// Download pacing in bytes per second (0 disables).
    pub download_rate: Option<u64>,
    /// Shutdown drain budget in seconds.
    pub drain_budget_secs: Option<u64>,
    /// Main loop tick in milliseconds.
    pub tick_ms: Option<u64>,
    /// User-Agent override.
    pub user_agent: Option<String>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        validate_range("max_connections", self.max_connections, 1..=64)?;
        validate_range("max_host_connections", self.max_host_connections, 1..=64)?;
        if let (Some(total), Some(host)) = (self.max_connections, self.max_host_connections)
            && host > total
        {
            bail!(
                "Invalid config value for `max_host_connections`: {host}. Must not exceed `max_connections` ({total})"
            );
        }
        validate_range("connect_timeout_secs", self.connect_timeout_secs, 1..=3600)?;
        validate_range("drain_budget_secs", self.drain_budget_secs, 1..=600)?;
        validate_range("tick_ms", self.tick_ms, 1..=10_000)?;
        if let Some(user_agent) = &self.user_agent
            && user_agent.trim().is_empty()
        {
            bail!("Invalid config value for `user_agent`: must not be empty");
        }
        Ok(())
    }
}

fn validate_range<T>(field: &str, value: Option<T>, range: std::ops::RangeInclusive<T>) -> Result<()>
where
    T: PartialOrd + std::fmt::Display,
{
    let Some(value) = value else {
        return Ok(());
    };
    if !range.contains(&value) {
        bail!(
            "Invalid config value for `{field}`: {value}. Expected range: {}..={}",
            range.start(),
            range.end()
        );
    }
    Ok(())
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed file config when a config file exists and was valid.
    pub config: Option<FileConfig>,
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/tick-transfer/config.toml`
/// 2. `$HOME/.config/tick-transfer/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("tick-transfer")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("tick-transfer")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from an explicit path, or from the default path if present.
///
/// An explicit path must exist; a missing default file is not an error.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        let config = load_file_config(path)?;
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            config: Some(config),
        });
    }

    let path = resolve_default_config_path();
    match path.as_deref() {
        Some(path_ref) if path_ref.exists() => {
            let config = load_file_config(path_ref)?;
            Ok(LoadedConfig {
                path,
                config: Some(config),
            })
        }
        _ => Ok(LoadedConfig { path, config: None }),
    }
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!(
                "Invalid config syntax on line {}: expected key = value",
                line_index + 1
            );
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let line_no = line_index + 1;

        match key {
            "max_connections" => {
                cfg.max_connections = Some(parse_usize(value).with_context(|| {
                    format!("Invalid `max_connections` value on line {line_no}")
                })?);
            }
            "max_host_connections" => {
                cfg.max_host_connections = Some(parse_usize(value).with_context(|| {
                    format!("Invalid `max_host_connections` value on line {line_no}")
                })?);
            }
            "connect_timeout_secs" => {
                cfg.connect_timeout_secs = Some(parse_integer_u64(value).with_context(|| {
                    format!("Invalid `connect_timeout_secs` value on line {line_no}")
                })?);
            }
            "upload_rate" => {
                cfg.upload_rate = Some(parse_integer_u64(value).with_context(|| {
                    format!("Invalid `upload_rate` value on line {line_no}")
                })?);
            }
            "download_rate" => {
                cfg.download_rate = Some(parse_integer_u64(value).with_context(|| {
                    format!("Invalid `download_rate` value on line {line_no}")
                })?);
            }
            "drain_budget_secs" => {
                cfg.drain_budget_secs = Some(parse_integer_u64(value).with_context(|| {
                    format!("Invalid `drain_budget_secs` value on line {line_no}")
                })?);
            }
            "tick_ms" => {
                cfg.tick_ms = Some(parse_integer_u64(value).with_context(|| {
                    format!("Invalid `tick_ms` value on line {line_no}")
                })?);
            }
            "user_agent" => {
                cfg.user_agent = Some(parse_string_literal(value).with_context(|| {
                    format!("Invalid `user_agent` value on line {line_no}")
                })?);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_no}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_usize(raw_value: &str) -> Result<usize> {
    let value = parse_integer_u64(raw_value)?;
    usize::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for usize"))
}
