//! Configuration loader for the gridder service.
//!
//! Loads one YAML file holding the table, engine, output and logging
//! sections. Supports environment variable substitution using `${VAR}`
//! and `${VAR:-default}` syntax, applied before parsing.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use polar_lut::GeometryConfig;
use resampler::{OutputConfig, ResampleConfig};
use serde::{Deserialize, Serialize};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

// ============================================================================
// Gridder Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridderConfig {
    /// Directory that relative table paths resolve against
    #[serde(default)]
    pub table_dir: Option<PathBuf>,

    pub geometry: GeometryConfig,

    #[serde(default)]
    pub resample: ResampleConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Emit JSON log lines instead of text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl GridderConfig {
    /// Apply environment overrides.
    pub fn apply_env(&mut self) {
        self.output.apply_env();

        if let Ok(val) = std::env::var("GRIDDER_LOG_LEVEL") {
            if !val.is_empty() {
                self.logging.level = val;
            }
        }
    }

    /// Expand `~` in every configured path.
    pub fn expand_paths(&mut self) {
        if let Some(dir) = self.table_dir.as_mut() {
            expand_tilde(dir);
        }
        for entry in &mut self.geometry.tables {
            expand_tilde(&mut entry.lookup_path);
            if let Some(path) = entry.clutter_path.as_mut() {
                expand_tilde(path);
            }
        }
        expand_tilde(&mut self.output.output_dir);
        expand_tilde(&mut self.output.latest_dir);
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.geometry.tables.is_empty(),
            "geometry.tables must list at least one lookup table"
        );

        for entry in &self.geometry.tables {
            anyhow::ensure!(
                !entry.lookup_path.as_os_str().is_empty(),
                "Lookup path for scan type {} cannot be empty",
                entry.scan_type
            );
            if self.geometry.remove_clutter {
                anyhow::ensure!(
                    entry.clutter_path.is_some(),
                    "remove_clutter is set but scan type {} has no clutter_path",
                    entry.scan_type
                );
            }
        }

        let tol = &self.geometry.tolerance;
        anyhow::ensure!(
            tol.min_altitude_ratio <= tol.max_altitude_ratio,
            "geometry.tolerance altitude ratio range is empty"
        );

        self.resample
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid resample config: {}", e))?;
        self.output
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid output config: {}", e))?;

        anyhow::ensure!(
            LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()),
            "Unknown log level {:?}",
            self.logging.level
        );

        Ok(())
    }
}

fn expand_tilde(path: &mut PathBuf) {
    if let Some(s) = path.to_str() {
        if s.starts_with('~') {
            *path = PathBuf::from(shellexpand::tilde(s).into_owned());
        }
    }
}

// ============================================================================
// Loading Functions
// ============================================================================

/// Load, expand, override and validate the service configuration.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<GridderConfig> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read gridder config from {:?}", path.as_ref()))?;

    let mut config = parse_config(&content)
        .with_context(|| format!("Failed to parse gridder config from {:?}", path.as_ref()))?;

    config.apply_env();
    config.expand_paths();
    config.validate()?;

    Ok(config)
}

fn parse_config(content: &str) -> Result<GridderConfig> {
    let expanded = expand_env_vars(content)?;
    let config: GridderConfig = serde_yaml::from_str(&expanded)?;
    Ok(config)
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand `${VAR}` and `${VAR:-default}` references.
fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();

            let mut var_expr = String::new();
            let mut depth = 1;
            while depth > 0 {
                match chars.next() {
                    Some('{') => {
                        depth += 1;
                        var_expr.push('{');
                    }
                    Some('}') => {
                        depth -= 1;
                        if depth > 0 {
                            var_expr.push('}');
                        }
                    }
                    Some(c) => var_expr.push(c),
                    None => anyhow::bail!("Unclosed variable substitution: ${{{}", var_expr),
                }
            }

            result.push_str(&resolve_var_expr(&var_expr)?);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

fn resolve_var_expr(expr: &str) -> Result<String> {
    if let Some((var_name, default)) = expr.split_once(":-") {
        match std::env::var(var_name.trim()) {
            Ok(val) if !val.is_empty() => Ok(val),
            _ => Ok(default.to_string()),
        }
    } else {
        std::env::var(expr.trim()).with_context(|| format!("Environment variable {} not set", expr))
    }
}
