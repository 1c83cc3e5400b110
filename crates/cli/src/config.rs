use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use threadline_runtime_config::{CONFIG_FILE_NAME, ThreadlineConfig, apply_compat_fallbacks};

/// Get the config directory path (~/.config/threadline/)
pub fn config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .context("Could not determine home directory")?;
    Ok(PathBuf::from(home).join(".config").join("threadline"))
}

/// Canonical config file path.
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

fn read_config_doc(path: &Path) -> Result<toml::Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config at {}", path.display()))?;
    let doc = toml::from_str::<toml::Value>(&content)
        .with_context(|| format!("Failed to parse config at {}", path.display()))?;
    Ok(doc)
}

fn config_from_doc(doc: &toml::Value, path: &Path) -> Result<ThreadlineConfig> {
    let mut config = doc
        .clone()
        .try_into::<ThreadlineConfig>()
        .with_context(|| format!("Invalid config at {}", path.display()))?;
    apply_compat_fallbacks(&mut config, Some(doc));
    Ok(config)
}

/// Config in effect for this run.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub path: PathBuf,
    pub exists: bool,
    pub config: ThreadlineConfig,
}

/// Load `override_path` or the canonical file. A missing file yields defaults;
/// a file that exists but does not parse is an error.
pub fn load_config(override_path: Option<&Path>) -> Result<ResolvedConfig> {
    let path = match override_path {
        Some(path) => path.to_path_buf(),
        None => config_path()?,
    };
    if !path.exists() {
        return Ok(ResolvedConfig {
            path,
            exists: false,
            config: ThreadlineConfig::default(),
        });
    }
    let doc = read_config_doc(&path)?;
    let config = config_from_doc(&doc, &path)?;
    Ok(ResolvedConfig {
        path,
        exists: true,
        config,
    })
}

/// Print the resolved config as TOML.
pub fn show_config(resolved: &ResolvedConfig) -> Result<()> {
    let body = toml::to_string_pretty(&resolved.config).context("Failed to serialize config")?;
    let origin = if resolved.exists { "" } else { " (not found, defaults)" };
    println!("# {}{}", resolved.path.display(), origin);
    print!("{body}");
    Ok(())
}
