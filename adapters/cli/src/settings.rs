use std::{fs, path::Path};

use anyhow::{bail, Context, Result};
use collapse_core::{BlockPos, CollapseConfig};
use serde::Deserialize;

const SUPPORTED_CONFIG_VERSION: u32 = 1;

/// Top-level layout of a collapse configuration file.
///
/// The lifecycle settings live under `[collapse]`; omitted keys keep their
/// defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    version: Option<u32>,
    collapse: CollapseConfig,
}

/// Loads and sanitizes the configuration stored at `path`.
pub(crate) fn load_config(path: &Path) -> Result<CollapseConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read collapse config at {}", path.display()))?;
    parse_config(&contents)
        .with_context(|| format!("invalid collapse config at {}", path.display()))
}

fn parse_config(contents: &str) -> Result<CollapseConfig> {
    let file: ConfigFile =
        toml::from_str(contents).context("failed to parse collapse config toml contents")?;
    if let Some(version) = file.version {
        if version != SUPPORTED_CONFIG_VERSION {
            bail!(
                "unsupported collapse config version {version}; expected {SUPPORTED_CONFIG_VERSION}"
            );
        }
    }
    Ok(file.collapse.sanitized())
}

/// Parses a `x,y,z` cell position.
pub(crate) fn parse_center(value: &str) -> Result<BlockPos, String> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    let [x, y, z] = parts.as_slice() else {
        return Err(format!("expected x,y,z but found `{value}`"));
    };
    let coordinate = |name: &str, raw: &str| {
        raw.parse::<i32>()
            .map_err(|error| format!("invalid {name} coordinate `{raw}`: {error}"))
    };
    Ok(BlockPos::new(
        coordinate("x", *x)?,
        coordinate("y", *y)?,
        coordinate("z", *z)?,
    ))
}
