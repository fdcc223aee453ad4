use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use ns_core::NarrativeError;
use walkdir::WalkDir;

use crate::{
    map_cli_source_path, map_cli_source_read, map_cli_source_scan, LoadedSource,
    SOURCE_REF_PREFIX,
};

pub(crate) const SCRIPT_EXTENSION: &str = "nss";

/// Loads a single `.nss` file or every `.nss` file under a directory.
pub(crate) fn load_sources(
    script_path: &str,
    entry_script: Option<&str>,
) -> Result<LoadedSource, NarrativeError> {
    let absolute = resolve_source_path(script_path)?;

    let (scripts_text, default_entry) = if absolute.is_dir() {
        (read_scripts_from_dir(&absolute)?, None)
    } else {
        let (name, content) = read_script_file(&absolute)?;
        let mut scripts = BTreeMap::new();
        scripts.insert(name.clone(), content);
        (scripts, Some(name))
    };

    Ok(LoadedSource {
        id: make_source_id(&absolute),
        scripts_text,
        entry_script: entry_script.map(str::to_string).or(default_entry),
    })
}

pub(crate) fn load_source_by_ref(source_ref: &str) -> Result<LoadedSource, NarrativeError> {
    let Some(raw) = source_ref.strip_prefix(SOURCE_REF_PREFIX) else {
        return Err(NarrativeError::new(
            "CLI_SOURCE_REF_INVALID",
            format!("Unsupported source ref: {}", source_ref),
        ));
    };
    load_sources(raw, None)
}

pub(crate) fn resolve_source_path(script_path: &str) -> Result<PathBuf, NarrativeError> {
    let path = PathBuf::from(script_path);
    let absolute = if path.is_absolute() {
        path
    } else {
        std::env::current_dir()
            .map_err(map_cli_source_path)?
            .join(path)
    };

    if !absolute.exists() {
        return Err(NarrativeError::new(
            "CLI_SOURCE_NOT_FOUND",
            format!("Script path does not exist: {}", absolute.display()),
        ));
    }

    Ok(absolute)
}

fn read_script_file(path: &Path) -> Result<(String, String), NarrativeError> {
    let name = match (path.extension(), path.file_stem()) {
        (Some(extension), Some(stem)) if extension == SCRIPT_EXTENSION => {
            stem.to_string_lossy().to_string()
        }
        _ => {
            return Err(NarrativeError::new(
                "CLI_SOURCE_EXTENSION",
                format!("Script file must end with .{}: {}", SCRIPT_EXTENSION, path.display()),
            ))
        }
    };
    let content = fs::read_to_string(path).map_err(map_cli_source_read)?;
    Ok((name, content))
}

/// Scripts keyed by their path relative to `scripts_dir`, without extension.
pub(crate) fn read_scripts_from_dir(
    scripts_dir: &Path,
) -> Result<BTreeMap<String, String>, NarrativeError> {
    let mut scripts = BTreeMap::new();

    for entry in WalkDir::new(scripts_dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if path.extension().map_or(true, |extension| extension != SCRIPT_EXTENSION) {
            continue;
        }

        let relative = path
            .strip_prefix(scripts_dir)
            .map_err(map_cli_source_scan)?
            .with_extension("")
            .to_string_lossy()
            .replace('\\', "/");

        let content = fs::read_to_string(path).map_err(map_cli_source_read)?;
        scripts.insert(relative, content);
    }

    if scripts.is_empty() {
        return Err(NarrativeError::new(
            "CLI_SOURCE_EMPTY",
            format!("No .{} files under {}", SCRIPT_EXTENSION, scripts_dir.display()),
        ));
    }

    Ok(scripts)
}

pub(crate) fn make_source_id(script_path: &Path) -> String {
    format!("{}{}", SOURCE_REF_PREFIX, script_path.display())
}
