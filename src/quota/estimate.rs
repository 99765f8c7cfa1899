//! Token Estimation
//!
//! Rough token counts from prompt length and referenced file sizes, at about
//! four bytes per token.

use std::fs;
use std::path::Path;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

pub const BYTES_PER_TOKEN: u64 = 4;

/// Directories never descended into
pub const SKIPPED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "__pycache__",
    "venv",
    ".venv",
    "dist",
    "build",
    "target",
];

/// Extensions counted when walking a directory
pub const TEXT_EXTENSIONS: &[&str] = &[
    "py", "js", "ts", "tsx", "jsx", "rs", "go", "java", "c", "h", "cpp", "hpp", "rb", "sh",
    "md", "txt", "yaml", "yml", "json", "toml",
];

/// Estimate tokens for a prompt of `prompt_length` bytes plus `paths`
///
/// Files count in full; directories count only recognized text files.
/// Paths that cannot be read are skipped.
pub fn estimate_tokens<P: AsRef<Path>>(paths: &[P], prompt_length: u64) -> u64 {
    let total_bytes: u64 = paths.iter().map(|p| path_bytes(p.as_ref())).sum();
    (prompt_length + total_bytes) / BYTES_PER_TOKEN
}

/// Estimate tokens for a full command line
///
/// `@path` arguments are treated as referenced files and a trailing
/// `/**/*` glob names a directory. The command's length is the prompt length.
pub fn estimate_tokens_from_command(command_line: &str) -> u64 {
    let prompt_length = command_line.len() as u64;
    let Some(parts) = shlex::split(command_line) else {
        return prompt_length / BYTES_PER_TOKEN;
    };

    let paths: Vec<&str> = parts
        .iter()
        .flat_map(|part| part.split_whitespace())
        .filter_map(|word| word.strip_prefix('@'))
        .map(|path| path.strip_suffix("/**/*").unwrap_or(path))
        .filter(|path| !path.is_empty())
        .collect();
    estimate_tokens(paths.as_slice(), prompt_length)
}

fn path_bytes(path: &Path) -> u64 {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) => {
            debug!("Skipping {:?} in estimate: {}", path, e);
            return 0;
        }
    };

    if metadata.is_file() {
        metadata.len()
    } else if metadata.is_dir() {
        directory_bytes(path)
    } else {
        0
    }
}

fn directory_bytes(root: &Path) -> u64 {
    WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_skipped_dir(e))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_text_file(e.path()))
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIPPED_DIRS.contains(&name))
}

fn is_text_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| TEXT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}
