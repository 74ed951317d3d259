//! Document collectors: repository walks, shallow clones, and
//! caller-supplied uploads.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use ragforge_shared::{DocumentOrigin, RagForgeError, RawDocument, Result};

/// Source file extensions ingested as code.
const CODE_EXTENSIONS: &[&str] = &[
    "py", "js", "ts", "jsx", "tsx", "java", "cpp", "c", "h", "hpp", "go", "rs", "rb", "php",
    "swift", "kt", "scala", "clj", "sh", "sql", "r", "m", "mm", "dart", "lua", "pl", "pm", "hs",
    "elm",
];

/// File extensions ingested as documentation.
const DOC_EXTENSIONS: &[&str] = &["md", "txt", "rst", "adoc", "org", "wiki"];

/// Directory names never descended into.
const EXCLUDE_DIRS: &[&str] = &[
    "node_modules",
    "venv",
    "env",
    "__pycache__",
    "build",
    "dist",
    "target",
    "bin",
    "obj",
    "coverage",
    "htmlcov",
    "vendor",
    "bower_components",
];

/// File names never ingested (lockfiles, OS litter).
const EXCLUDE_FILES: &[&str] = &[
    "package-lock.json",
    "yarn.lock",
    "poetry.lock",
    "Pipfile.lock",
    "go.sum",
    "composer.lock",
    "Thumbs.db",
];

/// Limits for a repository walk.
#[derive(Debug, Clone)]
pub struct RepoOptions {
    /// Per-file size cap in kilobytes; larger files are skipped.
    pub max_file_size_kb: u64,
}

impl Default for RepoOptions {
    fn default() -> Self {
        Self {
            max_file_size_kb: 100,
        }
    }
}

/// Whether an ingest source names a remote repository rather than a local
/// path.
pub fn is_remote_source(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://") || source.starts_with("git@")
}

/// Shallow-clone a remote repository into a fresh temp directory and
/// return its path. The caller removes the directory when done.
#[instrument(skip_all, fields(url = %url))]
pub async fn clone_repository(url: &str) -> Result<PathBuf> {
    let dest = std::env::temp_dir().join(format!("ragforge-clone-{}", Uuid::now_v7()));

    info!(dest = %dest.display(), "cloning repository");

    let output = tokio::process::Command::new("git")
        .args(["clone", "--depth", "1", url])
        .arg(&dest)
        .output()
        .await
        .map_err(|e| RagForgeError::io(&dest, e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RagForgeError::validation(format!(
            "git clone of {url} failed: {}",
            stderr.trim()
        )));
    }

    Ok(dest)
}

/// Walk a repository tree and collect code and documentation files as
/// [`RawDocument`]s.
///
/// Dotfiles, excluded directories, lockfiles, unknown extensions, files
/// over the size cap, and non-UTF-8 files are all skipped with a log line;
/// none of them abort the walk.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn collect_repository(root: &Path, opts: &RepoOptions) -> Result<Vec<RawDocument>> {
    if !root.is_dir() {
        return Err(RagForgeError::validation(format!(
            "not a directory: {}",
            root.display()
        )));
    }

    let mut documents = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let entries = std::fs::read_dir(&dir).map_err(|e| RagForgeError::io(&dir, e))?;

        for entry in entries {
            let entry = entry.map_err(|e| RagForgeError::io(&dir, e))?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();

            if path.is_dir() {
                if name.starts_with('.') || EXCLUDE_DIRS.contains(&name.as_str()) {
                    debug!(dir = %path.display(), "skipping excluded directory");
                    continue;
                }
                stack.push(path);
                continue;
            }

            if name.starts_with('.') || EXCLUDE_FILES.contains(&name.as_str()) {
                continue;
            }

            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            let ext = ext.to_ascii_lowercase();

            let origin = if CODE_EXTENSIONS.contains(&ext.as_str()) {
                DocumentOrigin::CodeFile
            } else if DOC_EXTENSIONS.contains(&ext.as_str()) {
                DocumentOrigin::DocFile
            } else {
                continue;
            };

            let size_kb = entry
                .metadata()
                .map(|m| m.len() / 1024)
                .map_err(|e| RagForgeError::io(&path, e))?;
            if size_kb > opts.max_file_size_kb {
                debug!(file = %path.display(), size_kb, "skipping oversized file");
                continue;
            }

            let text = match std::fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "skipping unreadable file");
                    continue;
                }
            };

            let relative = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");

            documents.push(RawDocument {
                source_id: relative,
                text,
                origin,
                language_hint: (origin == DocumentOrigin::CodeFile).then(|| ext.clone()),
            });
        }
    }

    // Deterministic output regardless of directory iteration order.
    documents.sort_by(|a, b| a.source_id.cmp(&b.source_id));

    info!(files = documents.len(), "repository walk complete");
    Ok(documents)
}

/// Wrap caller-supplied `(name, content)` pairs as upload documents.
pub fn collect_uploads(uploads: Vec<(String, String)>) -> Vec<RawDocument> {
    uploads
        .into_iter()
        .map(|(name, text)| RawDocument {
            source_id: name,
            text,
            origin: DocumentOrigin::Upload,
            language_hint: None,
        })
        .collect()
}
