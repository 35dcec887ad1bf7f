// File system operations backing the host File API exposed to scripts.
// Listing order and name/extension semantics are part of the host contract.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use encoding_rs::Encoding;
use walkdir::WalkDir;

use crate::error::Result;

/// File system utilities shared by both script backends
pub struct FileSystem;

impl FileSystem {
    /// List direct children of a directory, sorted by file name. A missing or
    /// non-directory path yields an empty list, matching the script contract.
    pub fn list_children(path: &Path) -> Vec<PathBuf> {
        let Ok(read_dir) = fs::read_dir(path) else {
            return Vec::new();
        };
        let mut children: Vec<PathBuf> = read_dir
            .filter_map(|dir_entry| dir_entry.ok())
            .map(|dir_entry| dir_entry.path())
            .collect();
        children.sort_by_key(|child| {
            child
                .file_name()
                .map(|file_name| file_name.to_string_lossy().into_owned())
                .unwrap_or_default()
        });
        children
    }

    pub fn list_child_files(path: &Path) -> Vec<PathBuf> {
        Self::list_children(path)
            .into_iter()
            .filter(|child| child.is_file())
            .collect()
    }

    pub fn list_child_directories(path: &Path) -> Vec<PathBuf> {
        Self::list_children(path)
            .into_iter()
            .filter(|child| child.is_dir())
            .collect()
    }

    /// File name without its last extension segment. `"a.b.wav"` -> `"a.b"`,
    /// `"noext"` -> `"noext"`.
    pub fn name_without_extension(path: &Path) -> String {
        let name = Self::file_name(path);
        match name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => name,
        }
    }

    /// Extension without the dot; empty when there is none.
    pub fn extension(path: &Path) -> String {
        let name = Self::file_name(path);
        match name.rsplit_once('.') {
            Some((stem, extension)) if !stem.is_empty() => extension.to_string(),
            _ => String::new(),
        }
    }

    pub fn file_name(path: &Path) -> String {
        path.file_name()
            .map(|file_name| file_name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Read a text file with an explicit encoding label (IANA name, e.g.
    /// `UTF-8`, `Shift_JIS`). `None` means UTF-8. Malformed sequences decode
    /// to replacement characters rather than failing.
    pub fn read_text(path: &Path, encoding: Option<&str>) -> Result<String> {
        let bytes = fs::read(path)?;
        let encoding = resolve_encoding(encoding)?;
        let (text, _, _) = encoding.decode(&bytes);
        Ok(text.into_owned())
    }

    pub fn read_lines(path: &Path, encoding: Option<&str>) -> Result<Vec<String>> {
        let text = Self::read_text(path, encoding)?;
        Ok(text.lines().map(str::to_string).collect())
    }

    /// Write UTF-8 text, creating parent directories as needed.
    pub fn write_text(path: &Path, text: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, text)?;
        Ok(())
    }

    /// Delete a file or a directory tree. Missing paths are a no-op.
    pub fn delete(path: &Path) -> Result<()> {
        if path.is_dir() {
            fs::remove_dir_all(path)?;
        } else if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Recursively collect sample files under `root` with one of the accepted
    /// extensions, sorted by path.
    pub fn scan_sample_files(root: &Path, accepted_extensions: &[String]) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_map(|walk_entry| walk_entry.ok())
            .filter(|walk_entry| walk_entry.file_type().is_file())
            .map(|walk_entry| walk_entry.into_path())
            .filter(|path| {
                let extension = Self::extension(path).to_lowercase();
                accepted_extensions
                    .iter()
                    .any(|accept| accept.to_lowercase() == extension)
            })
            .collect();
        files.sort();
        files
    }
}

/// Free-function form of [`FileSystem::read_text`] for call sites that only
/// need the one operation.
pub fn read_text(path: &Path, encoding: Option<&str>) -> Result<String> {
    FileSystem::read_text(path, encoding)
}

fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    match label {
        None | Some("") => Ok(encoding_rs::UTF_8),
        Some(label) => Encoding::for_label(label.as_bytes()).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unknown text encoding: {label}"),
            )
            .into()
        }),
    }
}
