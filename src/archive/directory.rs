//! Exploded archive on disk.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use super::{ArchiveEntry, EntrySource};

/// A directory tree treated as an archive.
///
/// Entry names are `/`-separated paths relative to the root; directories
/// carry a trailing `/`. `META-INF/` is listed first, `META-INF/MANIFEST.MF`
/// first of all, matching the layout `jar` tools produce.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> io::Result<PathBuf> {
        let relative = Path::new(name.trim_end_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("entry name escapes the archive root: {}", name),
            ));
        }
        Ok(self.root.join(relative))
    }

    /// Write `data` to the entry `name`, creating parent directories.
    pub fn write_entry(&self, name: &str, data: &[u8]) -> io::Result<()> {
        let path = self.resolve(name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, data)
    }
}

fn sort_key(name: &str) -> (u8, String) {
    let upper = name.to_ascii_uppercase();
    let rank = if upper == "META-INF/" {
        0
    } else if upper == "META-INF/MANIFEST.MF" {
        1
    } else if upper.starts_with("META-INF/") {
        2
    } else {
        3
    };
    (rank, name.to_string())
}

impl EntrySource for DirectorySource {
    fn entries(&self) -> io::Result<Vec<ArchiveEntry>> {
        let mut entries = Vec::new();
        for item in WalkDir::new(&self.root).min_depth(1).follow_links(false) {
            let item = item.map_err(io::Error::from)?;
            let relative = item
                .path()
                .strip_prefix(&self.root)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            let mut name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            let file_type = item.file_type();
            if file_type.is_dir() {
                name.push('/');
                entries.push(ArchiveEntry::directory(name));
            } else if file_type.is_file() {
                let size = item.metadata().map_err(io::Error::from)?.len();
                entries.push(ArchiveEntry::file(name, size));
            }
        }
        entries.sort_by_cached_key(|e| sort_key(&e.name));
        Ok(entries)
    }

    fn open<'a>(&'a self, name: &str) -> io::Result<Box<dyn Read + Send + 'a>> {
        Ok(Box::new(File::open(self.resolve(name)?)?))
    }

    fn location(&self) -> String {
        format!("file:{}", self.root.display())
    }
}
