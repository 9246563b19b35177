//! In-memory entry source.

use std::io::{self, Cursor, Read};

use super::{ArchiveEntry, EntrySource};

/// Entries held in memory, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    location: String,
    entries: Vec<(ArchiveEntry, Vec<u8>)>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::with_location("memory:")
    }

    pub fn with_location(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            entries: Vec::new(),
        }
    }

    /// Append a file entry, or replace the bytes of an existing one in place.
    pub fn add_file(&mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> &mut Self {
        let name = name.into();
        let data = data.into();
        let entry = ArchiveEntry::file(name.clone(), data.len() as u64);
        match self.entries.iter_mut().find(|(e, _)| e.name == name) {
            Some(slot) => *slot = (entry, data),
            None => self.entries.push((entry, data)),
        }
        self
    }

    pub fn add_directory(&mut self, name: impl Into<String>) -> &mut Self {
        let name = name.into();
        if !self.entries.iter().any(|(e, _)| e.name == name) {
            self.entries.push((ArchiveEntry::directory(name), Vec::new()));
        }
        self
    }

    /// Insert a file entry before all others.
    pub fn prepend_file(&mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> &mut Self {
        let name = name.into();
        let data = data.into();
        self.entries.retain(|(e, _)| e.name != name);
        self.entries
            .insert(0, (ArchiveEntry::file(name, data.len() as u64), data));
        self
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<u8>> {
        let index = self.entries.iter().position(|(e, _)| e.name == name)?;
        Some(self.entries.remove(index).1)
    }

    /// Overwrite bytes without touching the declared size.
    pub fn corrupt(&mut self, name: &str, data: impl Into<Vec<u8>>) -> bool {
        match self.entries.iter_mut().find(|(e, _)| e.name == name) {
            Some((_, bytes)) => {
                *bytes = data.into();
                true
            }
            None => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(e, _)| e.name == name)
            .map(|(_, data)| data.as_slice())
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(e, _)| e.name.as_str()).collect()
    }

    /// Copy every entry of `source`.
    pub fn from_source(source: &dyn EntrySource) -> io::Result<Self> {
        let mut memory = Self::with_location(source.location());
        for entry in source.entries()? {
            if entry.is_directory {
                memory.add_directory(entry.name);
                continue;
            }
            let mut data = Vec::new();
            source.open(&entry.name)?.read_to_end(&mut data)?;
            memory.add_file(entry.name, data);
        }
        Ok(memory)
    }
}

impl EntrySource for MemorySource {
    fn entries(&self) -> io::Result<Vec<ArchiveEntry>> {
        Ok(self.entries.iter().map(|(e, _)| e.clone()).collect())
    }

    fn open<'a>(&'a self, name: &str) -> io::Result<Box<dyn Read + Send + 'a>> {
        let data = self.get(name).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no entry {}", name))
        })?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn location(&self) -> String {
        self.location.clone()
    }
}
