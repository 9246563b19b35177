//! Read adapter that verifies an entry while it is being read.

use std::io::{self, Read};
use std::sync::Arc;

use crate::archive::ArchiveEntry;
use crate::verifier::{EntryVerdict, EntryVerifier, JarVerifier};

/// Wraps an entry's raw stream and feeds every byte read to the verifier.
///
/// When the declared size has been consumed, or end of stream is reached
/// for an entry of unknown size, the entry is processed exactly once. A
/// stream that ends before its declared size is an `UnexpectedEof` error
/// and the entry stays unverified.
pub struct VerifierStream<R> {
    inner: R,
    verifier: Arc<JarVerifier>,
    name: String,
    entry: Option<EntryVerifier>,
    remaining: Option<u64>,
    verdict: Option<EntryVerdict>,
}

impl<R: Read> VerifierStream<R> {
    pub fn new(inner: R, entry: &ArchiveEntry, verifier: Arc<JarVerifier>) -> Self {
        let entry_verifier = verifier.begin_entry(entry);
        let mut stream = Self {
            inner,
            verifier,
            name: entry.name.clone(),
            entry: Some(entry_verifier),
            remaining: entry.declared_size,
            verdict: None,
        };
        // Zero-length entries never see a read with data.
        if stream.remaining == Some(0) {
            stream.finish();
        }
        stream
    }

    fn finish(&mut self) {
        if let Some(entry) = self.entry.take() {
            self.verdict = self.verifier.process_entry(entry);
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Verdict recorded when this stream finished its entry.
    pub fn verdict(&self) -> Option<&EntryVerdict> {
        self.verdict.as_ref()
    }

    /// Whether the entry has been fully read and processed.
    pub fn is_finished(&self) -> bool {
        self.entry.is_none()
    }

    /// Release the underlying stream. An unfinished entry is not processed.
    pub fn close(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for VerifierStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.remaining == Some(0) {
            return Ok(0);
        }
        let limit = match self.remaining {
            Some(remaining) => buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX)),
            None => buf.len(),
        };

        let n = self.inner.read(&mut buf[..limit])?;
        if n == 0 {
            if let Some(remaining) = self.remaining.filter(|r| *r > 0) {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("{}: stream ended {} bytes early", self.name, remaining),
                ));
            }
            self.finish();
            return Ok(0);
        }

        if let Some(entry) = self.entry.as_mut() {
            self.verifier.update(entry, &buf[..n]);
        }
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= n as u64;
            if *remaining == 0 {
                self.finish();
            }
        }
        Ok(n)
    }
}
