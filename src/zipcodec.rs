//! A thin ZIP reader/writer tuned for the OOXML part set: single-pass
//! deflated writing, random-access-by-name reading.

use std::io::{Read, Seek, Write};

use zip::write::SimpleFileOptions;
use zip::ZipArchive;

use crate::error::Result;

/// Writes ZIP entries one at a time; opening a new entry auto-closes the
/// previous one, and the central directory is finalized on [`ZipWriter::finish`].
pub struct ZipWriter<W: Write + Seek> {
    inner: zip::ZipWriter<W>,
}

impl<W: Write + Seek> ZipWriter<W> {
    pub fn new(writer: W) -> Self {
        ZipWriter {
            inner: zip::ZipWriter::new(writer),
        }
    }

    /// Opens `name` as the current entry, writing `data` as its (deflated)
    /// contents.
    pub fn write_entry(&mut self, name: &str, data: &[u8]) -> Result<()> {
        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .compression_level(Some(6));
        self.inner.start_file(name, options)?;
        self.inner.write_all(data)?;
        Ok(())
    }

    /// Finalizes the central directory and returns the underlying writer.
    pub fn finish(self) -> Result<W> {
        Ok(self.inner.finish()?)
    }
}

/// Random-access ZIP reader over a named-entry archive.
pub struct ZipReader<R: Read + Seek> {
    archive: ZipArchive<R>,
    names: std::collections::HashSet<String>,
}

impl<R: Read + Seek> ZipReader<R> {
    pub fn new(reader: R) -> Result<Self> {
        let archive = ZipArchive::new(reader)?;
        let names = archive.file_names().map(str::to_string).collect();
        Ok(ZipReader { archive, names })
    }

    /// O(1) (after initial open) membership check.
    pub fn has_entry(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Reads and fully decompresses the entry named `name`.
    pub fn read_entry(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut file = self.archive.by_name(name)?;
        let mut buf = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut buf)?;
        Ok(buf)
    }

    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_entries_through_writer_and_reader() {
        let mut buf = Vec::new();
        {
            let cursor = Cursor::new(&mut buf);
            let mut w = ZipWriter::new(cursor);
            w.write_entry("a.xml", b"<a/>").unwrap();
            w.write_entry("b.xml", b"<b/>").unwrap();
            w.finish().unwrap();
        }

        let mut r = ZipReader::new(Cursor::new(buf)).unwrap();
        assert!(r.has_entry("a.xml"));
        assert!(!r.has_entry("missing.xml"));
        assert_eq!(r.read_entry("b.xml").unwrap(), b"<b/>");
    }

    #[test]
    fn opening_a_new_entry_closes_the_previous_one() {
        let mut buf = Vec::new();
        let cursor = Cursor::new(&mut buf);
        let mut w = ZipWriter::new(cursor);
        w.write_entry("first.txt", b"one").unwrap();
        w.write_entry("second.txt", b"two").unwrap();
        w.finish().unwrap();

        let mut r = ZipReader::new(Cursor::new(buf)).unwrap();
        assert_eq!(r.read_entry("first.txt").unwrap(), b"one");
        assert_eq!(r.read_entry("second.txt").unwrap(), b"two");
    }
}
