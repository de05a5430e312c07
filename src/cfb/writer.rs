//! Builds a Compound File Binary container in memory and writes it out.
//!
//! Stream *allocation* order (which sector a stream lands on) is independent
//! of directory *entry* order (how entries are linked in the sibling tree);
//! the former is insertion order here, the latter follows
//! [`super::directory`]'s POI-derived comparator.

use std::io::{Seek, SeekFrom, Write};

use crate::error::Result;

use super::consts::*;
use super::difat::DifatBuilder;
use super::directory::DirectoryBuilder;
use super::fat::FatBuilder;
use super::header::HeaderBuilder;
use super::minifat::MiniFatBuilder;

/// A stream pending a write, tagged with whether it must always occupy
/// regular (non-mini) sectors regardless of size.
struct PendingStream {
    path: Vec<String>,
    data: Vec<u8>,
    force_large: bool,
}

/// Builds a CFB container: a root storage holding streams and nested
/// storages, written in a single pass.
pub struct CfbWriter {
    sector_size: usize,
    mini_sector_size: usize,
    mini_stream_cutoff: u32,
    streams: Vec<PendingStream>,
    storages: Vec<Vec<String>>,
    root_clsid: Option<[u8; 16]>,
}

impl CfbWriter {
    pub fn new() -> Self {
        Self::with_sector_size(512)
    }

    pub fn with_sector_size(sector_size: usize) -> Self {
        assert!(sector_size == 512 || sector_size == 4096);
        Self {
            sector_size,
            mini_sector_size: MINI_SECTOR_SIZE,
            mini_stream_cutoff: MINI_STREAM_CUTOFF,
            streams: Vec::new(),
            storages: Vec::new(),
            root_clsid: None,
        }
    }

    pub fn set_root_clsid(&mut self, clsid: [u8; 16]) {
        self.root_clsid = Some(clsid);
    }

    pub fn create_storage(&mut self, path: &[&str]) {
        self.storages.push(path.iter().map(|s| s.to_string()).collect());
    }

    pub fn create_stream(&mut self, path: &[&str], data: &[u8]) {
        self.streams.push(PendingStream {
            path: path.iter().map(|s| s.to_string()).collect(),
            data: data.to_vec(),
            force_large: false,
        });
    }

    /// Creates a stream that always occupies regular sectors, never the
    /// ministream, and whose allocated span is padded to at least
    /// `max(4104, next 512-byte boundary)` bytes. Used for `EncryptedPackage`,
    /// which real producers never place in the ministream even when small.
    pub fn create_stream_forced_large(&mut self, path: &[&str], data: &[u8]) {
        self.streams.push(PendingStream {
            path: path.iter().map(|s| s.to_string()).collect(),
            data: data.to_vec(),
            force_large: true,
        });
    }

    pub fn write_to<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        let mut fat = FatBuilder::new(self.sector_size);
        let mut minifat = MiniFatBuilder::new(self.mini_sector_size);

        let mut small: Vec<&PendingStream> = Vec::new();
        let mut large: Vec<&PendingStream> = Vec::new();
        for s in &self.streams {
            if !s.force_large && s.data.len() < self.mini_stream_cutoff as usize {
                small.push(s);
            } else {
                large.push(s);
            }
        }

        let mut small_sectors: Vec<(&PendingStream, u32)> = Vec::new();
        for s in &small {
            let start = minifat.allocate_mini_chain(&s.data);
            small_sectors.push((s, start));
        }

        // Allocate large streams before the ministream so their sector
        // positions don't depend on whether any small streams exist.
        let mut large_sectors: Vec<(&PendingStream, u32, usize)> = Vec::new();
        for s in &large {
            let padded_len = if s.force_large {
                let min_len = 4104usize.max(s.data.len().div_ceil(512) * 512);
                min_len.max(s.data.len())
            } else {
                s.data.len()
            };
            let start = if padded_len == 0 {
                ENDOFCHAIN
            } else if s.force_large {
                fat.allocate_chain_of(padded_len.div_ceil(self.sector_size))
            } else {
                fat.allocate_chain(padded_len)
            };
            large_sectors.push((s, start, padded_len));
        }

        let (ministream_start, ministream_size) = if !minifat.is_empty() {
            let data = minifat.ministream_data();
            let start = fat.allocate_chain(data.len());
            (start, minifat.ministream_size())
        } else {
            (ENDOFCHAIN, 0u64)
        };

        let mut directory = DirectoryBuilder::new(ministream_start, ministream_size);
        if let Some(clsid) = self.root_clsid {
            directory.set_root_clsid(clsid);
        }
        for storage_path in &self.storages {
            directory.add_storage_path(storage_path);
        }
        for (s, start, _padded_len) in &large_sectors {
            directory.add_stream_path(&s.path, *start, s.data.len() as u64);
        }
        for (s, start) in &small_sectors {
            directory.add_stream_path(&s.path, *start, s.data.len() as u64);
        }

        let dir_stream = directory.generate_directory_stream();
        let dir_sector_count = dir_stream.len().div_ceil(self.sector_size) as u32;
        let dir_start_sector = fat.allocate_chain(dir_stream.len());

        let (minifat_start_sector, num_minifat_sectors) = if !minifat.is_empty() {
            let minifat_sectors = minifat.generate_minifat_sectors(self.sector_size);
            let num_sectors = minifat_sectors.len() as u32;
            if num_sectors > 0 {
                let start = fat.allocate_chain(num_sectors as usize * self.sector_size);
                (start, num_sectors)
            } else {
                (ENDOFCHAIN, 0)
            }
        } else {
            (ENDOFCHAIN, 0)
        };

        let entries_per_fat_sector = self.sector_size as u32 / 4;
        let ids_per_difat_sector = entries_per_fat_sector - 1;

        let n_used = fat.total_sectors();
        let mut n_fat = 0u32;
        let mut n_difat = 0u32;
        for _ in 0..8 {
            let total = n_used + n_fat + n_difat;
            let new_n_fat = total.div_ceil(entries_per_fat_sector);
            let new_n_difat = if new_n_fat > 109 {
                (new_n_fat - 109).div_ceil(ids_per_difat_sector)
            } else {
                0
            };
            if new_n_fat == n_fat && new_n_difat == n_difat {
                break;
            }
            n_fat = new_n_fat;
            n_difat = new_n_difat;
        }

        let difat_start_sector = if n_difat > 0 {
            fat.allocate_special(n_difat, DIFSECT)
        } else {
            ENDOFCHAIN
        };
        let fat_start_sector = if n_fat > 0 {
            fat.allocate_special(n_fat, FATSECT)
        } else {
            ENDOFCHAIN
        };

        let fat_sectors_data = fat.generate_fat_sectors();

        let mut header_builder = HeaderBuilder::new(self.sector_size);
        header_builder.set_first_dir_sector(dir_start_sector);
        header_builder.set_num_dir_sectors(dir_sector_count);
        header_builder.set_minifat(minifat_start_sector, num_minifat_sectors);

        let fat_sector_ids: Vec<u32> = if n_fat > 0 {
            (fat_start_sector..fat_start_sector + n_fat).collect()
        } else {
            Vec::new()
        };

        let mut difat = DifatBuilder::new(self.sector_size);
        difat.set_fat_sectors(&fat_sector_ids);
        let (num_difat_sectors, difat_sectors) = if difat.is_needed() {
            (
                difat.calculate_difat_sector_count(),
                difat.generate_difat_sectors(difat_start_sector),
            )
        } else {
            (0, Vec::new())
        };

        header_builder.add_fat_sectors(&fat_sector_ids);
        if num_difat_sectors > 0 {
            header_builder.set_difat(difat_start_sector, num_difat_sectors);
        }

        let header = header_builder.generate();
        writer.write_all(&header)?;

        if !minifat.is_empty() && ministream_start != ENDOFCHAIN {
            write_sector_aligned(
                writer,
                ministream_start,
                self.sector_size,
                minifat.ministream_data(),
            )?;
        }

        for (s, start, padded_len) in &large_sectors {
            if *start == ENDOFCHAIN {
                continue;
            }
            let mut data = s.data.clone();
            data.resize(*padded_len, 0);
            write_sector_aligned(writer, *start, self.sector_size, &data)?;
        }

        write_sector_aligned(writer, dir_start_sector, self.sector_size, &dir_stream)?;

        if !minifat.is_empty() && minifat_start_sector != ENDOFCHAIN {
            let minifat_sectors = minifat.generate_minifat_sectors(self.sector_size);
            let mut current = minifat_start_sector;
            for sector in &minifat_sectors {
                write_sector(writer, current, self.sector_size, sector)?;
                current += 1;
            }
        }

        for (i, sector) in fat_sectors_data.iter().enumerate() {
            write_sector(writer, fat_start_sector + i as u32, self.sector_size, sector)?;
        }

        let mut current = difat_start_sector;
        for sector in &difat_sectors {
            write_sector(writer, current, self.sector_size, sector)?;
            current += 1;
        }

        writer.flush()?;
        Ok(())
    }

    pub fn build(&self) -> Result<Vec<u8>> {
        let mut buf = std::io::Cursor::new(Vec::new());
        self.write_to(&mut buf)?;
        Ok(buf.into_inner())
    }
}

impl Default for CfbWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn write_sector<W: Write + Seek>(writer: &mut W, sector: u32, sector_size: usize, data: &[u8]) -> Result<()> {
    let position = ((sector as u64) + 1) * (sector_size as u64);
    writer.seek(SeekFrom::Start(position))?;
    writer.write_all(data)?;
    Ok(())
}

fn write_sector_aligned<W: Write + Seek>(
    writer: &mut W,
    start_sector: u32,
    sector_size: usize,
    data: &[u8],
) -> Result<()> {
    let padded_size = data.len().div_ceil(sector_size) * sector_size;
    let mut padded = data.to_vec();
    padded.resize(padded_size, 0);
    write_sector(writer, start_sector, sector_size, &padded)
}
