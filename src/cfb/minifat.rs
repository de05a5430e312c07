//! MiniFAT allocation for streams smaller than the mini-stream cutoff.

use super::consts::*;

#[derive(Debug)]
pub struct MiniFatBuilder {
    minifat: Vec<u32>,
    next_mini_sector: u32,
    mini_sector_size: usize,
    ministream_data: Vec<u8>,
}

impl MiniFatBuilder {
    pub fn new(mini_sector_size: usize) -> Self {
        Self {
            minifat: Vec::new(),
            next_mini_sector: 0,
            mini_sector_size,
            ministream_data: Vec::new(),
        }
    }

    pub fn allocate_mini_chain(&mut self, data: &[u8]) -> u32 {
        if data.is_empty() {
            return ENDOFCHAIN;
        }
        let num_sectors = data.len().div_ceil(self.mini_sector_size);
        let start = self.next_mini_sector;

        let new_len = (self.next_mini_sector as usize + num_sectors).max(self.minifat.len());
        if new_len > self.minifat.len() {
            self.minifat.resize(new_len, FREESECT);
        }

        for i in 0..num_sectors {
            let current = self.next_mini_sector;
            self.next_mini_sector += 1;
            self.minifat[current as usize] = if i < num_sectors - 1 {
                current + 1
            } else {
                ENDOFCHAIN
            };
        }

        let padded_size = num_sectors * self.mini_sector_size;
        let offset = self.ministream_data.len();
        self.ministream_data.resize(offset + padded_size, 0);
        self.ministream_data[offset..offset + data.len()].copy_from_slice(data);

        start
    }

    pub fn ministream_data(&self) -> &[u8] {
        &self.ministream_data
    }

    pub fn ministream_size(&self) -> u64 {
        self.ministream_data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.minifat.is_empty()
    }

    pub fn minifat(&self) -> &[u32] {
        &self.minifat
    }

    pub fn generate_minifat_sectors(&self, sector_size: usize) -> Vec<Vec<u8>> {
        if self.minifat.is_empty() {
            return Vec::new();
        }
        let entries_per_sector = sector_size / 4;
        let num_sectors = self.minifat.len().div_ceil(entries_per_sector);
        let mut sectors = Vec::with_capacity(num_sectors);
        for sector_idx in 0..num_sectors {
            let mut data = vec![0xFFu8; sector_size];
            let start = sector_idx * entries_per_sector;
            let end = (start + entries_per_sector).min(self.minifat.len());
            for (i, &value) in self.minifat[start..end].iter().enumerate() {
                let off = i * 4;
                data[off..off + 4].copy_from_slice(&value.to_le_bytes());
            }
            sectors.push(data);
        }
        sectors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_and_pads_ministream_data() {
        let mut minifat = MiniFatBuilder::new(64);
        let start = minifat.allocate_mini_chain(&[0xAA; 100]);
        assert_eq!(start, 0);
        assert_eq!(minifat.minifat()[0], 1);
        assert_eq!(minifat.minifat()[1], ENDOFCHAIN);
        assert_eq!(minifat.ministream_size(), 128);
    }

    #[test]
    fn empty_data_allocates_nothing() {
        let mut minifat = MiniFatBuilder::new(64);
        assert_eq!(minifat.allocate_mini_chain(&[]), ENDOFCHAIN);
        assert!(minifat.is_empty());
    }
}
