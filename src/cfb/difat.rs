//! DIFAT (Double Indirect FAT) generation, needed once a file has more than
//! 109 FAT sectors.

use super::consts::*;

#[derive(Debug)]
pub struct DifatBuilder {
    fat_sector_ids: Vec<u32>,
    sector_size: usize,
}

impl DifatBuilder {
    pub fn new(sector_size: usize) -> Self {
        Self {
            fat_sector_ids: Vec::new(),
            sector_size,
        }
    }

    /// Records FAT sector IDs beyond the first 109 (which live in the header).
    pub fn set_fat_sectors(&mut self, fat_sectors: &[u32]) {
        self.fat_sector_ids = if fat_sectors.len() > 109 {
            fat_sectors[109..].to_vec()
        } else {
            Vec::new()
        };
    }

    pub fn calculate_difat_sector_count(&self) -> u32 {
        if self.fat_sector_ids.is_empty() {
            return 0;
        }
        let ids_per_sector = (self.sector_size / 4) - 1;
        self.fat_sector_ids.len().div_ceil(ids_per_sector) as u32
    }

    pub fn generate_difat_sectors(&self, first_difat_sector: u32) -> Vec<Vec<u8>> {
        if self.fat_sector_ids.is_empty() {
            return Vec::new();
        }
        let ids_per_sector = (self.sector_size / 4) - 1;
        let num_sectors = self.calculate_difat_sector_count();
        let mut sectors = Vec::with_capacity(num_sectors as usize);

        for idx in 0..num_sectors {
            let mut data = vec![0xFFu8; self.sector_size];
            let start = (idx as usize) * ids_per_sector;
            let end = ((idx as usize + 1) * ids_per_sector).min(self.fat_sector_ids.len());
            for (i, &id) in self.fat_sector_ids[start..end].iter().enumerate() {
                let off = i * 4;
                data[off..off + 4].copy_from_slice(&id.to_le_bytes());
            }
            let next_ptr_off = self.sector_size - 4;
            let next = if idx < num_sectors - 1 {
                first_difat_sector + idx + 1
            } else {
                ENDOFCHAIN
            };
            data[next_ptr_off..next_ptr_off + 4].copy_from_slice(&next.to_le_bytes());
            sectors.push(data);
        }
        sectors
    }

    pub fn is_needed(&self) -> bool {
        !self.fat_sector_ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_needed_under_109_fat_sectors() {
        let difat = DifatBuilder::new(512);
        assert!(!difat.is_needed());
    }

    #[test]
    fn one_sector_covers_up_to_127_overflow_ids() {
        let mut difat = DifatBuilder::new(512);
        let fat_sectors: Vec<u32> = (0..150).collect();
        difat.set_fat_sectors(&fat_sectors);
        assert_eq!(difat.calculate_difat_sector_count(), 1);
    }

    #[test]
    fn chains_multiple_difat_sectors() {
        let mut difat = DifatBuilder::new(512);
        let fat_sectors: Vec<u32> = (0..250).collect();
        difat.set_fat_sectors(&fat_sectors);
        assert_eq!(difat.calculate_difat_sector_count(), 2);

        let sectors = difat.generate_difat_sectors(300);
        let next = u32::from_le_bytes(sectors[0][508..512].try_into().unwrap());
        assert_eq!(next, 301);
        let last = u32::from_le_bytes(sectors[1][508..512].try_into().unwrap());
        assert_eq!(last, ENDOFCHAIN);
    }
}
