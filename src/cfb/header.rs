//! CFB header generation: the 512- or 4096-byte first sector.

use super::consts::*;

pub struct HeaderBuilder {
    sector_size: usize,
    first_dir_sector: u32,
    num_dir_sectors: u32,
    first_minifat_sector: u32,
    num_minifat_sectors: u32,
    first_difat_sector: u32,
    num_difat_sectors: u32,
    fat_sectors: Vec<u32>,
}

impl HeaderBuilder {
    pub fn new(sector_size: usize) -> Self {
        Self {
            sector_size,
            first_dir_sector: 0,
            num_dir_sectors: 0,
            first_minifat_sector: ENDOFCHAIN,
            num_minifat_sectors: 0,
            first_difat_sector: ENDOFCHAIN,
            num_difat_sectors: 0,
            fat_sectors: Vec::new(),
        }
    }

    pub fn set_first_dir_sector(&mut self, sector: u32) {
        self.first_dir_sector = sector;
    }

    pub fn set_minifat(&mut self, first_sector: u32, num_sectors: u32) {
        self.first_minifat_sector = first_sector;
        self.num_minifat_sectors = num_sectors;
    }

    pub fn set_num_dir_sectors(&mut self, num: u32) {
        self.num_dir_sectors = if self.sector_size == 512 { 0 } else { num };
    }

    pub fn set_difat(&mut self, first_sector: u32, num_sectors: u32) {
        self.first_difat_sector = first_sector;
        self.num_difat_sectors = num_sectors;
    }

    pub fn add_fat_sectors(&mut self, sectors: &[u32]) {
        self.fat_sectors.extend_from_slice(sectors);
    }

    pub fn generate(&self) -> Vec<u8> {
        let mut header = vec![0u8; self.sector_size];

        header[0..8].copy_from_slice(MAGIC);
        header[24..26].copy_from_slice(&0x003Eu16.to_le_bytes());

        let dll_version = if self.sector_size == 512 { 3u16 } else { 4u16 };
        header[26..28].copy_from_slice(&dll_version.to_le_bytes());
        header[28..30].copy_from_slice(&0xFFFEu16.to_le_bytes());

        let sector_shift = if self.sector_size == 512 { 9u16 } else { 12u16 };
        header[30..32].copy_from_slice(&sector_shift.to_le_bytes());
        header[32..34].copy_from_slice(&6u16.to_le_bytes());

        header[40..44].copy_from_slice(&self.num_dir_sectors.to_le_bytes());

        let num_fat_sectors = self.fat_sectors.len() as u32;
        header[44..48].copy_from_slice(&num_fat_sectors.to_le_bytes());
        header[48..52].copy_from_slice(&self.first_dir_sector.to_le_bytes());
        header[56..60].copy_from_slice(&MINI_STREAM_CUTOFF.to_le_bytes());
        header[60..64].copy_from_slice(&self.first_minifat_sector.to_le_bytes());
        header[64..68].copy_from_slice(&self.num_minifat_sectors.to_le_bytes());
        header[68..72].copy_from_slice(&self.first_difat_sector.to_le_bytes());
        header[72..76].copy_from_slice(&self.num_difat_sectors.to_le_bytes());

        for (i, &sector_id) in self.fat_sectors.iter().take(109).enumerate() {
            let offset = 76 + i * 4;
            header[offset..offset + 4].copy_from_slice(&sector_id.to_le_bytes());
        }
        for i in self.fat_sectors.len()..109 {
            let offset = 76 + i * 4;
            header[offset..offset + 4].copy_from_slice(&FREESECT.to_le_bytes());
        }

        header
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sector_size_512_fields() {
        let builder = HeaderBuilder::new(512);
        let header = builder.generate();
        assert_eq!(header.len(), 512);
        assert_eq!(&header[0..8], MAGIC);
        assert_eq!(&header[26..28], &3u16.to_le_bytes());
        assert_eq!(&header[30..32], &9u16.to_le_bytes());
    }

    #[test]
    fn sector_size_4096_fields() {
        let header = HeaderBuilder::new(4096).generate();
        assert_eq!(header.len(), 4096);
        assert_eq!(&header[26..28], &4u16.to_le_bytes());
        assert_eq!(&header[30..32], &12u16.to_le_bytes());
    }

    #[test]
    fn first_109_fat_sectors_recorded() {
        let mut builder = HeaderBuilder::new(512);
        builder.add_fat_sectors(&[1, 2, 3]);
        let header = builder.generate();
        assert_eq!(&header[76..80], &1u32.to_le_bytes());
        assert_eq!(&header[80..84], &2u32.to_le_bytes());
        assert_eq!(&header[84..88], &3u32.to_le_bytes());
        assert_eq!(&header[88..92], &FREESECT.to_le_bytes());
    }
}
