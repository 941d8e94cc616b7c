use crate::data_file::DataFile;
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use std::path::Path;
use strata_pff::{DataProduct, FilenameInfo};

/// A per-module data product, in [`DataProduct::PER_MODULE`] order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleFile {
    DynamicMeta,
    Bit16Img,
    Bit8Img,
    PhImg,
}

impl ModuleFile {
    pub const ALL: [ModuleFile; 4] = [
        ModuleFile::DynamicMeta,
        ModuleFile::Bit16Img,
        ModuleFile::Bit8Img,
        ModuleFile::PhImg,
    ];

    pub fn data_product(self) -> DataProduct {
        DataProduct::PER_MODULE[self as usize]
    }

    fn of(dp: DataProduct) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.data_product() == dp)
    }
}

/// The four files of one module, one per per-module data product.
#[derive(Debug)]
pub struct FileSet {
    module: u16,
    files: [DataFile; 4],
}

impl FileSet {
    /// Creates every file of the set with sequence number 0.
    pub fn create(
        dir: &Path,
        start_time: DateTime<Utc>,
        dome: u32,
        module: u16,
    ) -> Result<Self, StoreError> {
        let open = |f: ModuleFile| {
            DataFile::create(dir, FilenameInfo::new(start_time, f.data_product(), dome, module))
        };
        let [meta, bit16, bit8, ph] = ModuleFile::ALL;
        Ok(Self {
            module,
            files: [open(meta)?, open(bit16)?, open(bit8)?, open(ph)?],
        })
    }

    pub fn module(&self) -> u16 {
        self.module
    }

    pub fn get(&self, f: ModuleFile) -> &DataFile {
        &self.files[f as usize]
    }

    pub fn get_mut(&mut self, f: ModuleFile) -> &mut DataFile {
        &mut self.files[f as usize]
    }

    /// `None` for products that are not kept per module.
    pub fn file(&self, dp: DataProduct) -> Option<&DataFile> {
        ModuleFile::of(dp).map(|f| self.get(f))
    }

    pub fn files(&self) -> impl Iterator<Item = &DataFile> {
        self.files.iter()
    }

    pub fn rotate_all(&mut self, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.files.iter_mut().try_for_each(|f| f.rotate(now))
    }

    pub fn flush(&mut self) -> Result<(), StoreError> {
        self.files.iter_mut().try_for_each(DataFile::flush)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn one_file_per_product() {
        let dir = tempfile::tempdir().unwrap();
        let t0 = Utc.with_ymd_and_hms(2022, 1, 2, 3, 4, 5).unwrap();
        let set = FileSet::create(dir.path(), t0, 0, 9).unwrap();

        assert!(set.file(DataProduct::StaticMeta).is_none());
        for f in ModuleFile::ALL {
            assert_eq!(set.get(f).info().data_product, f.data_product());
            assert_eq!(set.file(f.data_product()).unwrap().path(), set.get(f).path());
        }
        let names: Vec<String> = set.files().map(|f| f.info().to_string()).collect();
        assert_eq!(
            names,
            vec![
                "st=Sun_Jan_02_03:04:05_2022,dp=1,bpp=0,dome=0,module=9,seqno=0.pff",
                "st=Sun_Jan_02_03:04:05_2022,dp=2,bpp=2,dome=0,module=9,seqno=0.pff",
                "st=Sun_Jan_02_03:04:05_2022,dp=3,bpp=1,dome=0,module=9,seqno=0.pff",
                "st=Sun_Jan_02_03:04:05_2022,dp=4,bpp=2,dome=0,module=9,seqno=0.pff",
            ]
        );
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 4);
    }
}
