use crate::data_file::{DataFile, create_file};
use crate::error::{RecordError, StoreError};
use crate::file_set::{FileSet, ModuleFile};
use crate::render::{COINC_IMAGE_BYTES, coinc_header_text, image_header_text};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use strata_events::{ACQ_MODE_PH, ImageDepth, ModuleHeader, PacketHeader};
use strata_pff::{DataProduct, DirnameInfo, write_text};
use tracing::{info, warn};

/// Session-wide metadata file for keys that belong to no module.
pub const DYNAMIC_META_FILE: &str = "dynamic_meta.pff";

#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub save_location: PathBuf,
    pub observatory: String,
    pub dome: u32,
    /// A file is rotated once its size exceeds this many bytes.
    pub max_file_size: u64,
    /// Open a file set the first time an unseen module is referenced.
    pub auto_create: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub records_written: u64,
    pub records_dropped: u64,
    pub rotations: u64,
}

/// Owns every open output file of a session.
pub struct FileRouter {
    config: RouterConfig,
    session: DirnameInfo,
    session_dir: PathBuf,
    sets: HashMap<u16, FileSet>,
    dynamic_meta: BufWriter<File>,
    stats: RouterStats,
}

impl FileRouter {
    /// Creates the session directory `obs=..,st=..` under the save location
    /// and the global metadata file inside it.
    pub fn new(config: RouterConfig, start_time: DateTime<Utc>) -> Result<Self, StoreError> {
        let session = DirnameInfo::new(config.observatory.clone(), start_time)
            .map_err(StoreError::SessionName)?;
        let session_dir = config.save_location.join(session.to_string());
        std::fs::create_dir_all(&session_dir).map_err(|source| StoreError::CreateDir {
            path: session_dir.clone(),
            source,
        })?;
        info!(dir = %session_dir.display(), "session directory ready");
        let dynamic_meta = create_file(&session_dir.join(DYNAMIC_META_FILE))?;

        Ok(Self {
            config,
            session,
            session_dir,
            sets: HashMap::new(),
            dynamic_meta,
            stats: RouterStats::default(),
        })
    }

    pub fn session(&self) -> &DirnameInfo {
        &self.session
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    pub fn stats(&self) -> RouterStats {
        self.stats
    }

    pub fn has_module(&self, module: u16) -> bool {
        self.sets.contains_key(&module)
    }

    pub fn file_set(&self, module: u16) -> Option<&FileSet> {
        self.sets.get(&module)
    }

    /// Opened module ids, ascending.
    pub fn modules(&self) -> Vec<u16> {
        let mut ids: Vec<u16> = self.sets.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Opens the file set of `module` unless it is already open.
    pub fn open_module(&mut self, module: u16) -> Result<&mut FileSet, StoreError> {
        match self.sets.entry(module) {
            Entry::Occupied(e) => Ok(e.into_mut()),
            Entry::Vacant(e) => {
                let set = FileSet::create(
                    &self.session_dir,
                    self.session.start_time,
                    self.config.dome,
                    module,
                )?;
                info!(module, "file set created");
                Ok(e.insert(set))
            }
        }
    }

    pub fn open_modules(&mut self, modules: &[u16]) -> Result<(), StoreError> {
        for &module in modules {
            self.open_module(module)?;
        }
        Ok(())
    }

    /// Writes a module image as a TEXT header plus an IMAGE record sized by
    /// the header's bit depth.
    pub fn write_image(&mut self, header: &ModuleHeader, pixels: &[u8]) -> Result<(), RecordError> {
        let result = self.route_image(header, pixels);
        self.account(result)
    }

    /// Writes a pulse-height record as a TEXT header plus an IMAGE record.
    pub fn write_coinc(&mut self, header: &PacketHeader, pixels: &[u8]) -> Result<(), RecordError> {
        let result = self.route_coinc(header, pixels);
        self.account(result)
    }

    /// Appends a TEXT record to the dynamic-metadata file of an open module.
    /// Never opens a file set.
    pub fn write_module_meta(&mut self, module: u16, text: &[u8]) -> Result<(), RecordError> {
        let result = self.route_meta(module, text);
        self.account(result)
    }

    /// Appends a TEXT record to the session-wide `dynamic_meta.pff`.
    pub fn write_global_meta(&mut self, text: &[u8]) -> Result<(), RecordError> {
        let result = write_text(&mut self.dynamic_meta, text)
            .map(|_| ())
            .map_err(RecordError::GlobalWrite);
        self.account(result)
    }

    /// Rotates every open per-module file.
    pub fn rotate_all(&mut self) -> Result<(), StoreError> {
        let now = Utc::now();
        for (module, set) in self.sets.iter_mut() {
            set.rotate_all(now)?;
            self.stats.rotations += DataProduct::PER_MODULE.len() as u64;
            info!(module = *module, "file set rotated on request");
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), StoreError> {
        for set in self.sets.values_mut() {
            set.flush()?;
        }
        self.dynamic_meta.flush().map_err(|source| StoreError::Flush {
            path: self.session_dir.join(DYNAMIC_META_FILE),
            source,
        })
    }

    /// Flushes and closes every per-module file.
    pub fn close_all(&mut self) -> Result<(), StoreError> {
        let flushed = self.flush();
        let closed = self.sets.len();
        self.sets.clear();
        info!(closed, stats = ?self.stats, "file sets closed");
        flushed
    }

    fn account(&mut self, result: Result<(), RecordError>) -> Result<(), RecordError> {
        match &result {
            Ok(()) => self.stats.records_written += 1,
            Err(_) => self.stats.records_dropped += 1,
        }
        result
    }

    /// Makes sure `module` has a file set, opening one when allowed.
    fn resolve(&mut self, module: u16) -> Result<(), RecordError> {
        if self.sets.contains_key(&module) {
            return Ok(());
        }
        if !self.config.auto_create {
            return Err(RecordError::UnknownModule(module));
        }
        self.open_module(module)
            .map(|_| ())
            .map_err(|source| RecordError::Create { module, source })
    }

    fn route_image(&mut self, header: &ModuleHeader, pixels: &[u8]) -> Result<(), RecordError> {
        let module = header.mod_num;
        let depth = ImageDepth::from_mode(header.mode).ok_or(RecordError::UnsupportedDepth {
            module,
            mode: header.mode,
        })?;
        let need = depth.module_image_bytes();
        let image = pixels.get(..need).ok_or(RecordError::ShortPayload {
            module,
            need,
            got: pixels.len(),
        })?;
        let dp = match depth {
            ImageDepth::Bit16 => ModuleFile::Bit16Img,
            ImageDepth::Bit8 => ModuleFile::Bit8Img,
        };
        let text = image_header_text(header);
        self.append_record(module, dp, text.as_bytes(), image)
    }

    fn route_coinc(&mut self, header: &PacketHeader, pixels: &[u8]) -> Result<(), RecordError> {
        let module = header.mod_num;
        if header.acq_mode != ACQ_MODE_PH {
            return Err(RecordError::UnsupportedAcqMode {
                module,
                acq_mode: header.acq_mode,
            });
        }
        let image = pixels.get(..COINC_IMAGE_BYTES).ok_or(RecordError::ShortPayload {
            module,
            need: COINC_IMAGE_BYTES,
            got: pixels.len(),
        })?;
        let text = coinc_header_text(header);
        self.append_record(module, ModuleFile::PhImg, text.as_bytes(), image)
    }

    fn route_meta(&mut self, module: u16, text: &[u8]) -> Result<(), RecordError> {
        let set = self
            .sets
            .get_mut(&module)
            .ok_or(RecordError::UnknownModule(module))?;
        let file = set.get_mut(ModuleFile::DynamicMeta);
        file.append_text(text)
            .map_err(|source| RecordError::Write { module, source })?;
        rotate_if_full(file, self.config.max_file_size, &mut self.stats)
    }

    fn append_record(
        &mut self,
        module: u16,
        dp: ModuleFile,
        text: &[u8],
        image: &[u8],
    ) -> Result<(), RecordError> {
        self.resolve(module)?;
        let set = self
            .sets
            .get_mut(&module)
            .ok_or(RecordError::UnknownModule(module))?;
        let file = set.get_mut(dp);
        file.append_text(text)
            .and_then(|()| file.append_image(image))
            .map_err(|source| RecordError::Write { module, source })?;
        rotate_if_full(file, self.config.max_file_size, &mut self.stats)
    }
}

fn rotate_if_full(
    file: &mut DataFile,
    max_file_size: u64,
    stats: &mut RouterStats,
) -> Result<(), RecordError> {
    if file.written() <= max_file_size {
        return Ok(());
    }
    let from = file.info().seqno;
    file.rotate(Utc::now()).map_err(RecordError::Rotate)?;
    stats.rotations += 1;
    info!(
        module = file.info().module,
        dp = file.info().data_product.id(),
        from,
        seqno = file.info().seqno,
        "rotated data file"
    );
    Ok(())
}

impl Drop for FileRouter {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(error = %e, "flush on drop failed");
        }
    }
}
