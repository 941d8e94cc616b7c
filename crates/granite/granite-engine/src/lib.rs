use chrono::Utc;
use granite_meta::{KvStore, MetadataMirror};
use granite_store::{FileRouter, RecordError, RouterConfig, StoreError};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use strata_config::{ConfigError, load_module_list};
use strata_events::OutputBlock;
use strata_stage::{Sink, StageError, StatusBoard};
use tracing::{error, info, warn};

pub const SAVELOC_KEY: &str = "SAVELOC";
pub const CONFIG_KEY: &str = "CONFIG";
pub const MAXFILESIZE_KEY: &str = "MAXFILESIZE";
pub const OUTDROP_KEY: &str = "OUTDROP";

const STAGE: &str = "output";

/// Operator request to start fresh files, honored between blocks.
#[derive(Clone, Debug, Default)]
pub struct RotateRequest(Arc<AtomicBool>);

impl RotateRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Consumes a pending request.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

/// Runtime keys the output stage reads once from the status board.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSettings {
    pub save_location: PathBuf,
    pub module_config: PathBuf,
    pub max_file_size: u64,
}

impl OutputSettings {
    pub fn from_status(status: &StatusBoard) -> Option<Self> {
        Some(Self {
            save_location: status.get(SAVELOC_KEY)?.into(),
            module_config: status.get(CONFIG_KEY)?.into(),
            max_file_size: status.get_parsed(MAXFILESIZE_KEY)?,
        })
    }

    pub fn publish(&self, status: &StatusBoard) {
        status.put(SAVELOC_KEY, self.save_location.display());
        status.put(CONFIG_KEY, self.module_config.display());
        status.put(MAXFILESIZE_KEY, self.max_file_size);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("status board lacks SAVELOC, CONFIG or a numeric MAXFILESIZE")]
    MissingSettings,

    #[error("failed to load module configuration")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Terminal stage: writes output blocks through the file router and mirrors
/// metadata once per block.
pub struct OutputStage<S> {
    router: FileRouter,
    mirror: MetadataMirror<S>,
    rotate: RotateRequest,
    status: StatusBoard,
}

impl<S: KvStore> OutputStage<S> {
    /// Opens the session, a file set per configured module, and takes an
    /// initial metadata snapshot.
    pub fn new(
        status: StatusBoard,
        observatory: &str,
        dome: u32,
        auto_create: bool,
        store: S,
        rotate: RotateRequest,
    ) -> Result<Self, OutputError> {
        let settings = OutputSettings::from_status(&status).ok_or(OutputError::MissingSettings)?;
        info!(
            save_location = %settings.save_location.display(),
            module_config = %settings.module_config.display(),
            max_file_size = settings.max_file_size,
            "output stage settings"
        );

        let modules = load_module_list(&settings.module_config)?;
        let mut router = FileRouter::new(
            RouterConfig {
                save_location: settings.save_location,
                observatory: observatory.to_string(),
                dome,
                max_file_size: settings.max_file_size,
                auto_create,
            },
            Utc::now(),
        )?;
        router.open_modules(&modules)?;
        info!(modules = ?modules, "configured file sets open");

        let mut mirror = MetadataMirror::new(store);
        mirror.poll(&mut router);
        status.put(OUTDROP_KEY, 0);

        Ok(Self {
            router,
            mirror,
            rotate,
            status,
        })
    }

    pub fn router(&self) -> &FileRouter {
        &self.router
    }

    pub fn mirror(&self) -> &MetadataMirror<S> {
        &self.mirror
    }

    fn record(&self, result: Result<(), RecordError>) -> Result<(), StageError> {
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => Err(StageError::fatal(STAGE, e)),
            Err(e) => {
                warn!(error = %e, "record dropped");
                Ok(())
            }
        }
    }
}

impl<S: KvStore> Sink for OutputStage<S> {
    type In = OutputBlock;

    fn tick(&mut self) -> Result<(), StageError> {
        if self.rotate.take() {
            info!("rotating all files on request");
            self.router
                .rotate_all()
                .map_err(|e| StageError::fatal(STAGE, e))?;
        }
        Ok(())
    }

    fn consume(&mut self, block: &OutputBlock) -> Result<(), StageError> {
        self.mirror.poll(&mut self.router);
        for (header, pixels) in block.images() {
            let result = self.router.write_image(header, pixels);
            self.record(result)?;
        }
        for (header, pixels) in block.coincidences() {
            let result = self.router.write_coinc(header, pixels);
            self.record(result)?;
        }
        self.status.put(OUTDROP_KEY, self.router.stats().records_dropped);
        Ok(())
    }

    fn on_shutdown(&mut self) {
        if let Err(e) = self.router.close_all() {
            error!(error = %e, "closing data files failed");
        }
    }
}
