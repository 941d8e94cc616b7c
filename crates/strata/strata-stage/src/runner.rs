use crate::cancel::CancelToken;
use crate::error::StageError;
use crate::status::{StageState, StatusBoard};
use std::time::Duration;
use strata_databuf::{Databuf, DatabufError, WaitStatus, next_index};
use strata_events::StageBlock;
use tracing::{debug, error, info, warn};

const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_millis(250);

/// Middle stage: one input block becomes one output block.
pub trait Transform {
    type In: StageBlock;
    type Out: StageBlock;

    /// `output` arrives cleared and stamped with the transfer counter.
    fn transform(&mut self, input: &Self::In, output: &mut Self::Out) -> Result<(), StageError>;

    fn on_shutdown(&mut self) {}
}

/// Terminal stage.
pub trait Sink {
    type In: StageBlock;

    /// Runs at the top of every iteration and on every wait timeout while
    /// idle.
    fn tick(&mut self) -> Result<(), StageError> {
        Ok(())
    }

    fn consume(&mut self, input: &Self::In) -> Result<(), StageError>;

    /// Releases everything the sink owns. Runs on every exit path.
    fn on_shutdown(&mut self) {}
}

/// First stage.
pub trait Source {
    type Out: StageBlock;

    /// Fills a cleared block. `Ok(false)` leaves the slot unpublished.
    fn fill(&mut self, output: &mut Self::Out, cancel: &CancelToken) -> Result<bool, StageError>;

    fn on_shutdown(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageExit {
    /// A block carrying the interrupt flag was processed.
    Interrupted,
    /// The cancel token was observed.
    Cancelled,
}

/// Drives one stage over its databufs and publishes its status keys
/// (`<PREFIX>STAT`, `<PREFIX>BLKIN`, `<PREFIX>BLKOUT`, `<PREFIX>MCNT`).
pub struct StageRunner {
    name: String,
    prefix: String,
    status: StatusBoard,
    cancel: CancelToken,
    downstream: Option<CancelToken>,
    wait_timeout: Duration,
}

impl StageRunner {
    pub fn new(
        name: impl Into<String>,
        prefix: impl Into<String>,
        status: StatusBoard,
        cancel: CancelToken,
    ) -> Self {
        Self {
            name: name.into(),
            prefix: prefix.into(),
            status,
            cancel,
            downstream: None,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }

    pub fn with_wait_timeout(mut self, wait_timeout: Duration) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }

    /// Token shared by the stages below a source. Once it is set, a
    /// cancelled source stops trying to send the interrupt flag.
    pub fn with_downstream_cancel(mut self, downstream: CancelToken) -> Self {
        self.downstream = Some(downstream);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn run_transform<X: Transform>(
        &self,
        stage: &mut X,
        input: &Databuf<X::In>,
        output: &Databuf<X::Out>,
    ) -> Result<StageExit, StageError> {
        info!(stage = %self.name, "stage started");
        let result = self.transform_loop(stage, input, output);
        stage.on_shutdown();
        self.finish(&result);
        result
    }

    pub fn run_sink<S: Sink>(
        &self,
        stage: &mut S,
        input: &Databuf<S::In>,
    ) -> Result<StageExit, StageError> {
        info!(stage = %self.name, "stage started");
        let result = self.sink_loop(stage, input);
        stage.on_shutdown();
        self.finish(&result);
        result
    }

    /// On cancellation the source publishes one last empty block with the
    /// interrupt flag set so the stages below drain and stop. It waits as
    /// long as it takes for a free slot, unless the downstream token is set.
    pub fn run_source<S: Source>(
        &self,
        stage: &mut S,
        output: &Databuf<S::Out>,
    ) -> Result<StageExit, StageError> {
        info!(stage = %self.name, "stage started");
        let result = self.source_loop(stage, output);
        stage.on_shutdown();
        self.finish(&result);
        result
    }

    fn transform_loop<X: Transform>(
        &self,
        stage: &mut X,
        input: &Databuf<X::In>,
        output: &Databuf<X::Out>,
    ) -> Result<StageExit, StageError> {
        let mut in_slot = 0;
        let mut out_slot = 0;
        let mut mcnt = 0u64;

        loop {
            if self.cancel.is_cancelled() {
                return Ok(StageExit::Cancelled);
            }
            self.publish_state(StageState::Waiting);
            if !self.wait(|t| input.wait_filled(in_slot, t), || Ok(()))? {
                return Ok(StageExit::Cancelled);
            }
            if !self.wait(|t| output.wait_free(out_slot, t), || Ok(()))? {
                return Ok(StageExit::Cancelled);
            }

            self.publish_state(StageState::Processing);
            let nested = input.with_filled_block(in_slot, |src| {
                output.with_free_block(out_slot, |dst| {
                    dst.clear();
                    dst.set_mcnt(mcnt);
                    stage.transform(src, dst)?;
                    dst.set_interrupted(src.interrupted());
                    Ok::<bool, StageError>(src.interrupted())
                })
            });
            let interrupted = self.db(nested).and_then(|r| self.db(r))??;

            self.db(output.set_filled(out_slot))?;
            self.db(input.set_free(in_slot))?;
            out_slot = next_index(out_slot, output.n_block());
            in_slot = next_index(in_slot, input.n_block());
            mcnt += 1;
            self.publish_progress(Some(in_slot), Some(out_slot), mcnt);
            debug!(stage = %self.name, mcnt, "block transferred");

            if interrupted {
                info!(stage = %self.name, mcnt, "interrupt flag forwarded");
                return Ok(StageExit::Interrupted);
            }
        }
    }

    fn sink_loop<S: Sink>(
        &self,
        stage: &mut S,
        input: &Databuf<S::In>,
    ) -> Result<StageExit, StageError> {
        let mut slot = 0;
        let mut mcnt = 0u64;

        loop {
            if self.cancel.is_cancelled() {
                return Ok(StageExit::Cancelled);
            }
            stage.tick()?;
            self.publish_state(StageState::Waiting);
            if !self.wait(|t| input.wait_filled(slot, t), || stage.tick())? {
                return Ok(StageExit::Cancelled);
            }

            self.publish_state(StageState::Processing);
            let interrupted = self.db(input.with_filled_block(slot, |blk| {
                stage.consume(blk).map(|()| blk.interrupted())
            }))??;

            self.db(input.set_free(slot))?;
            slot = next_index(slot, input.n_block());
            mcnt += 1;
            self.publish_progress(Some(slot), None, mcnt);
            debug!(stage = %self.name, mcnt, "block consumed");

            if interrupted {
                info!(stage = %self.name, mcnt, "interrupt flag received");
                return Ok(StageExit::Interrupted);
            }
        }
    }

    fn source_loop<S: Source>(
        &self,
        stage: &mut S,
        output: &Databuf<S::Out>,
    ) -> Result<StageExit, StageError> {
        let mut slot = 0;
        let mut mcnt = 0u64;

        loop {
            if self.cancel.is_cancelled() {
                self.send_interrupt(output, slot, mcnt)?;
                return Ok(StageExit::Cancelled);
            }
            self.publish_state(StageState::Waiting);
            if !self.wait(|t| output.wait_free(slot, t), || Ok(()))? {
                self.send_interrupt(output, slot, mcnt)?;
                return Ok(StageExit::Cancelled);
            }

            self.publish_state(StageState::Processing);
            let publish = self.db(output.with_free_block(slot, |blk| {
                blk.clear();
                blk.set_mcnt(mcnt);
                stage.fill(blk, &self.cancel)
            }))??;
            if !publish {
                continue;
            }

            self.db(output.set_filled(slot))?;
            slot = next_index(slot, output.n_block());
            mcnt += 1;
            self.publish_progress(None, Some(slot), mcnt);
            debug!(stage = %self.name, mcnt, "block published");
        }
    }

    fn send_interrupt<T: StageBlock>(
        &self,
        output: &Databuf<T>,
        slot: usize,
        mcnt: u64,
    ) -> Result<(), StageError> {
        loop {
            match self.db(output.wait_free(slot, self.wait_timeout))? {
                WaitStatus::Ready => {
                    self.db(output.with_free_block(slot, |blk| {
                        blk.clear();
                        blk.set_mcnt(mcnt);
                        blk.set_interrupted(true);
                    }))?;
                    self.db(output.set_filled(slot))?;
                    info!(stage = %self.name, slot, "interrupt flag sent downstream");
                    return Ok(());
                }
                WaitStatus::TimedOut => {
                    self.publish_state(StageState::Blocked);
                    if self.downstream.as_ref().is_some_and(CancelToken::is_cancelled) {
                        warn!(
                            stage = %self.name,
                            slot,
                            "downstream cancelled, interrupt flag not sent"
                        );
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Retries `wait` on timeout until ready, running `on_timeout` after
    /// each timeout. Returns `false` when the cancel token is observed
    /// during a timeout.
    fn wait(
        &self,
        wait: impl Fn(Duration) -> Result<WaitStatus, DatabufError>,
        mut on_timeout: impl FnMut() -> Result<(), StageError>,
    ) -> Result<bool, StageError> {
        loop {
            match self.db(wait(self.wait_timeout))? {
                WaitStatus::Ready => return Ok(true),
                WaitStatus::TimedOut => {
                    self.publish_state(StageState::Blocked);
                    if self.cancel.is_cancelled() {
                        return Ok(false);
                    }
                    on_timeout()?;
                }
            }
        }
    }

    fn db<T>(&self, r: Result<T, DatabufError>) -> Result<T, StageError> {
        r.map_err(|source| StageError::Databuf {
            stage: self.name.clone(),
            source,
        })
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}{}", self.prefix, suffix)
    }

    fn publish_state(&self, state: StageState) {
        self.status.put(self.key("STAT"), state);
    }

    fn publish_progress(&self, in_slot: Option<usize>, out_slot: Option<usize>, mcnt: u64) {
        if let Some(slot) = in_slot {
            self.status.put(self.key("BLKIN"), slot);
        }
        if let Some(slot) = out_slot {
            self.status.put(self.key("BLKOUT"), slot);
        }
        self.status.put(self.key("MCNT"), mcnt);
    }

    fn finish(&self, result: &Result<StageExit, StageError>) {
        self.publish_state(StageState::Stopped);
        match result {
            Ok(exit) => info!(stage = %self.name, ?exit, "stage stopped"),
            Err(e) => error!(stage = %self.name, error = %e, "stage terminated"),
        }
    }
}
