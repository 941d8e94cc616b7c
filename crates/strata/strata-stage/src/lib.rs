//! Stage loop shared by every thread of the pipeline.
//!
//! A stage owns one end of one or two databufs and moves blocks between
//! them in circular slot order. Progress is published to a [`StatusBoard`];
//! shutdown travels downstream as the interrupt flag of a block, or arrives
//! out of band through a [`CancelToken`].

mod cancel;
mod error;
mod runner;
mod status;

pub use cancel::CancelToken;
pub use error::StageError;
pub use runner::{Sink, Source, StageExit, StageRunner, Transform};
pub use status::{StageState, StatusBoard};
