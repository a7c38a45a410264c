// Tracklab - audio task dispatch service
//
// This crate provides the job-dispatch backend for the studio: an HTTP
// gateway accepts audio-processing submissions, a durable queue carries
// them to worker processes, and clients poll results by task id.
// The audio algorithms themselves are external collaborators registered
// as task handlers.

pub mod config;
pub mod jobs;
pub mod server;
pub mod tasks;

pub use config::*;
