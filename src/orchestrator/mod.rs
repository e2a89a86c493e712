//! Application-level orchestration utilities.
//!
//! This module owns run lifecycle control (start/resume, stop, cancel) and
//! post-run processing such as exports. CLI layers call into this module to
//! keep responsibilities separated.

mod controller;
mod post_process;

pub(crate) use controller::{run_controller, RunRequest, UiCommand};
pub(crate) use post_process::{process_run_completion, ExportTargets};
