pub mod config;
pub mod logging;

pub mod archive;
pub mod control;
pub mod job;
pub mod path;
pub mod postprocess;
pub mod predicate;
pub mod template;
pub mod transfer;
pub mod value;
