#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::struct_field_names,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use
)]

pub mod agent;
pub mod calendar;
pub mod channels;
pub mod config;
pub mod error;
pub mod history;
pub mod llm;
pub mod notion;
pub mod prompt;
pub mod scheduler;
pub mod store;
pub mod tools;

pub use config::Config;
pub use error::{PaiError, Result};
