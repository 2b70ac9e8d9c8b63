//! Client-side engine that keeps multi-session agent conversations correct
//! while they are updated by a push-event stream, and persists them without
//! blocking the live view.

pub mod engine;
pub mod error;
pub mod managers;
pub mod merge;
pub mod models;
pub mod repositories;
pub mod services;
pub mod settings;

pub use engine::{EngineParts, ThreadlineEngine};
pub use error::{EngineError, EngineResult};
