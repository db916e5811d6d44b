//! Glyphforge synthesizes labeled training images for OCR.
//!
//! The pipeline is plan-then-execute: a [`plan::Plan`] is the fully concrete
//! parameter vector for one image, sampled once from a batch specification,
//! and the executor renders it deterministically. The scheduler streams tasks
//! through a parallel worker pool while keeping every output a pure function
//! of the configuration, the master seed, and the image index.
//!
//! - Load a [`config::BatchConfig`] and validate it
//! - Call [`schedule::run_generation`]
//! - Or drive a single image with [`plan::build_plan`] and
//!   [`execute::generate_from_plan`]
#![forbid(unsafe_code)]

pub mod augment;
pub mod canvas;
pub mod config;
pub mod corpus;
pub mod effects;
pub mod execute;
pub mod foundation;
pub mod health;
pub mod label;
pub mod layout;
pub mod plan;
pub mod sample;
pub mod schedule;
pub mod shape;

#[doc(hidden)]
pub mod testkit;

pub use config::{BatchConfig, BatchSpec, ConfigReport, ResourceRoots, load_config, validate_config};
pub use execute::{GenerationOutput, generate_from_plan};
pub use foundation::core::{CharacterBox, Direction, Rgb, TextAlignment};
pub use foundation::error::{ForgeError, ForgeResult};
pub use health::{HealthSnapshot, ResourceHealthTracker, TrackerOptions};
pub use label::GenerationRecord;
pub use plan::{Plan, build_plan, plan_batch};
pub use sample::{Distribution, sample, sample_batch};
pub use schedule::{
    GenerationOptions, GenerationSummary, RunError, SkippedTask, run_generation,
};
pub use shape::{DiskFontSource, FontEngine, FontSource, OutlineFontEngine};
