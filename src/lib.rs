//! Aligns the outputs of one fire experiment (multispectral camera images,
//! LED-extinction simulation, MIREX gas sensors, temperature array) on a
//! common experiment time axis and answers slicing queries over them.

pub mod config;
pub mod data;
pub mod error;
pub mod experiment;
pub mod sources;

pub use config::ExperimentConfig;
pub use data::model::{Axis, ChannelId, Column, GeometryAxis, Label, Table};
pub use data::resample::{Alignment, SmoothingMode, SmoothingSpec, WindowEdge};
pub use data::shift::TimeShift;
pub use error::{Error, Result};
pub use experiment::Experiment;
