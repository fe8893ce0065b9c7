//! Command-line entry points.

pub mod doctor;
pub mod languages;
pub mod run;
