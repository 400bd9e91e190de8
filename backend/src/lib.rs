//! # Timetable Service
//!
//! Generation-job pipeline and artifact manager for school timetables.
//!
//! A client uploads a roster workbook (courses, teachers, classes). The
//! service hands it to an external generator executable, validates the
//! workbook the generator writes, returns it to the client and keeps a copy
//! as the "latest" snapshot. The snapshot can later be read back as
//! structured per-teacher and per-class timetables.
//!
//! ## Architecture
//!
//! - [`workbook`]: `.xlsx` codec (sheets of string cells)
//! - [`schedule`]: timetable model and teacher/class sheet classifier
//! - [`generator`]: supervision of the external generator process
//! - [`snapshot`]: single-slot store for the latest generated workbook
//! - [`services`]: generation pipeline, request tracking, snapshot reads
//! - [`config`]: TOML configuration with environment overrides
//! - [`http`]: Axum-based HTTP server and request handlers

pub mod config;
pub mod generator;
pub mod schedule;
pub mod services;
pub mod snapshot;
pub mod workbook;

#[cfg(feature = "http-server")]
pub mod http;
