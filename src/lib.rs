//! HyperView - interactive exploration of high-dimensional experiment tables
//!
//! Rows loaded from CSV, JSON or a server are shown in linked views
//! (parallel coordinates, XY scatter, distribution, table) that share one
//! selection and highlight state owned by [`state::Orchestrator`].

pub mod color;
pub mod config;
pub mod error;
pub mod export;
pub mod filter;
pub mod gui;
pub mod infer;
pub mod lineage;
pub mod logging;
pub mod model;
pub mod persist;
pub mod provider;
pub mod render;
pub mod scale;
pub mod schedule;
pub mod selection;
pub mod state;
pub mod views;
