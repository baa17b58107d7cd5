//! # Sway library.
//!
//! This library allows other crates in the workspace, and the executables in
//! this crate, to access the sway motion correction controller and its
//! simulation harness.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

/// Sway control module - drives a waist mounted camera onto a desired pose
/// relative to an object, bounding the base velocity demand
pub mod sway_ctrl;

/// Simulation - a planar walking base with lateral sway, used to exercise the
/// controller in closed loop
pub mod sim;
