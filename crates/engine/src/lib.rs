//! Grooming-salon scheduling core.
//!
//! Reservations arrive from a backend, are decomposed into timed service
//! tasks and placed on a day/week grid whose slots hold at most two
//! reservations. [`controller::PlacementController`] turns host gestures into
//! [`store::SchedulerStore`] transitions.

pub mod collab;
pub mod config;
pub mod conflict;
pub mod controller;
pub mod decomposer;
pub mod grid;
pub mod model;
pub mod store;
pub mod validator;
