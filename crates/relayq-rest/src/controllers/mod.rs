//! REST API controllers.

pub mod queue_controller;
