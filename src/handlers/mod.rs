//! HTTP handlers for resources.

pub mod resource;
