//! Core algorithms: point-cloud registration.

pub mod registration;
