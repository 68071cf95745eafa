//! HTTP surface: handlers and DTO models. Routes are assembled in
//! [`crate::build_router`].

pub mod handlers;
pub mod models;
