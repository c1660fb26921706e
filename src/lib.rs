//! Persona-driven recipe generation: recipe text and food photography from
//! Gemini, served over a small axum API.

pub mod config;
pub mod error;
pub mod gemini;
pub mod images;
pub mod models;
pub mod pdf;
pub mod personas;
pub mod pipeline;
pub mod prompts;
pub mod retry;
pub mod routes;
pub mod text;
