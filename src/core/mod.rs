pub mod app;
pub mod commands;
pub mod config;
pub mod conversation;
pub mod llm;
pub mod models;
pub mod tokens;
pub mod tools;
