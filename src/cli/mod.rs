pub mod app;
pub mod demo;
