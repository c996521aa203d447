mod camera;
mod controller;
mod device;
mod feed;
mod prediction;
mod predictor;
mod routes;
mod server;
mod stream;
mod telemetry;

pub mod app;
pub mod config;

pub use app::start_app;
