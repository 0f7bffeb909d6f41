// rview - A minimal keyboard-driven image viewer for Wayland
// Displays one image in a resizable window with keyboard zoom and pan

mod app;
mod cli;
mod image_loader;
mod repeat;
mod shm_renderer;
mod view;
mod wayland;
mod wgpu_renderer;

use anyhow::{Context, Result};
use log::{error, info};
use std::process::ExitCode;

fn main() -> ExitCode {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("ERROR! {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // Parse command line arguments
    let image_path = cli::parse_args()?;

    info!("Starting rview with image: {:?}", image_path);

    // Load the image
    let image = image_loader::load_image(&image_path).context("Loading image failed")?;

    wayland::run(image, &image_path)
}
