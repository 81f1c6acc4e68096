//! Human-readable rendering of loading progress and the fetched image.

use anyhow::{Context, Result};
use performer_core::{FetchedImage, LoadingState};
use std::path::Path;

/// One line describing `state`.
pub fn describe(state: &LoadingState<FetchedImage>) -> String {
    match state {
        LoadingState::Idle => "idle".to_string(),
        LoadingState::Loading {
            show_no_network_hint: false,
        } => "loading".to_string(),
        LoadingState::Loading {
            show_no_network_hint: true,
        } => "loading (no network connection)".to_string(),
        LoadingState::Success(image) => format!(
            "success: {} bytes of {} from {}",
            image.len(),
            image.format.mime_type(),
            image.url
        ),
        LoadingState::Failure { message } => format!("failure: {}", message),
    }
}

/// Write the image bytes to `path`.
pub async fn write_image(path: &Path, image: &FetchedImage) -> Result<()> {
    tokio::fs::write(path, &image.bytes)
        .await
        .with_context(|| format!("Failed to write image to {}", path.display()))
}
