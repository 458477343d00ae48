//! Utility functions
//!
use std::{fs::File, io::Cursor, path::Path};

use anyhow::Result;
use reqwest::Client;

/// Download a file from a URL to a given filepath.
///
/// Responses with an error status are rejected before anything is written.
pub async fn download_file(client: &Client, url: &str, filepath: impl AsRef<Path>) -> Result<()> {
    let resp = client.get(url).send().await?.error_for_status()?;
    let mut content = Cursor::new(resp.bytes().await?);

    let mut file = File::create(filepath)?;
    std::io::copy(&mut content, &mut file)?;

    Ok(())
}
