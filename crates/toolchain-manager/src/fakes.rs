//! In-memory downloader (testing only)

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::acquire::Downloader;

/// Serves fixed bodies for known URLs; every other URL fails like a 404.
#[derive(Default)]
pub struct StaticDownloader {
    bodies: HashMap<String, Vec<u8>>,
    requested: Mutex<Vec<String>>,
}

impl StaticDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(mut self, url: &str, body: &[u8]) -> Self {
        self.bodies.insert(url.to_string(), body.to_vec());
        self
    }

    /// URLs requested so far.
    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl Downloader for StaticDownloader {
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, String> {
        self.requested.lock().unwrap().push(url.to_string());
        let body = self
            .bodies
            .get(url)
            .ok_or_else(|| "HTTP status client error (404 Not Found)".to_string())?;
        tokio::fs::write(dest, body).await.map_err(|e| e.to_string())?;
        Ok(body.len() as u64)
    }
}
