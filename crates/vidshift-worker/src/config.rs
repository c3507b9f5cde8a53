//! Service configuration.

use std::path::{Path, PathBuf};

use vidshift_models::JobId;

/// Service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Directory uploads are saved to
    pub upload_dir: PathBuf,
    /// Directory transformed outputs are written to
    pub processed_dir: PathBuf,
    /// Accepted upload extensions (lowercase, no dot)
    pub allowed_extensions: Vec<String>,
    /// Maximum accepted upload size
    pub max_upload_bytes: u64,
    /// Number of video files kept by retention
    pub max_stored_videos: usize,
    /// Redis URL for the job store
    pub redis_url: String,
    /// Buffered events per realtime subscriber
    pub progress_channel_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("static/uploads"),
            processed_dir: PathBuf::from("static/processed"),
            allowed_extensions: vec!["mp4".into(), "avi".into(), "mov".into(), "mkv".into()],
            max_upload_bytes: 100 * 1024 * 1024, // 100 MB
            max_stored_videos: 3,
            redis_url: "redis://localhost:6379".to_string(),
            progress_channel_capacity: 256,
        }
    }
}

impl ServiceConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            upload_dir: std::env::var("UPLOAD_FOLDER")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            processed_dir: std::env::var("PROCESSED_FOLDER")
                .map(PathBuf::from)
                .unwrap_or(defaults.processed_dir),
            allowed_extensions: std::env::var("ALLOWED_EXTENSIONS")
                .map(|s| parse_extensions(&s))
                .ok()
                .filter(|exts| !exts.is_empty())
                .unwrap_or(defaults.allowed_extensions),
            max_upload_bytes: std::env::var("MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_upload_bytes),
            max_stored_videos: std::env::var("MAX_STORED_VIDEOS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_stored_videos),
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            progress_channel_capacity: std::env::var("PROGRESS_CHANNEL_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.progress_channel_capacity),
        }
    }

    /// Same settings with different folders.
    pub fn with_dirs(mut self, upload_dir: impl Into<PathBuf>, processed_dir: impl Into<PathBuf>) -> Self {
        self.upload_dir = upload_dir.into();
        self.processed_dir = processed_dir.into();
        self
    }

    /// Whether the file name carries an accepted extension.
    pub fn is_allowed(&self, filename: &str) -> bool {
        extension_of(filename)
            .map(|ext| self.allowed_extensions.iter().any(|a| *a == ext))
            .unwrap_or(false)
    }

    /// Upload location: `{upload_dir}/{id}_{filename}`.
    pub fn upload_path_for(&self, id: &JobId, filename: &str) -> PathBuf {
        self.upload_dir.join(format!("{}_{}", id, filename))
    }

    /// Output file name: `processed_{id}_{filename}`.
    pub fn output_filename_for(&self, id: &JobId, filename: &str) -> String {
        format!("processed_{}_{}", id, filename)
    }

    /// Output location in the processed folder.
    pub fn output_path_for(&self, id: &JobId, filename: &str) -> PathBuf {
        self.processed_dir.join(self.output_filename_for(id, filename))
    }

    /// Folders scanned by retention.
    pub fn storage_dirs(&self) -> Vec<&Path> {
        vec![self.upload_dir.as_path(), self.processed_dir.as_path()]
    }

    /// Create both folders if missing.
    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.upload_dir).await?;
        tokio::fs::create_dir_all(&self.processed_dir).await
    }
}

/// Lowercase extension without the dot.
pub fn extension_of(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn parse_extensions(s: &str) -> Vec<String> {
    s.split(',')
        .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_extensions() {
        let config = ServiceConfig::default();
        assert!(config.is_allowed("clip.mp4"));
        assert!(config.is_allowed("CLIP.MOV"));
        assert!(!config.is_allowed("clip.webm"));
        assert!(!config.is_allowed("mp4"));
        assert!(!config.is_allowed(".mp4"));
    }

    #[test]
    fn test_naming() {
        let config = ServiceConfig::default().with_dirs("/u", "/p");
        let id = JobId::from_string("abc");
        assert_eq!(config.upload_path_for(&id, "a.mp4"), PathBuf::from("/u/abc_a.mp4"));
        assert_eq!(config.output_filename_for(&id, "a.mp4"), "processed_abc_a.mp4");
        assert_eq!(config.output_path_for(&id, "a.mp4"), PathBuf::from("/p/processed_abc_a.mp4"));
    }

    #[test]
    fn test_parse_extensions() {
        assert_eq!(parse_extensions(" .MP4, webm ,,"), vec!["mp4", "webm"]);
    }
}
