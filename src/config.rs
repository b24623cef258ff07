use lazy_static::lazy_static;
use parking_lot::RwLock;
use std::env;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Creator recorded when the caller does not name one.
pub const DEFAULT_CREATOR: &str = "cbx";

lazy_static! {
    static ref CONFIG: RwLock<Config> = RwLock::new(Config::new());
}

/// Process-wide settings for the external collaborators and pipelines.
#[derive(Debug, Clone)]
pub struct Config {
    /// ffmpeg executable used for frame extraction and muxing
    pub ffmpeg_path: String,
    /// ffprobe executable used to read stream geometry and frame rate
    pub ffprobe_path: String,
    /// Upper bound on frames compressed/decompressed concurrently
    pub workers: usize,
    /// Creator recorded when an encode call does not name one
    pub default_creator: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ffmpeg_path: String::from("ffmpeg"),
            ffprobe_path: String::from("ffprobe"),
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            default_creator: String::from(DEFAULT_CREATOR),
        }
    }
}

impl Config {
    fn new() -> Self {
        let mut config = Config::default();

        // Environment first, then the config file on top
        if let Ok(path) = env::var("SANCHEZ_FFMPEG") {
            config.apply("ffmpeg_path", &path);
        }
        if let Ok(path) = env::var("SANCHEZ_FFPROBE") {
            config.apply("ffprobe_path", &path);
        }
        if let Ok(workers) = env::var("SANCHEZ_WORKERS") {
            config.apply("workers", &workers);
        }
        if let Ok(creator) = env::var("SANCHEZ_CREATOR") {
            config.apply("default_creator", &creator);
        }

        let config_paths = ["./sanchez.toml", "./config.toml"];
        for path in &config_paths {
            if let Ok(mut file) = File::open(path) {
                let mut content = String::new();
                if file.read_to_string(&mut content).is_ok() {
                    config.apply_file(&content);
                }
            }
        }

        config
    }

    /// Applies flat `key = value` lines. This is a TOML-looking subset, not TOML:
    /// `[section]` headers, unknown keys, full-line `#` comments and blank values
    /// are skipped, and everything after the first `=` is the value, so a
    /// trailing `# comment` becomes part of it.
    fn apply_file(&mut self, content: &str) {
        for line in content.lines() {
            let line = line.trim();
            if line.starts_with('#') || line.starts_with('[') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let value = value.trim().trim_matches('"').trim_matches('\'');
                self.apply(key.trim(), value);
            }
        }
    }

    fn apply(&mut self, key: &str, value: &str) {
        if value.is_empty() {
            return;
        }
        match key {
            "ffmpeg_path" => self.ffmpeg_path = value.to_string(),
            "ffprobe_path" => self.ffprobe_path = value.to_string(),
            "workers" => match value.parse::<usize>() {
                Ok(n) if n > 0 => self.workers = n,
                _ => log::warn!("ignoring invalid workers value {:?}", value),
            },
            "default_creator" => self.default_creator = value.to_string(),
            _ => {}
        }
    }

    /// Re-reads environment and config file.
    pub fn reload() {
        let new_config = Config::new();
        *CONFIG.write() = new_config;
    }
}

/// Returns a snapshot of the current configuration
pub fn get_config() -> Config {
    CONFIG.read().clone()
}

/// Returns the configured ffmpeg executable
pub fn get_ffmpeg_path() -> String {
    CONFIG.read().ffmpeg_path.clone()
}

/// Returns the configured ffprobe executable
pub fn get_ffprobe_path() -> String {
    CONFIG.read().ffprobe_path.clone()
}

/// Returns the configured worker count (always at least 1)
pub fn get_workers() -> usize {
    CONFIG.read().workers.max(1)
}

/// Returns the creator recorded when none is supplied
pub fn get_default_creator() -> String {
    CONFIG.read().default_creator.clone()
}

/// Creates a default config template file if it doesn't exist
pub fn create_default_config_template<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    if !path.as_ref().exists() {
        let template = r#"# Sanchez Configuration
# Copy this file to 'sanchez.toml' and adjust as needed.
# One `key = value` per line. Sections and trailing comments are not supported.

# External tools
ffmpeg_path = "ffmpeg"
ffprobe_path = "ffprobe"

# Frames processed concurrently during encode/extract
workers = 4

# Creator recorded when none is given
default_creator = "cbx"
"#;
        std::fs::write(path, template)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_file_overrides() {
        let mut config = Config::default();
        config.apply_file(
            r#"
# comment
ffmpeg_path = "/opt/ffmpeg/bin/ffmpeg"
workers = '3'
default_creator =
unknown = 1
"#,
        );
        assert_eq!(config.ffmpeg_path, "/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(config.ffprobe_path, "ffprobe");
        assert_eq!(config.workers, 3);
        assert_eq!(config.default_creator, DEFAULT_CREATOR);
    }

    #[test]
    fn test_invalid_workers_ignored() {
        let mut config = Config::default();
        let before = config.workers;
        config.apply_file("workers = 0\nworkers = many");
        assert_eq!(config.workers, before);
    }

    #[test]
    fn test_flat_lines_only() {
        let mut config = Config::default();
        let before = config.workers;
        config.apply_file(
            r#"
[tools]
ffprobe_path = "/usr/bin/ffprobe"
default_creator = "a=b"
workers = 2 # two
"#,
        );
        // The section header is skipped, its keys still apply
        assert_eq!(config.ffprobe_path, "/usr/bin/ffprobe");
        assert_eq!(config.default_creator, "a=b");
        // A trailing comment makes the value invalid
        assert_eq!(config.workers, before);
    }

    #[test]
    fn test_template_is_parseable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sanchez.toml");
        create_default_config_template(&path).unwrap();

        let mut config = Config::default();
        config.apply_file(&std::fs::read_to_string(&path).unwrap());
        assert_eq!(config.workers, 4);
        assert_eq!(config.default_creator, "cbx");
    }
}
