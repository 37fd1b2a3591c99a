use std::collections::HashMap;
use std::path::{Path, PathBuf};
use anyhow::{Result, Context, anyhow};
use tracing::info;

const DEFAULT_CHANNELS: &[&str] = &[
    "https://t.me/CheMed123",
    "https://t.me/lobelia4cosmetics",
    "https://t.me/tikvahpharma",
];

const DEFAULT_TRANSFORM_COMMANDS: &str = "dbt debug;dbt clean;dbt run;dbt test";

/// API id/hash pair the gateway session is opened with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_id: String,
    pub api_hash: String,
}

/// Everything the pipeline needs, resolved once at process entry.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_id: Option<String>,
    pub api_hash: Option<String>,
    pub gateway_url: String,
    pub session_name: String,
    pub channels: Vec<String>,
    pub page_size: usize,
    pub messages_root: PathBuf,
    pub images_root: PathBuf,
    pub database_path: PathBuf,
    pub model_path: PathBuf,
    pub model_url: Option<String>,
    pub detection_confidence: f32,
    pub transform_dir: PathBuf,
    pub transform_commands: Vec<Vec<String>>,
    pub bind_addr: String,
}

impl Config {
    /// Reads `env_file` if it exists and overlays the process environment on top.
    pub fn load(env_file: &Path) -> Result<Self> {
        let mut vars = if env_file.exists() {
            let vars = load_env_file(env_file)?;
            info!("Loaded {} settings from {:?}", vars.len(), env_file);
            vars
        } else {
            HashMap::new()
        };
        vars.extend(std::env::vars());
        Self::from_vars(&vars)
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let lake_root = PathBuf::from(get("DATA_LAKE_ROOT").unwrap_or_else(|| "data/raw".into()));

        let channels = match get("TELEGRAM_CHANNELS") {
            Some(list) => list
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => DEFAULT_CHANNELS.iter().map(|s| s.to_string()).collect(),
        };

        let page_size = match get("SCRAPE_PAGE_SIZE") {
            Some(v) => v
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| anyhow!("SCRAPE_PAGE_SIZE must be a positive integer, got '{}'", v))?,
            None => 100,
        };

        let detection_confidence = match get("DETECTION_CONFIDENCE") {
            Some(v) => v
                .parse::<f32>()
                .ok()
                .filter(|c| (0.0..=1.0).contains(c))
                .ok_or_else(|| anyhow!("DETECTION_CONFIDENCE must be between 0 and 1, got '{}'", v))?,
            None => 0.25,
        };

        let transform_commands = parse_commands(
            &get("TRANSFORM_COMMANDS").unwrap_or_else(|| DEFAULT_TRANSFORM_COMMANDS.into()),
        );

        Ok(Self {
            api_id: get("TELEGRAM_API_ID"),
            api_hash: get("TELEGRAM_API_HASH"),
            gateway_url: get("TELEGRAM_GATEWAY_URL").unwrap_or_else(|| "http://localhost:8081".into()),
            session_name: get("TELEGRAM_SESSION_NAME")
                .unwrap_or_else(|| "telegram_scraper_session".into()),
            channels,
            page_size,
            messages_root: lake_root.join("telegram_messages"),
            images_root: lake_root.join("images"),
            database_path: PathBuf::from(
                get("DATABASE_PATH").unwrap_or_else(|| "data/warehouse.db".into()),
            ),
            model_path: PathBuf::from(
                get("YOLO_MODEL_PATH").unwrap_or_else(|| "yolo_models/yolov8m.onnx".into()),
            ),
            model_url: get("YOLO_MODEL_URL"),
            detection_confidence,
            transform_dir: PathBuf::from(get("TRANSFORM_DIR").unwrap_or_else(|| "dbt".into())),
            transform_commands,
            bind_addr: get("API_BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8000".into()),
        })
    }

    pub fn credentials(&self) -> Result<Credentials> {
        match (&self.api_id, &self.api_hash) {
            (Some(api_id), Some(api_hash)) => Ok(Credentials {
                api_id: api_id.clone(),
                api_hash: api_hash.clone(),
            }),
            _ => Err(anyhow!(
                "TELEGRAM_API_ID and TELEGRAM_API_HASH must be set in the environment or .env file"
            )),
        }
    }
}

/// `;` separates commands, whitespace separates arguments.
fn parse_commands(raw: &str) -> Vec<Vec<String>> {
    raw.split(';')
        .map(|cmd| cmd.split_whitespace().map(str::to_string).collect::<Vec<_>>())
        .filter(|argv| !argv.is_empty())
        .collect()
}

fn load_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let entries = dotenvy::from_path_iter(path).with_context(|| format!("Failed to open {:?}", path))?;
    let vars = entries
        .collect::<Result<HashMap<_, _>, _>>()
        .with_context(|| format!("Failed to parse {:?}", path))?;
    Ok(vars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_defaults() -> Result<()> {
        let config = Config::from_vars(&HashMap::new())?;

        assert_eq!(config.channels.len(), 3);
        assert_eq!(config.messages_root, PathBuf::from("data/raw/telegram_messages"));
        assert_eq!(config.images_root, PathBuf::from("data/raw/images"));
        assert_eq!(config.page_size, 100);
        assert_eq!(config.transform_commands.len(), 4);
        assert_eq!(config.transform_commands[2], vec!["dbt", "run"]);
        assert!(config.model_url.is_none());
        Ok(())
    }

    #[test]
    fn test_missing_credentials() -> Result<()> {
        let config = Config::from_vars(&vars(&[("TELEGRAM_API_ID", "12345")]))?;
        let err = config.credentials().unwrap_err();
        assert!(err.to_string().contains("TELEGRAM_API_HASH"));

        let config = Config::from_vars(&vars(&[
            ("TELEGRAM_API_ID", "12345"),
            ("TELEGRAM_API_HASH", "abcdef"),
        ]))?;
        assert_eq!(config.credentials()?.api_hash, "abcdef");
        Ok(())
    }

    #[test]
    fn test_invalid_page_size() {
        let result = Config::from_vars(&vars(&[("SCRAPE_PAGE_SIZE", "zero")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_env_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(".env");
        fs::write(
            &path,
            "# comment\nTELEGRAM_API_ID=42\nexport TELEGRAM_API_HASH=\"secret\"\nTELEGRAM_CHANNELS='https://t.me/a, https://t.me/b'\nCHANNEL_LAKE_ENV_FILE_ONLY=1\n",
        )?;

        let loaded = load_env_file(&path)?;
        assert_eq!(loaded["TELEGRAM_API_ID"], "42");
        assert_eq!(loaded["TELEGRAM_API_HASH"], "secret");
        // Read into the map only; the process environment is left alone.
        assert!(std::env::var("CHANNEL_LAKE_ENV_FILE_ONLY").is_err());

        let config = Config::from_vars(&loaded)?;
        assert_eq!(config.channels, vec!["https://t.me/a", "https://t.me/b"]);
        Ok(())
    }
}
