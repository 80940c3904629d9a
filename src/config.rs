//! Configuration Module
//!
//! 環境変数（と任意の `.env`）から設定を読み込む。
//! 不正値・欠落値で起動を止めることはせず、デフォルトに戻して
//! `warnings` に記録する。warnings は `/api/health` で返し、
//! ダッシュボードの警告バナーに表示される。
//!
//! | Variable | Default |
//! |----------|---------|
//! | `DATABASE_URL` | `sqlite:data/reseller.db` |
//! | `ADMIN_ACCESS_KEY` | (none) |
//! | `BIND_ADDR` | `0.0.0.0:3000` |
//! | `DATA_DIR` | `data` |
//! | `PUBLIC_BASE_URL` | `http://localhost:3000` |
//! | `MAX_UPLOAD_MB` | `10` |

use std::net::SocketAddr;
use std::path::PathBuf;

const DEFAULT_DATABASE_URL: &str = "sqlite:data/reseller.db";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:3000";
const DEFAULT_MAX_UPLOAD_MB: usize = 10;
const MIN_ACCESS_KEY_LEN: usize = 16;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    /// None のとき API は無認証
    pub access_key: Option<String>,
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub public_base_url: String,
    pub max_upload_bytes: usize,
    /// 起動時の設定警告（バナー表示用）
    pub warnings: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl AppConfig {
    /// プロセス環境から読み込み
    pub fn from_env() -> Self {
        // .env は任意
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 任意のキー参照関数から読み込み（テスト用にも使う）
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut warnings = Vec::new();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_url = match get("DATABASE_URL") {
            Some(url) if url.starts_with("sqlite:") => url,
            Some(url) => {
                warnings.push(format!(
                    "DATABASE_URL '{}' is not a sqlite URL; using {}",
                    url, DEFAULT_DATABASE_URL
                ));
                DEFAULT_DATABASE_URL.to_string()
            }
            None => {
                warnings.push(format!("DATABASE_URL not set; using {}", DEFAULT_DATABASE_URL));
                DEFAULT_DATABASE_URL.to_string()
            }
        };

        let access_key = get("ADMIN_ACCESS_KEY");
        match &access_key {
            None => warnings.push("ADMIN_ACCESS_KEY not set; admin API is unauthenticated".to_string()),
            Some(key) if key.len() < MIN_ACCESS_KEY_LEN => warnings.push(format!(
                "ADMIN_ACCESS_KEY is shorter than {} characters",
                MIN_ACCESS_KEY_LEN
            )),
            Some(_) => {}
        }

        let default_addr: SocketAddr = ([0, 0, 0, 0], 3000).into();
        let bind_addr = match get("BIND_ADDR") {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                warnings.push(format!("BIND_ADDR '{}' is invalid; using {}", raw, DEFAULT_BIND_ADDR));
                default_addr
            }),
            None => default_addr,
        };

        let data_dir = PathBuf::from(get("DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()));

        let public_base_url = match get("PUBLIC_BASE_URL") {
            Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
                url.trim_end_matches('/').to_string()
            }
            Some(url) => {
                warnings.push(format!(
                    "PUBLIC_BASE_URL '{}' is not an http(s) URL; using {}",
                    url, DEFAULT_PUBLIC_BASE_URL
                ));
                DEFAULT_PUBLIC_BASE_URL.to_string()
            }
            None => DEFAULT_PUBLIC_BASE_URL.to_string(),
        };

        let default_upload_bytes = DEFAULT_MAX_UPLOAD_MB * 1024 * 1024;
        let max_upload_bytes = match get("MAX_UPLOAD_MB") {
            Some(raw) => match raw
                .parse::<usize>()
                .ok()
                .filter(|mb| *mb > 0)
                .and_then(|mb| mb.checked_mul(1024 * 1024))
            {
                Some(bytes) => bytes,
                None => {
                    warnings.push(format!(
                        "MAX_UPLOAD_MB '{}' is invalid; using {}",
                        raw, DEFAULT_MAX_UPLOAD_MB
                    ));
                    default_upload_bytes
                }
            },
            None => default_upload_bytes,
        };

        Self {
            database_url,
            access_key,
            bind_addr,
            data_dir,
            public_base_url,
            max_upload_bytes,
            warnings,
        }
    }

    /// テスト用のインメモリ設定
    pub fn in_memory(data_dir: PathBuf) -> Self {
        Self::from_lookup(|key| match key {
            "DATABASE_URL" => Some("sqlite::memory:".to_string()),
            "DATA_DIR" => Some(data_dir.to_string_lossy().to_string()),
            _ => None,
        })
    }
}
