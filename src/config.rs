//! 应用配置
//! 默认值 + 环境变量覆盖（`.env` 由 main 预先加载）

use crate::services::generation::ChatConfig;
use crate::services::orchestrator::DEFAULT_MAX_ENCODED_BYTES;
use crate::utils;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub data_dir: PathBuf,
    /// 未设置时使用 `{data_dir}/study-aid.db`
    pub database_path: Option<PathBuf>,
    /// 文件公开地址前缀
    pub public_url: String,
    /// 生成接口地址，默认指向本服务自身
    pub generation_url: Option<String>,
    pub max_encoded_bytes: usize,
    pub request_timeout: Duration,
    pub log_level: log::LevelFilter,
    pub chat: ChatConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        let bind = SocketAddr::from(([127, 0, 0, 1], 8080));
        Self {
            bind,
            data_dir: utils::get_app_data_dir(),
            database_path: None,
            public_url: format!("http://{}", bind),
            generation_url: None,
            max_encoded_bytes: DEFAULT_MAX_ENCODED_BYTES,
            request_timeout: Duration::from_secs(120),
            log_level: log::LevelFilter::Info,
            chat: ChatConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 通过任意键值来源构建配置
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(bind) = get("STUDY_AID_BIND") {
            config.bind = bind
                .parse()
                .with_context(|| format!("invalid STUDY_AID_BIND: {}", bind))?;
            config.public_url = format!("http://{}", config.bind);
        }
        if let Some(dir) = get("STUDY_AID_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(path) = get("STUDY_AID_DATABASE") {
            config.database_path = Some(PathBuf::from(path));
        }
        if let Some(url) = get("STUDY_AID_PUBLIC_URL") {
            config.public_url = url;
        }
        config.generation_url = get("STUDY_AID_GENERATION_URL");

        if let Some(bytes) = get("STUDY_AID_MAX_DOCUMENT_BYTES") {
            config.max_encoded_bytes = bytes
                .parse()
                .with_context(|| format!("invalid STUDY_AID_MAX_DOCUMENT_BYTES: {}", bytes))?;
        }
        if let Some(secs) = get("STUDY_AID_TIMEOUT_SECS") {
            let secs: u64 = secs
                .parse()
                .with_context(|| format!("invalid STUDY_AID_TIMEOUT_SECS: {}", secs))?;
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(level) = get("STUDY_AID_LOG") {
            config.log_level = level
                .parse()
                .with_context(|| format!("invalid STUDY_AID_LOG: {}", level))?;
        }

        // 聊天补全后端
        config.chat.api_key = get("OPENAI_API_KEY");
        if let Some(url) = get("OPENAI_API_URL") {
            config.chat.api_url = url;
        }
        if let Some(model) = get("OPENAI_MODEL") {
            config.chat.model = model;
        }
        if let Some(tokens) = get("OPENAI_MAX_TOKENS") {
            config.chat.max_tokens = tokens
                .parse()
                .with_context(|| format!("invalid OPENAI_MAX_TOKENS: {}", tokens))?;
        }

        Ok(config)
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| utils::get_database_path(&self.data_dir))
    }

    pub fn storage_dir(&self) -> PathBuf {
        utils::get_storage_dir(&self.data_dir)
    }

    /// 远程生成接口地址
    pub fn generation_base_url(&self) -> String {
        self.generation_url
            .clone()
            .unwrap_or_else(|| format!("http://{}", self.bind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.bind.port(), 8080);
        assert_eq!(config.max_encoded_bytes, 5 * 1024 * 1024);
        assert_eq!(config.generation_base_url(), "http://127.0.0.1:8080");
        assert!(config.chat.api_key.is_none());
        assert!(config.database_path().ends_with("study-aid.db"));
    }

    #[test]
    fn test_env_overrides() {
        let config = config_from(&[
            ("STUDY_AID_BIND", "0.0.0.0:9000"),
            ("STUDY_AID_DATA_DIR", "/tmp/study"),
            ("STUDY_AID_GENERATION_URL", "https://study.example.com"),
            ("STUDY_AID_MAX_DOCUMENT_BYTES", "1024"),
            ("STUDY_AID_TIMEOUT_SECS", "30"),
            ("STUDY_AID_LOG", "debug"),
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_MODEL", "gpt-4o"),
            ("OPENAI_MAX_TOKENS", "800"),
        ])
        .unwrap();

        assert_eq!(config.bind.port(), 9000);
        assert_eq!(config.public_url, "http://0.0.0.0:9000");
        assert_eq!(config.database_path(), PathBuf::from("/tmp/study/study-aid.db"));
        assert_eq!(config.storage_dir(), PathBuf::from("/tmp/study/storage"));
        assert_eq!(config.generation_base_url(), "https://study.example.com");
        assert_eq!(config.max_encoded_bytes, 1024);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.log_level, log::LevelFilter::Debug);
        assert_eq!(config.chat.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.chat.model, "gpt-4o");
        assert_eq!(config.chat.max_tokens, 800);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(config_from(&[("STUDY_AID_BIND", "nowhere")]).is_err());
        assert!(config_from(&[("STUDY_AID_TIMEOUT_SECS", "soon")]).is_err());
        assert!(config_from(&[("STUDY_AID_LOG", "loud")]).is_err());
    }

    #[test]
    fn test_blank_values_ignored() {
        let config = config_from(&[("OPENAI_API_KEY", "  "), ("STUDY_AID_LOG", "")]).unwrap();
        assert!(config.chat.api_key.is_none());
        assert_eq!(config.log_level, log::LevelFilter::Info);
    }
}
