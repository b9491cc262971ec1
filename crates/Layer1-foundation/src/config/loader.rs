//! Host Config Loader
//!
//! ## 검색 우선순위
//!
//! 1. User-level: `~/.plughost/host.json`
//! 2. Project-level: `.plughost/host.json` (또는 `host.toml`)
//! 3. Local (gitignored): `.plughost/host.local.json`
//!
//! 각 레벨의 설정이 이전 레벨을 오버라이드합니다.

use super::host::HostConfig;
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// 설정 폴더 이름
pub const CONFIG_DIR_NAME: &str = ".plughost";

/// 설정 파일 경로 정보
#[derive(Debug, Clone)]
struct ConfigPath {
    path: PathBuf,
    /// 우선순위 (높을수록 우선)
    priority: u8,
    description: &'static str,
}

/// 설정 로더
pub struct HostConfigLoader {
    search_paths: Vec<ConfigPath>,
}

impl HostConfigLoader {
    /// 기본 검색 경로로 생성
    pub fn new(working_dir: &Path) -> Self {
        let mut paths = Vec::new();

        if let Some(home) = dirs::home_dir() {
            paths.push(ConfigPath {
                path: home.join(CONFIG_DIR_NAME).join("host.json"),
                priority: 10,
                description: "User host config",
            });
        }

        let project_dir = working_dir.join(CONFIG_DIR_NAME);
        paths.push(ConfigPath {
            path: project_dir.join("host.json"),
            priority: 20,
            description: "Project host config",
        });
        paths.push(ConfigPath {
            path: project_dir.join("host.toml"),
            priority: 21,
            description: "Project host config (toml)",
        });
        paths.push(ConfigPath {
            path: project_dir.join("host.local.json"),
            priority: 30,
            description: "Local host config",
        });

        paths.sort_by_key(|p| p.priority);

        Self { search_paths: paths }
    }

    /// 커스텀 검색 경로로 생성 (앞쪽이 낮은 우선순위)
    pub fn with_paths(paths: Vec<PathBuf>) -> Self {
        let search_paths = paths
            .into_iter()
            .enumerate()
            .map(|(i, path)| ConfigPath {
                path,
                priority: i.min(u8::MAX as usize) as u8,
                description: "Custom",
            })
            .collect();

        Self { search_paths }
    }

    /// 모든 경로에서 설정 로드하여 병합
    ///
    /// 읽을 수 없는 파일은 경고 후 건너뜁니다.
    pub fn load_all(&self) -> HostConfig {
        let mut merged = HostConfig::new();

        for config_path in &self.search_paths {
            if !config_path.path.exists() {
                continue;
            }
            match load_host_config(&config_path.path) {
                Ok(config) => {
                    info!(
                        "Loaded {} from: {}",
                        config_path.description,
                        config_path.path.display()
                    );
                    merged = merged.merge(config);
                }
                Err(e) => {
                    warn!(
                        "Failed to load host config from {}: {}",
                        config_path.path.display(),
                        e
                    );
                }
            }
        }

        merged
    }

    /// 존재하는 설정 파일 목록
    pub fn existing_files(&self) -> Vec<PathBuf> {
        self.search_paths
            .iter()
            .filter(|p| p.path.exists())
            .map(|p| p.path.clone())
            .collect()
    }
}

/// 파일에서 설정 로드 (`.toml`이면 TOML, 나머지는 주석 허용 JSON)
pub fn load_host_config(path: &Path) -> Result<HostConfig> {
    let content = std::fs::read_to_string(path)?;

    let is_toml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("toml"));

    let config: HostConfig = if is_toml {
        toml::from_str(&content)?
    } else {
        serde_json::from_str(&strip_json_comments(&content)).map_err(|e| {
            Error::InvalidInput(format!("Invalid host config at {}: {}", path.display(), e))
        })?
    };

    debug!(
        "Loaded host config from {}: {} plugin(s)",
        path.display(),
        config.plugins.len()
    );

    Ok(config)
}

/// JSON 문자열에서 `//`, `/* */` 주석 제거 (문자열 리터럴 내부는 유지)
pub fn strip_json_comments(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escape_next = false;

    while let Some(c) = chars.next() {
        if escape_next {
            output.push(c);
            escape_next = false;
            continue;
        }

        if in_string {
            match c {
                '\\' => escape_next = true,
                '"' => in_string = false,
                _ => {}
            }
            output.push(c);
            continue;
        }

        match (c, chars.peek().copied()) {
            ('"', _) => {
                in_string = true;
                output.push(c);
            }
            ('/', Some('/')) => {
                // 라인 주석
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        output.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                // 블록 주석
                chars.next();
                while let Some(skipped) = chars.next() {
                    if skipped == '*' && chars.peek() == Some(&'/') {
                        chars.next();
                        break;
                    }
                }
            }
            _ => output.push(c),
        }
    }

    output
}

// ============================================================================
// 테스트
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_strip_json_comments() {
        let input = r#"{
            // line comment
            "url": "http://example.com/*not*/", /* block */
            "n": 1
        }"#;
        let value: serde_json::Value = serde_json::from_str(&strip_json_comments(input)).unwrap();
        assert_eq!(value["url"], "http://example.com/*not*/");
        assert_eq!(value["n"], 1);
    }

    #[test]
    fn test_load_json_config() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("host.json");
        fs::write(
            &file,
            r#"{
                // 메모리 플러그인
                "plugins": [{"name": "memory", "source": "builtin:memory", "config": {"persist": false}}],
                "timeouts": {"toolMs": 250}
            }"#,
        )
        .unwrap();

        let config = load_host_config(&file).unwrap();
        assert_eq!(config.plugins[0].name, "memory");
        assert_eq!(config.timeouts.tool_ms, Some(250));
    }

    #[test]
    fn test_load_toml_config() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("host.toml");
        fs::write(
            &file,
            r#"
continueOnError = false

[[plugins]]
name = "memory"
source = "builtin:memory"

[plugins.config]
maxMessages = 5
"#,
        )
        .unwrap();

        let config = load_host_config(&file).unwrap();
        assert!(!config.continue_on_error());
        assert_eq!(config.plugins[0].config["maxMessages"], 5);
    }

    #[test]
    fn test_invalid_json_reports_path() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("host.json");
        fs::write(&file, "{ not json").unwrap();

        let err = load_host_config(&file).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(ref msg) if msg.contains("host.json")));
    }

    #[test]
    fn test_load_all_merges_in_priority_order() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("base.json");
        let local = dir.path().join("local.json");
        let broken = dir.path().join("broken.json");

        fs::write(
            &base,
            r#"{"plugins": [{"name": "memory", "source": "builtin:memory"}], "timeouts": {"lifecycleMs": 100}}"#,
        )
        .unwrap();
        fs::write(&local, r#"{"timeouts": {"lifecycleMs": 900}}"#).unwrap();
        fs::write(&broken, "{").unwrap();

        let loader = HostConfigLoader::with_paths(vec![base, broken, local]);
        assert_eq!(loader.existing_files().len(), 3);

        let config = loader.load_all();
        assert_eq!(config.plugins.len(), 1);
        assert_eq!(config.timeouts.lifecycle_ms, Some(900));
    }
}
