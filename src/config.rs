use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 애플리케이션 전체 설정이다. 모든 항목에 기본값이 있다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 네이티브 서비스 실행 설정.
    pub service: ServiceConfig,
    /// 메시지 채널 설정.
    pub channel: ChannelConfig,
    /// 실행 엔진 설정.
    pub engine: EngineConfig,
    /// 녹화 설정.
    pub recorder: RecorderConfig,
    /// 되돌리기 기록 설정.
    pub history: HistoryConfig,
    /// 시나리오 저장 위치 설정.
    pub storage: StorageConfig,
}

/// 네이티브 서비스 프로세스 실행 설정이다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// 실행 파일 경로.
    pub program: PathBuf,
    /// 추가 인자 목록.
    pub args: Vec<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("native-action-service"),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// 요청 기본 제한 시간(ms).
    pub request_timeout_ms: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 10_000,
        }
    }
}

impl ChannelConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(1))
    }
}

/// 실행 엔진 설정이다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 픽셀 조건 대기의 서비스 측 제한 시간(ms).
    pub pixel_wait_timeout_ms: u64,
    /// 픽셀 대기 요청에서 서비스 제한 시간 위에 더하는 여유(ms).
    pub pixel_wait_grace_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pixel_wait_timeout_ms: 30_000,
            pixel_wait_grace_ms: 5_000,
        }
    }
}

impl EngineConfig {
    pub fn pixel_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.pixel_wait_timeout_ms)
    }

    pub fn pixel_wait_grace(&self) -> Duration {
        Duration::from_millis(self.pixel_wait_grace_ms)
    }
}

/// 녹화 설정이다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// 픽셀 Step에 기록할 기본 색상 허용 거리.
    pub default_threshold: u32,
    /// 이름 입력을 비워 두었을 때 쓰는 기본 이름.
    pub default_name: String,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            default_threshold: 30,
            default_name: "새 시나리오".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// 되돌리기 기록 최대 개수.
    pub capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { capacity: 50 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// 시나리오 JSON 파일 경로.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("scenarios.json"),
        }
    }
}

/// YAML 파일을 읽어 AppConfig로 역직렬화한다.
pub fn load_config_from_file(path: &Path) -> anyhow::Result<AppConfig> {
    let mut file =
        File::open(path).with_context(|| format!("설정 파일 열기 실패: {}", path.display()))?;
    load_config_from_reader(&mut file)
        .with_context(|| format!("설정 파일 해석 실패: {}", path.display()))
}

/// Reader에서 YAML을 읽어 AppConfig 구조체로 파싱한다. 빈 문서는 기본값이다.
pub fn load_config_from_reader<R: Read>(reader: &mut R) -> anyhow::Result<AppConfig> {
    let mut buf = String::new();
    reader.read_to_string(&mut buf)?;
    if buf.trim().is_empty() {
        return Ok(AppConfig::default());
    }
    let config: AppConfig = serde_yaml::from_str(&buf)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults_for_missing_fields() {
        let yaml = "service:\n  program: /opt/native/bin/service\nhistory:\n  capacity: 5\n";
        let config =
            load_config_from_reader(&mut std::io::Cursor::new(yaml)).expect("설정 파싱 실패");
        assert_eq!(config.service.program, PathBuf::from("/opt/native/bin/service"));
        assert!(config.service.args.is_empty());
        assert_eq!(config.history.capacity, 5);
        assert_eq!(config.channel.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.engine.pixel_wait_timeout(), Duration::from_secs(30));
        assert_eq!(config.recorder.default_threshold, 30);
    }

    #[test]
    fn empty_file_yields_default_config() {
        let config =
            load_config_from_reader(&mut std::io::Cursor::new("")).expect("설정 파싱 실패");
        assert_eq!(config.storage.path, PathBuf::from("scenarios.json"));
    }

    #[test]
    fn missing_config_file_error_names_the_path() {
        let dir = tempfile::tempdir().expect("임시 디렉터리 생성 실패");
        let path = dir.path().join("absent.yaml");
        let err = load_config_from_file(&path).expect_err("없는 파일이 열렸습니다");
        assert!(format!("{err:#}").contains("absent.yaml"));
    }
}
