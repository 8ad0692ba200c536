use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// 화면 좌표를 표현한다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    /// 가로 좌표.
    pub x: i32,
    /// 세로 좌표.
    pub y: i32,
}

/// 화면 영역을 표현한다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    /// 좌상단 가로 좌표.
    pub x: i32,
    /// 좌상단 세로 좌표.
    pub y: i32,
    /// 영역 너비.
    pub width: u32,
    /// 영역 높이.
    pub height: u32,
}

/// RGB 색상 값이다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// 클릭에 사용할 마우스 버튼이다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    /// 왼쪽 버튼.
    #[default]
    Left,
    /// 오른쪽 버튼.
    Right,
    /// 가운데 버튼.
    Middle,
}

/// Step은 Scenario 내 최소 실행 단위를 표현한다.
///
/// 값 타입이며 한 Scenario가 자신의 Step 목록을 단독으로 소유한다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Step {
    /// 지정 좌표를 클릭한다.
    Click {
        position: Point,
        #[serde(default)]
        button: MouseButton,
    },
    /// 키 입력을 보낸다.
    Keypress {
        key: String,
        #[serde(default)]
        modifiers: Vec<String>,
    },
    /// 지정 시간(ms)만큼 대기한다.
    Delay { ms: u64 },
    /// 한 픽셀의 색상이 기대값에 근접할 때까지 대기한다.
    PixelState {
        position: Point,
        color: Rgb,
        threshold: u32,
    },
    /// 영역 안의 픽셀 중 하나가 기대 색상에 근접할 때까지 대기한다.
    PixelZone { rect: Rect, color: Rgb, threshold: u32 },
    /// 다른 Scenario를 ID로 참조한다. 소유가 아닌 약한 참조이다.
    ScenarioRef {
        #[serde(rename = "scenarioId")]
        scenario_id: String,
    },
}

impl Step {
    /// 로그와 진행 표시에 사용할 짧은 설명을 반환한다.
    pub fn describe(&self) -> String {
        match self {
            Step::Click { position, button } => {
                format!("클릭 {:?} ({}, {})", button, position.x, position.y)
            }
            Step::Keypress { key, modifiers } if modifiers.is_empty() => format!("키 입력 {key}"),
            Step::Keypress { key, modifiers } => {
                format!("키 입력 {}+{key}", modifiers.join("+"))
            }
            Step::Delay { ms } => format!("대기 {ms}ms"),
            Step::PixelState { position, .. } => {
                format!("픽셀 대기 ({}, {})", position.x, position.y)
            }
            Step::PixelZone { rect, .. } => format!(
                "영역 대기 ({}, {}, {}x{})",
                rect.x, rect.y, rect.width, rect.height
            ),
            Step::ScenarioRef { scenario_id } => format!("시나리오 참조 {scenario_id}"),
        }
    }
}

/// Scenario는 이름이 붙은 Step 목록이다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    /// 고유 시나리오 ID.
    pub id: String,
    /// 시나리오의 표시 이름.
    pub name: String,
    /// 실행 순서대로 정렬된 Step 목록.
    #[serde(default)]
    pub steps: Vec<Step>,
    /// 생성 시각.
    pub created_at: DateTime<Utc>,
    /// 마지막으로 끝까지 실행된 시각.
    pub last_used_at: DateTime<Utc>,
}

impl Scenario {
    /// 새 ID를 발급해 빈 시나리오를 만든다.
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            steps: Vec::new(),
            created_at: now,
            last_used_at: now,
        }
    }

    /// 전체 Step 수를 반환한다.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Step 수가 비었는지 여부를 확인한다.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// 디스크에 저장되는 문서 형태이다.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ScenarioDocument {
    #[serde(default)]
    scenarios: Vec<Scenario>,
}

/// 시나리오 목록을 적재/저장하는 외부 협력자이다.
///
/// 마지막 쓰기가 이기며 그 이상의 트랜잭션 보장은 없다.
pub trait ScenarioPersistence: Send + Sync {
    /// 저장된 전체 시나리오를 읽는다.
    fn load(&self) -> anyhow::Result<Vec<Scenario>>;
    /// 전체 시나리오를 통째로 저장한다.
    fn save(&self, scenarios: &[Scenario]) -> anyhow::Result<()>;
}

/// JSON 파일 기반 저장소이다.
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    /// 저장 파일 경로.
    path: PathBuf,
}

impl JsonFilePersistence {
    /// 지정 경로를 사용하는 저장소를 만든다.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ScenarioPersistence for JsonFilePersistence {
    /// 파일이 없으면 빈 목록으로 간주한다.
    fn load(&self) -> anyhow::Result<Vec<Scenario>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut file = File::open(&self.path)
            .with_context(|| format!("시나리오 파일 열기 실패: {}", self.path.display()))?;
        load_scenarios_from_reader(&mut file)
            .with_context(|| format!("시나리오 파일 파싱 실패: {}", self.path.display()))
    }

    /// 임시 파일에 쓴 뒤 rename하여 원자적으로 교체한다.
    fn save(&self, scenarios: &[Scenario]) -> anyhow::Result<()> {
        let doc = ScenarioDocument {
            scenarios: scenarios.to_vec(),
        };
        let body = serde_json::to_vec_pretty(&doc)?;
        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut tmp = File::create(&tmp_path)
                .with_context(|| format!("임시 파일 생성 실패: {}", tmp_path.display()))?;
            tmp.write_all(&body)?;
            tmp.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("시나리오 파일 교체 실패: {}", self.path.display()))?;
        Ok(())
    }
}

/// 메모리에만 보관하는 저장소이다. 복제본끼리 내용을 공유한다.
#[derive(Debug, Clone, Default)]
pub struct MemoryPersistence {
    /// 마지막으로 저장된 목록.
    saved: Arc<Mutex<Vec<Scenario>>>,
    /// save 호출 횟수.
    save_count: Arc<Mutex<usize>>,
}

impl MemoryPersistence {
    /// 마지막으로 저장된 목록을 복제해 반환한다.
    pub fn snapshot(&self) -> Vec<Scenario> {
        self.saved
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// 지금까지의 save 호출 횟수이다.
    pub fn save_count(&self) -> usize {
        *self
            .save_count
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ScenarioPersistence for MemoryPersistence {
    fn load(&self) -> anyhow::Result<Vec<Scenario>> {
        Ok(self.snapshot())
    }

    fn save(&self, scenarios: &[Scenario]) -> anyhow::Result<()> {
        *self
            .saved
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = scenarios.to_vec();
        *self
            .save_count
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) += 1;
        Ok(())
    }
}

/// Reader에서 JSON 문서를 읽어 시나리오 목록으로 파싱한다.
pub fn load_scenarios_from_reader<R: Read>(reader: &mut R) -> anyhow::Result<Vec<Scenario>> {
    let mut buf = String::new();
    reader.read_to_string(&mut buf)?;
    if buf.trim().is_empty() {
        return Ok(Vec::new());
    }
    let doc: ScenarioDocument = serde_json::from_str(&buf)?;
    Ok(doc.scenarios)
}
