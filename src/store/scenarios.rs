use super::error::StoreError;
use crate::scenario::{MemoryPersistence, Scenario, ScenarioPersistence, Step};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

/// Step을 끼워 넣을 위치이다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertAt {
    /// 맨 앞(인덱스 0)에 넣는다.
    Front,
    /// 지정 인덱스 바로 뒤에 넣는다. 범위를 넘으면 맨 뒤에 붙인다.
    After(usize),
    /// 맨 뒤에 붙인다.
    End,
}

impl InsertAt {
    /// 원래 인덱스 자리로 되돌려 넣는 위치를 만든다.
    pub fn at_index(index: usize) -> Self {
        match index {
            0 => InsertAt::Front,
            n => InsertAt::After(n - 1),
        }
    }

    fn resolve(self, len: usize) -> usize {
        match self {
            InsertAt::Front => 0,
            InsertAt::After(index) => (index + 1).min(len),
            InsertAt::End => len,
        }
    }
}

/// 저장소 변경 알림이다. 변경이 끝난 뒤 동기적으로 전달된다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    ScenarioCreated { scenario_id: String },
    ScenarioRenamed { scenario_id: String },
    ScenarioDeleted { scenario_id: String },
    ScenarioUsed { scenario_id: String },
    StepsChanged { scenario_id: String },
    SelectionChanged,
}

/// 저장소 관찰자이다. 변경 직후의 저장소 전체를 읽을 수 있다.
pub type StoreObserver = Box<dyn Fn(&StoreEvent, &ScenarioStore) + Send + Sync>;

/// UI용 선택 상태이다. 저장되지 않는다.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// 선택된 시나리오 ID.
    pub scenario_id: Option<String>,
    /// 선택된 Step 인덱스.
    pub step_index: Option<usize>,
}

/// 시나리오 목록의 메모리 CRUD와 변경 시 자동 저장을 담당한다.
pub struct ScenarioStore {
    /// 삽입 순서대로 보관한 시나리오 목록.
    scenarios: Vec<Scenario>,
    /// 현재 선택 상태.
    selection: Selection,
    /// 변경마다 호출되는 저장 협력자.
    persistence: Box<dyn ScenarioPersistence>,
    /// 변경 알림을 받을 관찰자 목록.
    observers: Vec<StoreObserver>,
}

/// ScenarioStore를 비동기 환경에서 공유하기 위한 타입 별칭이다.
pub type SharedScenarioStore = Arc<tokio::sync::RwLock<ScenarioStore>>;

impl ScenarioStore {
    /// 저장소에서 목록을 읽어 들여 생성한다.
    pub fn open(persistence: Box<dyn ScenarioPersistence>) -> anyhow::Result<Self> {
        let scenarios = persistence.load()?;
        debug!(count = scenarios.len(), "시나리오 적재");
        Ok(Self {
            scenarios,
            selection: Selection::default(),
            persistence,
            observers: Vec::new(),
        })
    }

    /// 메모리 저장소를 쓰는 빈 저장소를 만든다.
    pub fn in_memory() -> Self {
        Self {
            scenarios: Vec::new(),
            selection: Selection::default(),
            persistence: Box::new(MemoryPersistence::default()),
            observers: Vec::new(),
        }
    }

    /// 공유 가능한 형태로 감싼다.
    pub fn into_shared(self) -> SharedScenarioStore {
        Arc::new(tokio::sync::RwLock::new(self))
    }

    /// 변경 알림 관찰자를 등록한다.
    pub fn subscribe(&mut self, observer: StoreObserver) {
        self.observers.push(observer);
    }

    /// 삽입 순서의 전체 목록이다.
    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    /// ID로 시나리오를 조회한다.
    pub fn scenario(&self, id: &str) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.id == id)
    }

    /// ID가 일치하는 시나리오, 없으면 이름이 일치하는 첫 시나리오를 찾는다.
    pub fn find(&self, id_or_name: &str) -> Option<&Scenario> {
        self.scenario(id_or_name)
            .or_else(|| self.scenarios.iter().find(|s| s.name == id_or_name))
    }

    /// 마지막 사용 시각 내림차순의 표시용 목록이다. 저장 순서는 바뀌지 않는다.
    pub fn sorted_scenarios(&self) -> Vec<&Scenario> {
        let mut sorted: Vec<&Scenario> = self.scenarios.iter().collect();
        sorted.sort_by(|a, b| b.last_used_at.cmp(&a.last_used_at));
        sorted
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// 새 시나리오를 만들고 ID를 반환한다.
    pub fn create_scenario(&mut self, name: impl Into<String>) -> String {
        let scenario = Scenario::new(name);
        let scenario_id = scenario.id.clone();
        self.scenarios.push(scenario);
        self.commit(StoreEvent::ScenarioCreated {
            scenario_id: scenario_id.clone(),
        });
        scenario_id
    }

    /// 시나리오 이름을 바꾼다.
    pub fn rename_scenario(&mut self, id: &str, name: impl Into<String>) -> Result<(), StoreError> {
        self.scenario_mut(id)?.name = name.into();
        self.commit(StoreEvent::ScenarioRenamed {
            scenario_id: id.to_string(),
        });
        Ok(())
    }

    /// 시나리오를 삭제하고 반환한다. 선택되어 있었다면 선택을 해제한다.
    pub fn delete_scenario(&mut self, id: &str) -> Result<Scenario, StoreError> {
        let position = self
            .scenarios
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| StoreError::ScenarioNotFound(id.to_string()))?;
        let removed = self.scenarios.remove(position);
        if self.selection.scenario_id.as_deref() == Some(id) {
            self.selection = Selection::default();
        }
        self.commit(StoreEvent::ScenarioDeleted {
            scenario_id: id.to_string(),
        });
        Ok(removed)
    }

    /// 마지막 사용 시각을 현재로 갱신한다.
    pub fn mark_used(&mut self, id: &str) -> Result<(), StoreError> {
        self.scenario_mut(id)?.last_used_at = Utc::now();
        self.commit(StoreEvent::ScenarioUsed {
            scenario_id: id.to_string(),
        });
        Ok(())
    }

    /// Step을 지정 위치에 넣고 실제 인덱스를 반환한다.
    ///
    /// 같은 시나리오에서 삽입 위치 이후를 가리키던 선택은 한 칸 뒤로 민다.
    pub fn add_step(&mut self, id: &str, step: Step, at: InsertAt) -> Result<usize, StoreError> {
        let scenario = self.scenario_mut(id)?;
        let index = at.resolve(scenario.steps.len());
        scenario.steps.insert(index, step);
        if self.selection.scenario_id.as_deref() == Some(id) {
            if let Some(selected) = self.selection.step_index.filter(|s| *s >= index) {
                self.selection.step_index = Some(selected + 1);
            }
        }
        self.commit(StoreEvent::StepsChanged {
            scenario_id: id.to_string(),
        });
        Ok(index)
    }

    /// Step을 제거해 되돌리기용으로 반환한다. 범위 밖이면 `None`이다.
    pub fn remove_step(&mut self, id: &str, index: usize) -> Result<Option<Step>, StoreError> {
        let scenario = self.scenario_mut(id)?;
        if index >= scenario.steps.len() {
            return Ok(None);
        }
        let removed = scenario.steps.remove(index);
        let remaining = scenario.steps.len();
        if self.selection.scenario_id.as_deref() == Some(id) {
            self.selection.step_index = match self.selection.step_index {
                Some(selected) if selected > index => Some(selected - 1),
                Some(selected) if selected == index && remaining == 0 => None,
                Some(selected) if selected == index => Some(index.min(remaining - 1)),
                other => other,
            };
        }
        self.commit(StoreEvent::StepsChanged {
            scenario_id: id.to_string(),
        });
        Ok(Some(removed))
    }

    /// 두 Step의 위치를 맞바꾼다. 선택도 함께 따라간다.
    pub fn swap_steps(&mut self, id: &str, i: usize, j: usize) -> Result<(), StoreError> {
        let scenario = self.scenario_mut(id)?;
        let len = scenario.steps.len();
        for index in [i, j] {
            if index >= len {
                return Err(StoreError::StepOutOfRange { index, len });
            }
        }
        scenario.steps.swap(i, j);
        if self.selection.scenario_id.as_deref() == Some(id) {
            self.selection.step_index = match self.selection.step_index {
                Some(selected) if selected == i => Some(j),
                Some(selected) if selected == j => Some(i),
                other => other,
            };
        }
        self.commit(StoreEvent::StepsChanged {
            scenario_id: id.to_string(),
        });
        Ok(())
    }

    /// 지정 인덱스의 Step을 교체한다.
    pub fn update_step(&mut self, id: &str, index: usize, step: Step) -> Result<(), StoreError> {
        let scenario = self.scenario_mut(id)?;
        let len = scenario.steps.len();
        let slot = scenario
            .steps
            .get_mut(index)
            .ok_or(StoreError::StepOutOfRange { index, len })?;
        *slot = step;
        self.commit(StoreEvent::StepsChanged {
            scenario_id: id.to_string(),
        });
        Ok(())
    }

    /// 시나리오를 선택한다. Step 선택은 초기화된다.
    pub fn select_scenario(&mut self, id: Option<&str>) {
        self.selection = Selection {
            scenario_id: id.map(str::to_string),
            step_index: None,
        };
        self.notify(&StoreEvent::SelectionChanged);
    }

    /// 선택된 시나리오 안의 Step을 선택한다.
    pub fn select_step(&mut self, index: Option<usize>) {
        self.selection.step_index = index;
        self.notify(&StoreEvent::SelectionChanged);
    }

    fn scenario_mut(&mut self, id: &str) -> Result<&mut Scenario, StoreError> {
        self.scenarios
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| StoreError::ScenarioNotFound(id.to_string()))
    }

    /// 변경을 저장하고 관찰자에게 알린다. 저장 실패는 메모리 변경을 되돌리지 않는다.
    fn commit(&mut self, event: StoreEvent) {
        if let Err(err) = self.persistence.save(&self.scenarios) {
            warn!(error = %err, ?event, "시나리오 저장 실패");
        }
        self.notify(&event);
    }

    fn notify(&self, event: &StoreEvent) {
        for observer in &self.observers {
            observer(event, self);
        }
    }
}

impl std::fmt::Debug for ScenarioStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioStore")
            .field("scenarios", &self.scenarios.len())
            .field("selection", &self.selection)
            .field("observers", &self.observers.len())
            .finish()
    }
}
