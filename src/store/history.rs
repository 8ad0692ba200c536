use super::error::StoreError;
use super::scenarios::{InsertAt, ScenarioStore};
use crate::config::HistoryConfig;
use crate::scenario::Step;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tracing::{debug, info};

/// 기본 되돌리기 기록 용량이다.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Step 삭제 한 건의 기록이다.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    /// 삭제된 Step이 속했던 시나리오.
    pub scenario_id: String,
    /// 삭제 당시 인덱스.
    pub step_index: usize,
    /// 삭제된 Step.
    pub step: Step,
    /// 삭제 시각.
    pub timestamp: DateTime<Utc>,
}

/// Step 삭제만 기록하는 고정 용량 되돌리기 스택이다. 가득 차면 가장 오래된 기록부터 버린다.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl HistoryLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// 설정의 `history.capacity`로 기록을 만든다.
    pub fn from_config(config: &HistoryConfig) -> Self {
        Self::new(config.capacity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Step을 삭제하고 되돌리기 기록을 남긴다. 범위 밖이면 아무것도 기록하지 않는다.
    pub fn delete_step(
        &mut self,
        store: &mut ScenarioStore,
        scenario_id: &str,
        index: usize,
    ) -> Result<Option<Step>, StoreError> {
        let Some(step) = store.remove_step(scenario_id, index)? else {
            return Ok(None);
        };
        self.entries.push_back(HistoryEntry {
            scenario_id: scenario_id.to_string(),
            step_index: index,
            step: step.clone(),
            timestamp: Utc::now(),
        });
        while self.entries.len() > self.capacity {
            if let Some(evicted) = self.entries.pop_front() {
                debug!(scenario_id = %evicted.scenario_id, "가장 오래된 되돌리기 기록을 버립니다.");
            }
        }
        Ok(Some(step))
    }

    /// 가장 최근 삭제를 원래 인덱스(현재 길이로 제한)에 되돌리고 선택한다.
    ///
    /// 기록이 없거나 시나리오가 이미 삭제되었으면 false를 반환한다. 후자의 기록은 소모된다.
    pub fn undo(&mut self, store: &mut ScenarioStore) -> bool {
        let Some(entry) = self.entries.pop_back() else {
            return false;
        };
        let Some(len) = store.scenario(&entry.scenario_id).map(|s| s.len()) else {
            info!(scenario_id = %entry.scenario_id, "되돌릴 시나리오가 더 이상 없습니다.");
            return false;
        };
        let target = entry.step_index.min(len);
        let Ok(index) = store.add_step(&entry.scenario_id, entry.step, InsertAt::at_index(target))
        else {
            return false;
        };
        store.select_scenario(Some(&entry.scenario_id));
        store.select_step(Some(index));
        true
    }
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
