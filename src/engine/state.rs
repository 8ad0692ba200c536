use crate::scenario::{Scenario, Step};
use std::collections::HashMap;

/// 실행 시작 시점의 시나리오 스냅샷이다. scenario-ref를 ID로 해석한다.
#[derive(Debug, Clone, Default)]
pub struct ScenarioCatalog {
    scenarios: HashMap<String, Scenario>,
}

impl ScenarioCatalog {
    pub fn new(scenarios: impl IntoIterator<Item = Scenario>) -> Self {
        Self {
            scenarios: scenarios
                .into_iter()
                .map(|scenario| (scenario.id.clone(), scenario))
                .collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Scenario> {
        self.scenarios.get(id)
    }

    /// 하위 시나리오까지 펼친 말단 Step 수를 센다.
    ///
    /// 현재 탐색 경로에 있는 시나리오는 다시 세지 않으므로 순환이 있어도 끝난다.
    /// 찾을 수 없는 참조는 0으로 센다.
    pub fn count_total_steps(&self, root: &Scenario) -> usize {
        let mut path = vec![root.id.clone()];
        self.count_steps(&root.steps, &mut path)
    }

    fn count_steps(&self, steps: &[Step], path: &mut Vec<String>) -> usize {
        steps
            .iter()
            .map(|step| match step {
                Step::ScenarioRef { scenario_id } => {
                    if path.contains(scenario_id) {
                        return 0;
                    }
                    let Some(child) = self.get(scenario_id) else {
                        return 0;
                    };
                    path.push(scenario_id.clone());
                    let count = self.count_steps(&child.steps, path);
                    path.pop();
                    count
                }
                _ => 1,
            })
            .sum()
    }
}

/// 한 번의 실행 동안 모든 재귀 단계가 공유하는 기록이다.
#[derive(Debug, Clone)]
pub struct RunState {
    /// 지금까지 시작한 말단 Step 수.
    pub current: usize,
    /// 펼친 전체 Step 수.
    pub total: usize,
    /// 실행 중인 조상 시나리오 ID (루트 포함).
    call_stack: Vec<String>,
}

impl RunState {
    pub fn new(root_id: &str, total: usize) -> Self {
        Self {
            current: 0,
            total,
            call_stack: vec![root_id.to_string()],
        }
    }

    /// 조상 경로에 있으면 false를 반환하고, 아니면 진입을 기록한다.
    pub fn enter(&mut self, scenario_id: &str) -> bool {
        if self.call_stack.iter().any(|id| id == scenario_id) {
            return false;
        }
        self.call_stack.push(scenario_id.to_string());
        true
    }

    /// 마지막 진입을 되돌린다.
    pub fn leave(&mut self) {
        self.call_stack.pop();
    }

    pub fn depth(&self) -> usize {
        self.call_stack.len()
    }
}
