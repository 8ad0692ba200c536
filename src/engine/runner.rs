use super::error::ExecutionError;
use super::events::{EngineEvent, ExecutionProgress, ProgressStatus, RunStatus};
use super::state::{RunState, ScenarioCatalog};
use super::steps::{RunContext, report_progress, run_steps};
use crate::channel::SharedNativeActions;
use crate::config::EngineConfig;
use crate::scenario::Scenario;
use crate::store::SharedScenarioStore;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 시나리오 트리를 재생하는 실행 엔진이다. 실행 사이에 상태를 갖지 않는다.
#[derive(Clone)]
pub struct ExecutionEngine {
    /// 참조 해석과 사용 시각 갱신에 쓰는 저장소.
    store: SharedScenarioStore,
    /// 네이티브 작업 실행기.
    actions: SharedNativeActions,
    /// 엔진 설정.
    config: EngineConfig,
}

impl ExecutionEngine {
    pub fn new(
        store: SharedScenarioStore,
        actions: SharedNativeActions,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            actions,
            config,
        }
    }

    /// 현재 저장소 기준으로 펼친 말단 Step 수를 센다.
    pub async fn count_total_steps(&self, root: &Scenario) -> usize {
        self.snapshot().await.count_total_steps(root)
    }

    /// 저장소에 있는 시나리오를 ID로 찾아 실행한다.
    pub async fn run_scenario_by_id(
        &self,
        scenario_id: &str,
        cancel: CancellationToken,
        sender: UnboundedSender<EngineEvent>,
    ) -> RunStatus {
        let root = self.store.read().await.scenario(scenario_id).cloned();
        match root {
            Some(root) => self.run_scenario(&root, cancel, sender).await,
            None => {
                let err = ExecutionError::BrokenReference(scenario_id.to_string());
                let status = RunStatus::Error(err.to_string());
                let _ = sender.send(EngineEvent::Progress(ExecutionProgress {
                    current: 0,
                    total: 0,
                    status: ProgressStatus::Finished(status.clone()),
                }));
                status
            }
        }
    }

    /// 루트 시나리오를 깊이 우선, 순차적으로 실행하고 최종 상태를 보고한다.
    ///
    /// 끝까지 성공한 경우에만 루트의 마지막 사용 시각을 갱신한다.
    pub async fn run_scenario(
        &self,
        root: &Scenario,
        cancel: CancellationToken,
        sender: UnboundedSender<EngineEvent>,
    ) -> RunStatus {
        let catalog = self.snapshot().await;
        let total = catalog.count_total_steps(root);
        let mut state = RunState::new(&root.id, total);
        let ctx = RunContext {
            catalog,
            actions: self.actions.clone(),
            config: self.config.clone(),
            cancel,
            sender,
        };
        info!(scenario = %root.name, total, "시나리오 실행 시작");

        let result = run_steps(&ctx, &root.steps, &mut state).await;
        let status = match result {
            Ok(()) => {
                if let Err(err) = self.store.write().await.mark_used(&root.id) {
                    warn!(error = %err, "사용 시각을 갱신하지 못했습니다.");
                }
                info!(scenario = %root.name, steps = state.current, "시나리오 실행 완료");
                RunStatus::Completed
            }
            Err(ExecutionError::Cancelled) => {
                info!(scenario = %root.name, at = state.current, "시나리오 실행 중단");
                RunStatus::Aborted
            }
            Err(err) => {
                warn!(scenario = %root.name, error = %err, "시나리오 실행 실패");
                RunStatus::Error(err.to_string())
            }
        };
        report_progress(&ctx.sender, &state, ProgressStatus::Finished(status.clone()));
        status
    }

    async fn snapshot(&self) -> ScenarioCatalog {
        ScenarioCatalog::new(self.store.read().await.scenarios().iter().cloned())
    }
}
