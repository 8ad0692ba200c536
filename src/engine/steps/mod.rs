use super::error::ExecutionError;
use super::events::{EngineEvent, ProgressStatus};
use super::state::{RunState, ScenarioCatalog};
use crate::channel::SharedNativeActions;
use crate::config::EngineConfig;
use crate::scenario::Step;
use futures::future::BoxFuture;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

mod delay;
mod input;
mod pixel;
mod utils;

use delay::cancellable_sleep;
use input::{execute_click, execute_keypress};
use pixel::{wait_pixel_state, wait_pixel_zone};
pub(super) use utils::report_progress;
use utils::log_step;

/// 한 번의 실행 동안 바뀌지 않는 입력들이다.
pub(super) struct RunContext {
    /// 실행 시작 시점의 시나리오 스냅샷.
    pub catalog: ScenarioCatalog,
    /// 네이티브 작업 실행기.
    pub actions: SharedNativeActions,
    /// 엔진 설정.
    pub config: EngineConfig,
    /// 실행 전체가 공유하는 취소 토큰.
    pub cancel: CancellationToken,
    /// 진행 이벤트 송신자.
    pub sender: UnboundedSender<EngineEvent>,
}

/// Step 목록을 깊이 우선으로 하나씩 순서대로 실행한다.
///
/// 각 Step 직전에 취소 여부를 확인한다.
pub(super) fn run_steps<'a>(
    ctx: &'a RunContext,
    steps: &'a [Step],
    state: &'a mut RunState,
) -> BoxFuture<'a, Result<(), ExecutionError>> {
    Box::pin(async move {
        for step in steps {
            if ctx.cancel.is_cancelled() {
                return Err(ExecutionError::Cancelled);
            }
            match step {
                Step::ScenarioRef { scenario_id } => {
                    run_reference(ctx, scenario_id, state).await?;
                }
                leaf => {
                    state.current += 1;
                    execute_leaf_step(ctx, state, leaf).await?;
                }
            }
        }
        Ok(())
    })
}

/// 참조된 시나리오로 들어가 실행한다. 성공/실패와 상관없이 호출 경로에서 빠져나온다.
async fn run_reference(
    ctx: &RunContext,
    scenario_id: &str,
    state: &mut RunState,
) -> Result<(), ExecutionError> {
    let child = ctx
        .catalog
        .get(scenario_id)
        .ok_or_else(|| ExecutionError::BrokenReference(scenario_id.to_string()))?;
    if !state.enter(scenario_id) {
        return Err(ExecutionError::CircularReference(scenario_id.to_string()));
    }
    log_step(
        &ctx.sender,
        state.current,
        &format!("하위 시나리오 '{}' 진입 (깊이 {})", child.name, state.depth()),
    );
    let result = run_steps(ctx, &child.steps, state).await;
    state.leave();
    result
}

/// 말단 Step 하나를 실행한다. 네이티브 호출은 재시도하지 않는다.
async fn execute_leaf_step(
    ctx: &RunContext,
    state: &RunState,
    step: &Step,
) -> Result<(), ExecutionError> {
    let step_number = state.current;
    log_step(&ctx.sender, step_number, &step.describe());
    match step {
        Step::Click { position, button } => {
            report_progress(&ctx.sender, state, ProgressStatus::Running);
            execute_click(ctx, step_number, step, *position, *button).await
        }
        Step::Keypress { key, modifiers } => {
            report_progress(&ctx.sender, state, ProgressStatus::Running);
            execute_keypress(ctx, step_number, step, key, modifiers).await
        }
        Step::Delay { ms } => {
            report_progress(&ctx.sender, state, ProgressStatus::Running);
            cancellable_sleep(*ms, &ctx.cancel).await
        }
        Step::PixelState {
            position,
            color,
            threshold,
        } => {
            report_progress(&ctx.sender, state, ProgressStatus::Waiting);
            wait_pixel_state(ctx, step_number, step, *position, *color, *threshold).await
        }
        Step::PixelZone {
            rect,
            color,
            threshold,
        } => {
            report_progress(&ctx.sender, state, ProgressStatus::Waiting);
            wait_pixel_zone(ctx, step_number, step, *rect, *color, *threshold).await
        }
        Step::ScenarioRef { scenario_id } => Err(ExecutionError::BrokenReference(format!(
            "말단 Step으로 실행할 수 없는 참조: {scenario_id}"
        ))),
    }
}
