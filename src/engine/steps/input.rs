use super::super::error::ExecutionError;
use super::RunContext;
use crate::scenario::{MouseButton, Point, Step};

/// 클릭을 한 번 실행한다.
pub(super) async fn execute_click(
    ctx: &RunContext,
    step_number: usize,
    step: &Step,
    position: Point,
    button: MouseButton,
) -> Result<(), ExecutionError> {
    ctx.actions
        .execute_click(position, button)
        .await
        .map_err(|source| ExecutionError::Native {
            step_number,
            step: step.describe(),
            source,
        })
}

/// 키 입력을 한 번 실행한다.
pub(super) async fn execute_keypress(
    ctx: &RunContext,
    step_number: usize,
    step: &Step,
    key: &str,
    modifiers: &[String],
) -> Result<(), ExecutionError> {
    ctx.actions
        .execute_keypress(key, modifiers)
        .await
        .map_err(|source| ExecutionError::Native {
            step_number,
            step: step.describe(),
            source,
        })
}
