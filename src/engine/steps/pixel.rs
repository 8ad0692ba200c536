use super::super::error::ExecutionError;
use super::RunContext;
use crate::channel::ChannelError;
use crate::scenario::{Point, Rect, Rgb, Step};

/// 픽셀 색상 조건을 기다린다. 폴링 주기와 제한 시간은 서비스 쪽 계약이다.
pub(super) async fn wait_pixel_state(
    ctx: &RunContext,
    step_number: usize,
    step: &Step,
    position: Point,
    color: Rgb,
    threshold: u32,
) -> Result<(), ExecutionError> {
    let outcome = ctx
        .actions
        .wait_for_pixel_state(position, color, threshold, ctx.config.pixel_wait_timeout())
        .await;
    check_match(outcome, step_number, step)
}

/// 영역 색상 조건을 기다린다.
pub(super) async fn wait_pixel_zone(
    ctx: &RunContext,
    step_number: usize,
    step: &Step,
    rect: Rect,
    color: Rgb,
    threshold: u32,
) -> Result<(), ExecutionError> {
    let outcome = ctx
        .actions
        .wait_for_pixel_zone(rect, color, threshold, ctx.config.pixel_wait_timeout())
        .await;
    check_match(outcome, step_number, step)
}

fn check_match(
    outcome: Result<bool, ChannelError>,
    step_number: usize,
    step: &Step,
) -> Result<(), ExecutionError> {
    match outcome {
        Ok(true) => Ok(()),
        Ok(false) => Err(ExecutionError::PixelNotMatched {
            step_number,
            step: step.describe(),
        }),
        Err(source) => Err(ExecutionError::Native {
            step_number,
            step: step.describe(),
            source,
        }),
    }
}
