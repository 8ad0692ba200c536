use super::super::events::{EngineEvent, ExecutionProgress, ProgressStatus};
use super::super::state::RunState;
use tokio::sync::mpsc::UnboundedSender;

/// Step 로그를 전송한다.
pub(super) fn log_step(sender: &UnboundedSender<EngineEvent>, step_number: usize, line: &str) {
    let _ = sender.send(EngineEvent::StepLog {
        step_number,
        line: line.to_string(),
    });
}

/// 현재 카운터 기준 진행 상황을 전송한다. 수신자가 없어도 실행은 계속된다.
pub(in crate::engine) fn report_progress(
    sender: &UnboundedSender<EngineEvent>,
    state: &RunState,
    status: ProgressStatus,
) {
    let _ = sender.send(EngineEvent::Progress(ExecutionProgress {
        current: state.current,
        total: state.total,
        status,
    }));
}
