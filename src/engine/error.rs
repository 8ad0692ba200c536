use crate::channel::ChannelError;

/// 실행 중 전체 재귀 실행을 되감는 오류이다.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    /// 사용자가 실행을 취소했다. 실패와 구분된다.
    #[error("사용자에 의해 실행이 중단되었습니다.")]
    Cancelled,
    /// scenario-ref 대상이 존재하지 않는다.
    #[error("참조한 시나리오를 찾을 수 없습니다: {0}")]
    BrokenReference(String),
    /// 실행 중인 조상 시나리오를 다시 참조했다.
    #[error("순환 참조가 감지되었습니다: {0}")]
    CircularReference(String),
    /// 네이티브 서비스 호출이 실패했다.
    #[error("Step {step_number} ({step}) 실패: {source}")]
    Native {
        step_number: usize,
        step: String,
        source: ChannelError,
    },
    /// 픽셀 조건이 제한 시간 안에 충족되지 않았다.
    #[error("픽셀 조건이 충족되지 않았습니다: Step {step_number} ({step})")]
    PixelNotMatched { step_number: usize, step: String },
}
