/// 한 번의 실행이 끝난 최종 상태이다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// 모든 Step을 끝까지 실행했다.
    Completed,
    /// 취소 신호로 중단되었다.
    Aborted,
    /// 그 밖의 실패로 중단되었다.
    Error(String),
}

/// 진행 상황의 상태 값이다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressStatus {
    /// 입력 Step 실행 중.
    Running,
    /// 픽셀 조건을 기다리는 중.
    Waiting,
    /// 실행 종료.
    Finished(RunStatus),
}

/// 펼친 전체 Step 수 기준의 진행 상황이다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionProgress {
    /// 지금까지 시작한 Step 번호 (1부터).
    pub current: usize,
    /// 참조된 하위 시나리오까지 펼친 전체 Step 수.
    pub total: usize,
    /// 현재 상태.
    pub status: ProgressStatus,
}

/// 엔진에서 UI로 전달되는 주요 이벤트 모델이다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// 진행 상황 갱신.
    Progress(ExecutionProgress),
    /// Step별 로그 라인.
    StepLog { step_number: usize, line: String },
}
