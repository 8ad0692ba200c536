/// 시나리오 저장소 작업 중 발생 가능한 오류를 표현한다.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// 존재하지 않는 시나리오 ID이다.
    #[error("시나리오를 찾을 수 없습니다: {0}")]
    ScenarioNotFound(String),
    /// Step 인덱스가 목록 범위를 벗어났다.
    #[error("Step 인덱스 범위를 벗어났습니다: {index} (길이 {len})")]
    StepOutOfRange { index: usize, len: usize },
}
