/// 메시지 채널과 네이티브 서비스 호출에서 발생하는 오류이다.
///
/// 모든 오류는 요청 하나 또는 메시지 하나에 국한되며 채널 자체를 닫지 않는다.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// 형식이 잘못되었거나 라우팅할 수 없는 메시지이다.
    #[error("잘못된 메시지입니다: {0}")]
    Protocol(String),
    /// 제한 시간 안에 응답이 오지 않았다.
    #[error("요청 시간 초과: {method} ({timeout_ms}ms)")]
    RequestTimeout { method: String, timeout_ms: u64 },
    /// 서비스가 `success:false`로 응답했다.
    #[error("네이티브 작업 실패: {0}")]
    RemoteAction(String),
    /// 전송로가 닫혀 서비스를 재시작하기 전까지 사용할 수 없다.
    #[error("네이티브 서비스를 사용할 수 없습니다.")]
    ServiceUnavailable,
    /// 요청을 JSON으로 직렬화하지 못했다.
    #[error("요청 직렬화 실패: {0}")]
    Encode(String),
    /// 응답의 result 형태가 기대와 다르다.
    #[error("응답 형식이 올바르지 않습니다: {0}")]
    UnexpectedResult(String),
}
