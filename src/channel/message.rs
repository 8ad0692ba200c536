use super::error::ChannelError;
use serde::Serialize;
use serde_json::{Map, Value};

/// 서비스로 내보내는 요청 한 줄이다.
#[derive(Debug, Serialize)]
pub(super) struct OutboundRequest<'a> {
    pub id: &'a str,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<&'a Value>,
}

/// 서비스가 자발적으로 보낸 이벤트이다.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelEvent {
    /// 이벤트 종류 (`mouseClicked` 등).
    pub event: String,
    /// 이벤트 페이로드.
    pub data: Value,
}

impl ChannelEvent {
    /// 페이로드 없는 이벤트를 만든다.
    pub fn bare(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: Value::Object(Map::new()),
        }
    }
}

/// 요청 ID로 매칭되는 응답이다.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct ResponseMessage {
    pub id: String,
    pub outcome: Result<Value, String>,
}

/// 분류를 마친 수신 메시지이다.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum InboundMessage {
    Response(ResponseMessage),
    Event(ChannelEvent),
}

/// 수신한 한 줄을 응답/이벤트로 분류한다.
///
/// `id`와 `success`가 있으면 응답, `event`가 있으면 이벤트, 그 외에는 프로토콜 오류이다.
pub(super) fn classify_line(line: &str) -> Result<InboundMessage, ChannelError> {
    let value: Value =
        serde_json::from_str(line).map_err(|err| ChannelError::Protocol(err.to_string()))?;
    let Value::Object(mut obj) = value else {
        return Err(ChannelError::Protocol("JSON 객체가 아닙니다.".into()));
    };

    if let (Some(Value::String(id)), Some(Value::Bool(success))) =
        (obj.get("id").cloned(), obj.get("success").cloned())
    {
        let outcome = if success {
            Ok(obj.remove("result").unwrap_or(Value::Null))
        } else {
            Err(match obj.remove("error") {
                Some(Value::String(msg)) => msg,
                Some(other) => other.to_string(),
                None => "알 수 없는 오류".to_string(),
            })
        };
        return Ok(InboundMessage::Response(ResponseMessage { id, outcome }));
    }

    if let Some(Value::String(event)) = obj.remove("event") {
        let data = match obj.remove("data") {
            Some(Value::Null) | None => Value::Object(Map::new()),
            Some(data) => data,
        };
        return Ok(InboundMessage::Event(ChannelEvent { event, data }));
    }

    Err(ChannelError::Protocol(
        "id/success 또는 event 필드가 없습니다.".into(),
    ))
}
