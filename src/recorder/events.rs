use crate::channel::ChannelEvent;
use crate::scenario::{MouseButton, Point, Rect, Rgb};
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// 녹화 오버레이 아이콘 종류이다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayIcon {
    Stop,
    Pixel,
    Zone,
    Delay,
}

/// 녹화 상태 기계가 이해하는 네이티브 이벤트이다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderEvent {
    OverlayIconClicked(OverlayIcon),
    MouseClicked { position: Point, button: MouseButton },
    KeyPressed { key: String, modifiers: Vec<String> },
    ZoneSelected(Rect),
    PixelSelected { position: Point, color: Rgb },
    OverlayMoved(Point),
    OverlayClosed,
    TimeInputCompleted { ms: u64 },
}

/// 녹화 세션이 구독하는 이벤트 이름 목록이다.
pub const RECORDER_EVENT_NAMES: [&str; 8] = [
    "overlayIconClicked",
    "mouseClicked",
    "keyPressed",
    "zoneSelected",
    "pixelSelected",
    "overlayMoved",
    "overlayClosed",
    "timeInputCompleted",
];

#[derive(Deserialize)]
struct IconData {
    icon: OverlayIcon,
}

#[derive(Deserialize)]
struct MouseData {
    x: i32,
    y: i32,
    #[serde(default)]
    button: MouseButton,
}

#[derive(Deserialize)]
struct KeyData {
    key: String,
    #[serde(default)]
    modifiers: Vec<String>,
}

#[derive(Deserialize)]
struct PixelData {
    x: i32,
    y: i32,
    color: Rgb,
}

#[derive(Deserialize)]
struct TimeData {
    ms: u64,
}

/// 이벤트 이름을 알 수 없으면 `Ok(None)`, 페이로드가 잘못되었으면 오류를 반환한다.
pub fn parse_recorder_event(event: &ChannelEvent) -> anyhow::Result<Option<RecorderEvent>> {
    let parsed = match event.event.as_str() {
        "overlayIconClicked" => {
            RecorderEvent::OverlayIconClicked(payload::<IconData>(event)?.icon)
        }
        "mouseClicked" => {
            let data: MouseData = payload(event)?;
            RecorderEvent::MouseClicked {
                position: Point { x: data.x, y: data.y },
                button: data.button,
            }
        }
        "keyPressed" => {
            let data: KeyData = payload(event)?;
            RecorderEvent::KeyPressed {
                key: data.key,
                modifiers: data.modifiers,
            }
        }
        "zoneSelected" => RecorderEvent::ZoneSelected(payload(event)?),
        "pixelSelected" => {
            let data: PixelData = payload(event)?;
            RecorderEvent::PixelSelected {
                position: Point { x: data.x, y: data.y },
                color: data.color,
            }
        }
        "overlayMoved" => RecorderEvent::OverlayMoved(payload(event)?),
        "overlayClosed" => RecorderEvent::OverlayClosed,
        "timeInputCompleted" => RecorderEvent::TimeInputCompleted {
            ms: payload::<TimeData>(event)?.ms,
        },
        _ => return Ok(None),
    };
    Ok(Some(parsed))
}

fn payload<T: DeserializeOwned>(event: &ChannelEvent) -> anyhow::Result<T> {
    serde_json::from_value(event.data.clone())
        .map_err(|err| anyhow::anyhow!("{} 페이로드 해석 실패: {err}", event.event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(name: &str, data: serde_json::Value) -> ChannelEvent {
        ChannelEvent {
            event: name.to_string(),
            data,
        }
    }

    #[test]
    fn parses_known_payloads() {
        assert_eq!(
            parse_recorder_event(&event("mouseClicked", json!({"x": 3, "y": 4}))).unwrap(),
            Some(RecorderEvent::MouseClicked {
                position: Point { x: 3, y: 4 },
                button: MouseButton::Left,
            })
        );
        assert_eq!(
            parse_recorder_event(&event("overlayIconClicked", json!({"icon": "zone"}))).unwrap(),
            Some(RecorderEvent::OverlayIconClicked(OverlayIcon::Zone))
        );
        assert_eq!(
            parse_recorder_event(&event(
                "pixelSelected",
                json!({"x": 1, "y": 2, "color": {"r": 10, "g": 20, "b": 30}})
            ))
            .unwrap(),
            Some(RecorderEvent::PixelSelected {
                position: Point { x: 1, y: 2 },
                color: Rgb { r: 10, g: 20, b: 30 },
            })
        );
        assert_eq!(
            parse_recorder_event(&ChannelEvent::bare("overlayClosed")).unwrap(),
            Some(RecorderEvent::OverlayClosed)
        );
    }

    #[test]
    fn unknown_event_is_none_and_bad_payload_is_error() {
        assert_eq!(parse_recorder_event(&ChannelEvent::bare("windowFocused")).unwrap(), None);
        assert!(parse_recorder_event(&event("keyPressed", json!({"code": 1}))).is_err());
    }
}
