use super::client::MessageChannel;
use super::error::ChannelError;
use crate::scenario::{MouseButton, Point, Rect, Rgb};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

/// 네이티브 서비스가 보고하는 권한 상태이다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PermissionStatus {
    /// 입력 시뮬레이션(접근성) 권한.
    pub accessibility: bool,
    /// 화면 캡처 권한.
    pub screen_capture: bool,
}

impl PermissionStatus {
    /// 녹화와 재생에 필요한 권한이 모두 있는지 여부이다.
    pub fn all_granted(&self) -> bool {
        self.accessibility && self.screen_capture
    }
}

/// 녹화 오버레이에 표시할 모드이다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverlayMode {
    /// 클릭/키 입력을 녹화 중이다.
    Recording,
    /// 단일 픽셀 색상을 고르는 중이다.
    PixelPick,
    /// 영역을 드래그로 고르는 중이다.
    ZonePick,
    /// 대기 시간을 입력받는 중이다.
    TimeInput,
}

/// 네이티브 서비스가 제공하는 작업 목록이다.
///
/// 어떤 호출도 자동 재시도하지 않는다.
#[async_trait]
pub trait NativeActions: Send + Sync {
    /// 입력/캡처 권한을 확인한다.
    async fn check_permissions(&self) -> Result<PermissionStatus, ChannelError>;
    /// 녹화 오버레이를 띄운다.
    async fn show_recorder_overlay(&self) -> Result<(), ChannelError>;
    /// 녹화 오버레이를 숨긴다.
    async fn hide_recorder_overlay(&self) -> Result<(), ChannelError>;
    /// 오버레이 모드를 바꾼다.
    async fn set_recorder_state(&self, mode: OverlayMode) -> Result<(), ChannelError>;
    /// 색상 샘플링용 돋보기를 띄운다.
    async fn show_magnifier(&self) -> Result<(), ChannelError>;
    /// 돋보기를 숨긴다.
    async fn hide_magnifier(&self) -> Result<(), ChannelError>;
    /// 마우스 클릭을 실행한다.
    async fn execute_click(&self, position: Point, button: MouseButton) -> Result<(), ChannelError>;
    /// 키 입력을 실행한다.
    async fn execute_keypress(&self, key: &str, modifiers: &[String]) -> Result<(), ChannelError>;
    /// 한 픽셀의 현재 색상을 읽는다.
    async fn get_pixel_color(&self, position: Point) -> Result<Rgb, ChannelError>;
    /// 픽셀 색상이 기대값에 근접할 때까지 서비스 쪽에서 폴링한다. 일치 여부를 반환한다.
    async fn wait_for_pixel_state(
        &self,
        position: Point,
        color: Rgb,
        threshold: u32,
        timeout: Duration,
    ) -> Result<bool, ChannelError>;
    /// 영역 안 픽셀이 기대값에 근접할 때까지 서비스 쪽에서 폴링한다. 일치 여부를 반환한다.
    async fn wait_for_pixel_zone(
        &self,
        rect: Rect,
        color: Rgb,
        threshold: u32,
        timeout: Duration,
    ) -> Result<bool, ChannelError>;
}

/// NativeActions를 공유하기 위한 Arc 타입 별칭이다.
pub type SharedNativeActions = Arc<dyn NativeActions>;

/// MessageChannel을 통해 실제 서비스를 호출하는 구현이다.
#[derive(Debug, Clone)]
pub struct ChannelNativeActions {
    channel: MessageChannel,
    /// 픽셀 대기 호출에서 서비스 제한 시간 위에 더하는 여유 시간이다.
    pixel_wait_grace: Duration,
}

impl ChannelNativeActions {
    pub fn new(channel: MessageChannel, pixel_wait_grace: Duration) -> Self {
        Self {
            channel,
            pixel_wait_grace,
        }
    }

    async fn call_unit(&self, method: &str, params: Option<Value>) -> Result<(), ChannelError> {
        self.channel.request(method, params).await.map(|_| ())
    }

    async fn wait_for_pixel(
        &self,
        method: &str,
        mut params: Value,
        timeout: Duration,
    ) -> Result<bool, ChannelError> {
        params["timeoutMs"] = json!(timeout.as_millis() as u64);
        let result = self
            .channel
            .request_with_timeout(method, Some(params), timeout + self.pixel_wait_grace)
            .await?;
        parse_pixel_wait(result)
    }
}

/// 픽셀 대기 결과는 bool 또는 `{matched: bool}` 형태로 온다.
#[derive(Deserialize)]
#[serde(untagged)]
enum PixelWaitReply {
    Flag(bool),
    Detailed { matched: bool },
}

fn parse_pixel_wait(result: Value) -> Result<bool, ChannelError> {
    match serde_json::from_value::<PixelWaitReply>(result.clone()) {
        Ok(PixelWaitReply::Flag(matched)) | Ok(PixelWaitReply::Detailed { matched }) => Ok(matched),
        Err(_) => Err(ChannelError::UnexpectedResult(result.to_string())),
    }
}

#[async_trait]
impl NativeActions for ChannelNativeActions {
    async fn check_permissions(&self) -> Result<PermissionStatus, ChannelError> {
        let result = self.channel.request("checkPermissions", None).await?;
        serde_json::from_value(result.clone())
            .map_err(|_| ChannelError::UnexpectedResult(result.to_string()))
    }

    async fn show_recorder_overlay(&self) -> Result<(), ChannelError> {
        self.call_unit("showRecorderOverlay", None).await
    }

    async fn hide_recorder_overlay(&self) -> Result<(), ChannelError> {
        self.call_unit("hideRecorderOverlay", None).await
    }

    async fn set_recorder_state(&self, mode: OverlayMode) -> Result<(), ChannelError> {
        self.call_unit("setRecorderState", Some(json!({ "state": mode })))
            .await
    }

    async fn show_magnifier(&self) -> Result<(), ChannelError> {
        self.call_unit("showMagnifier", None).await
    }

    async fn hide_magnifier(&self) -> Result<(), ChannelError> {
        self.call_unit("hideMagnifier", None).await
    }

    async fn execute_click(
        &self,
        position: Point,
        button: MouseButton,
    ) -> Result<(), ChannelError> {
        self.call_unit(
            "executeClick",
            Some(json!({ "x": position.x, "y": position.y, "button": button })),
        )
        .await
    }

    async fn execute_keypress(&self, key: &str, modifiers: &[String]) -> Result<(), ChannelError> {
        self.call_unit(
            "executeKeypress",
            Some(json!({ "key": key, "modifiers": modifiers })),
        )
        .await
    }

    async fn get_pixel_color(&self, position: Point) -> Result<Rgb, ChannelError> {
        let result = self
            .channel
            .request("getPixelColor", Some(json!({ "x": position.x, "y": position.y })))
            .await?;
        serde_json::from_value(result.clone())
            .map_err(|_| ChannelError::UnexpectedResult(result.to_string()))
    }

    async fn wait_for_pixel_state(
        &self,
        position: Point,
        color: Rgb,
        threshold: u32,
        timeout: Duration,
    ) -> Result<bool, ChannelError> {
        self.wait_for_pixel(
            "waitForPixelState",
            json!({ "x": position.x, "y": position.y, "color": color, "threshold": threshold }),
            timeout,
        )
        .await
    }

    async fn wait_for_pixel_zone(
        &self,
        rect: Rect,
        color: Rgb,
        threshold: u32,
        timeout: Duration,
    ) -> Result<bool, ChannelError> {
        self.wait_for_pixel(
            "waitForPixelZone",
            json!({
                "x": rect.x,
                "y": rect.y,
                "width": rect.width,
                "height": rect.height,
                "color": color,
                "threshold": threshold,
            }),
            timeout,
        )
        .await
    }
}
