use super::events::{RECORDER_EVENT_NAMES, parse_recorder_event};
use super::machine::{RecorderCommand, RecordingStateMachine};
use crate::channel::{
    ChannelError, ChannelEvent, EXIT_EVENT, EventSubscription, MessageChannel, SharedNativeActions,
};
use crate::config::RecorderConfig;
use crate::store::SharedScenarioStore;
use anyhow::bail;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// UI에서 녹화 세션으로 보내는 사용자 입력이다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderIntent {
    Start,
    InputChar(char),
    Backspace,
    Confirm,
    Cancel,
    Stop,
}

/// 채널 이벤트와 사용자 입력을 상태 기계로 전달하고, 상태 기계가 요구한 네이티브 명령을 실행한다.
pub struct RecordingSession {
    machine: RecordingStateMachine,
    store: SharedScenarioStore,
    actions: SharedNativeActions,
}

impl RecordingSession {
    pub fn new(
        store: SharedScenarioStore,
        actions: SharedNativeActions,
        config: RecorderConfig,
    ) -> Self {
        Self {
            machine: RecordingStateMachine::new(config),
            store,
            actions,
        }
    }

    pub fn machine(&self) -> &RecordingStateMachine {
        &self.machine
    }

    /// 녹화 이벤트와 exit 이벤트를 함께 받는 구독을 만든다.
    pub fn subscribe(channel: &MessageChannel) -> EventSubscription {
        let mut names: Vec<&str> = RECORDER_EVENT_NAMES.to_vec();
        names.push(EXIT_EVENT);
        channel.subscribe(&names)
    }

    /// 사용자 입력 하나를 처리한다.
    ///
    /// 시작 요청은 권한을 먼저 확인하며, 권한이 없으면 오류를 반환하고 상태를 바꾸지 않는다.
    pub async fn handle_intent(&mut self, intent: RecorderIntent) -> anyhow::Result<()> {
        let commands = match intent {
            RecorderIntent::Start => {
                if self.machine.is_idle() {
                    let permissions = self.actions.check_permissions().await?;
                    if !permissions.all_granted() {
                        bail!(
                            "녹화에 필요한 권한이 없습니다. (접근성: {}, 화면 캡처: {})",
                            permissions.accessibility,
                            permissions.screen_capture
                        );
                    }
                }
                let mut store = self.store.write().await;
                self.machine.start(&mut store)
            }
            RecorderIntent::InputChar(ch) => {
                self.machine.input_char(ch);
                Vec::new()
            }
            RecorderIntent::Backspace => {
                self.machine.backspace();
                Vec::new()
            }
            RecorderIntent::Confirm => {
                let mut store = self.store.write().await;
                self.machine.confirm(&mut store)
            }
            RecorderIntent::Cancel => {
                let mut store = self.store.write().await;
                self.machine.cancel(&mut store);
                Vec::new()
            }
            RecorderIntent::Stop => self.machine.stop(),
        };
        self.apply(commands).await;
        Ok(())
    }

    /// 채널 이벤트 하나를 처리한다. 알 수 없거나 잘못된 이벤트는 로그만 남긴다.
    pub async fn handle_channel_event(&mut self, event: &ChannelEvent) {
        let parsed = match parse_recorder_event(event) {
            Ok(Some(parsed)) => parsed,
            Ok(None) => {
                warn!(event = %event.event, "알 수 없는 녹화 이벤트를 무시합니다.");
                return;
            }
            Err(err) => {
                warn!(error = %err, "녹화 이벤트를 무시합니다.");
                return;
            }
        };
        let commands = {
            let mut store = self.store.write().await;
            self.machine.handle_event(&mut store, parsed)
        };
        self.apply(commands).await;
    }

    /// 입력 채널이 닫히거나, 취소되거나, 서비스 연결이 끊길 때까지 세션을 구동한다.
    pub async fn run(
        mut self,
        mut intents: UnboundedReceiver<RecorderIntent>,
        mut events: EventSubscription,
        cancel: CancellationToken,
    ) -> RecordingStateMachine {
        info!("녹화 세션 시작");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.finish(true).await;
                    break;
                }
                intent = intents.recv() => {
                    let Some(intent) = intent else {
                        self.finish(true).await;
                        break;
                    };
                    if let Err(err) = self.handle_intent(intent).await {
                        warn!(error = %err, "녹화 요청 처리 실패");
                    }
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        self.finish(false).await;
                        break;
                    };
                    if event.event == EXIT_EVENT {
                        warn!("네이티브 서비스 종료로 녹화 세션을 끝냅니다.");
                        self.finish(false).await;
                        break;
                    }
                    self.handle_channel_event(&event).await;
                }
            }
        }
        info!("녹화 세션 종료");
        self.machine
    }

    /// 상태 기계를 Idle로 정리한다. 서비스가 사라진 경우 네이티브 명령은 보내지 않는다.
    async fn finish(&mut self, service_alive: bool) {
        let commands = {
            let mut store = self.store.write().await;
            self.machine.finish(&mut store)
        };
        if service_alive {
            self.apply(commands).await;
        }
    }

    /// 상태 기계가 요구한 명령을 순서대로 실행한다. 실패는 로그만 남긴다.
    async fn apply(&self, commands: Vec<RecorderCommand>) {
        for command in commands {
            debug!(?command, "녹화 명령 실행");
            if let Err(err) = self.execute(command).await {
                warn!(?command, error = %err, "녹화 명령 실패");
            }
        }
    }

    async fn execute(&self, command: RecorderCommand) -> Result<(), ChannelError> {
        match command {
            RecorderCommand::ShowOverlay => self.actions.show_recorder_overlay().await,
            RecorderCommand::HideOverlay => self.actions.hide_recorder_overlay().await,
            RecorderCommand::SetState(mode) => self.actions.set_recorder_state(mode).await,
            RecorderCommand::ShowMagnifier => self.actions.show_magnifier().await,
            RecorderCommand::HideMagnifier => self.actions.hide_magnifier().await,
        }
    }
}
