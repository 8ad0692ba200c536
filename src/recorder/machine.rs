use super::events::{OverlayIcon, RecorderEvent};
use crate::channel::OverlayMode;
use crate::config::RecorderConfig;
use crate::scenario::{Point, Rect, Step};
use crate::store::{InsertAt, ScenarioStore};
use tracing::{debug, info, warn};

/// 녹화 흐름의 상위 상태이다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderState {
    /// 아무것도 하지 않는다.
    Idle,
    /// 새 초안 시나리오의 이름을 입력받는 중이다.
    Naming { scenario_id: String, buffer: String },
    /// 네이티브 이벤트를 Step으로 기록하는 중이다.
    Recording {
        scenario_id: String,
        /// 다음 Step을 넣을 위치.
        insert_at: InsertAt,
    },
}

/// 상태 전이의 결과로 네이티브 서비스에 보낼 명령이다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderCommand {
    ShowOverlay,
    HideOverlay,
    SetState(OverlayMode),
    ShowMagnifier,
    HideMagnifier,
}

/// 네이티브 이벤트를 Step으로 바꿔 ScenarioStore에 넣는 상태 기계이다.
///
/// 모든 전이는 동기적이며, 필요한 네이티브 호출은 [`RecorderCommand`] 목록으로 돌려준다.
/// 허용되지 않는 입력은 로그만 남기고 상태를 바꾸지 않는다.
#[derive(Debug)]
pub struct RecordingStateMachine {
    state: RecorderState,
    /// 녹화 중 오버레이 모드.
    mode: OverlayMode,
    /// 영역 선택 후 색상 샘플링을 기다리는 사각형.
    pending_zone: Option<Rect>,
    /// 사용자가 옮긴 오버레이 위치.
    overlay_position: Option<Point>,
    config: RecorderConfig,
}

impl RecordingStateMachine {
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            state: RecorderState::Idle,
            mode: OverlayMode::Recording,
            pending_zone: None,
            overlay_position: None,
            config,
        }
    }

    pub fn state(&self) -> &RecorderState {
        &self.state
    }

    pub fn mode(&self) -> OverlayMode {
        self.mode
    }

    pub fn pending_zone(&self) -> Option<Rect> {
        self.pending_zone
    }

    pub fn overlay_position(&self) -> Option<Point> {
        self.overlay_position
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, RecorderState::Idle)
    }

    /// 녹화를 시작한다.
    ///
    /// 선택된 시나리오가 있으면 선택된 Step 뒤(없으면 맨 뒤)부터 바로 기록하고,
    /// 없으면 초안 시나리오를 만들어 이름 입력 상태로 들어간다.
    pub fn start(&mut self, store: &mut ScenarioStore) -> Vec<RecorderCommand> {
        if !self.is_idle() {
            warn!(state = ?self.state, "이미 녹화 흐름이 진행 중이므로 시작 요청을 무시합니다.");
            return Vec::new();
        }
        let selection = store.selection().clone();
        match selection
            .scenario_id
            .filter(|id| store.scenario(id).is_some())
        {
            Some(scenario_id) => {
                let insert_at = selection
                    .step_index
                    .map_or(InsertAt::End, InsertAt::After);
                self.enter_recording(scenario_id, insert_at)
            }
            None => {
                let scenario_id = store.create_scenario(self.config.default_name.clone());
                store.select_scenario(Some(&scenario_id));
                info!(scenario_id = %scenario_id, "초안 시나리오 생성, 이름 입력 대기");
                self.state = RecorderState::Naming {
                    scenario_id,
                    buffer: String::new(),
                };
                Vec::new()
            }
        }
    }

    /// 이름 입력 버퍼에 문자를 붙인다.
    pub fn input_char(&mut self, ch: char) {
        match &mut self.state {
            RecorderState::Naming { buffer, .. } => buffer.push(ch),
            other => debug!(state = ?other, "이름 입력 중이 아니므로 문자를 무시합니다."),
        }
    }

    /// 이름 입력 버퍼의 마지막 문자를 지운다. 비어 있으면 그대로 둔다.
    pub fn backspace(&mut self) {
        if let RecorderState::Naming { buffer, .. } = &mut self.state {
            buffer.pop();
        }
    }

    /// 입력한 이름(비어 있으면 기본 이름)을 확정하고 곧바로 녹화에 들어간다.
    pub fn confirm(&mut self, store: &mut ScenarioStore) -> Vec<RecorderCommand> {
        if !matches!(self.state, RecorderState::Naming { .. }) {
            warn!(state = ?self.state, "이름 입력 중이 아니므로 확정 요청을 무시합니다.");
            return Vec::new();
        }
        let RecorderState::Naming {
            scenario_id,
            buffer,
        } = std::mem::replace(&mut self.state, RecorderState::Idle)
        else {
            return Vec::new();
        };
        let trimmed = buffer.trim();
        let name = if trimmed.is_empty() {
            self.config.default_name.as_str()
        } else {
            trimmed
        };
        if let Err(err) = store.rename_scenario(&scenario_id, name) {
            warn!(error = %err, "초안 시나리오가 사라져 녹화를 시작하지 않습니다.");
            return Vec::new();
        }
        store.select_scenario(Some(&scenario_id));
        self.enter_recording(scenario_id, InsertAt::End)
    }

    /// 이름 입력을 취소하고 초안 시나리오를 삭제한다.
    pub fn cancel(&mut self, store: &mut ScenarioStore) {
        if !matches!(self.state, RecorderState::Naming { .. }) {
            warn!(state = ?self.state, "이름 입력 중이 아니므로 취소 요청을 무시합니다.");
            return;
        }
        let RecorderState::Naming { scenario_id, .. } =
            std::mem::replace(&mut self.state, RecorderState::Idle)
        else {
            return;
        };
        if let Err(err) = store.delete_scenario(&scenario_id) {
            warn!(error = %err, "초안 시나리오 삭제 실패");
        }
        info!(scenario_id = %scenario_id, "초안 시나리오 취소");
    }

    /// 녹화를 끝낸다. 완성되지 않은 영역 선택도 버린다.
    pub fn stop(&mut self) -> Vec<RecorderCommand> {
        let RecorderState::Recording { scenario_id, .. } = &self.state else {
            warn!(state = ?self.state, "녹화 중이 아니므로 중지 요청을 무시합니다.");
            return Vec::new();
        };
        info!(scenario_id = %scenario_id, "녹화 종료");
        let mut commands = Vec::new();
        if self.mode == OverlayMode::PixelPick {
            commands.push(RecorderCommand::HideMagnifier);
        }
        commands.push(RecorderCommand::HideOverlay);
        self.state = RecorderState::Idle;
        self.mode = OverlayMode::Recording;
        self.pending_zone = None;
        commands
    }

    /// 진행 중인 흐름을 정리하고 Idle로 돌아간다. 세션 종료 경로에서 쓴다.
    ///
    /// 녹화 중이면 중지하고, 이름 입력 중이면 초안 시나리오를 삭제한다.
    pub fn finish(&mut self, store: &mut ScenarioStore) -> Vec<RecorderCommand> {
        match self.state {
            RecorderState::Recording { .. } => self.stop(),
            RecorderState::Naming { .. } => {
                self.cancel(store);
                Vec::new()
            }
            RecorderState::Idle => Vec::new(),
        }
    }

    /// 네이티브 이벤트 하나를 처리한다. 녹화 중이 아니면 무시한다.
    pub fn handle_event(
        &mut self,
        store: &mut ScenarioStore,
        event: RecorderEvent,
    ) -> Vec<RecorderCommand> {
        if !matches!(self.state, RecorderState::Recording { .. }) {
            debug!(?event, "녹화 중이 아니므로 이벤트를 무시합니다.");
            return Vec::new();
        }
        match event {
            RecorderEvent::OverlayIconClicked(icon) => self.switch_mode(icon),
            RecorderEvent::OverlayClosed => self.stop(),
            RecorderEvent::OverlayMoved(position) => {
                self.overlay_position = Some(position);
                Vec::new()
            }
            RecorderEvent::MouseClicked { position, button } => {
                self.record(store, Step::Click { position, button });
                Vec::new()
            }
            RecorderEvent::KeyPressed { key, modifiers } => {
                self.record(store, Step::Keypress { key, modifiers });
                Vec::new()
            }
            RecorderEvent::TimeInputCompleted { ms } => {
                self.record(store, Step::Delay { ms });
                self.back_to_recording()
            }
            RecorderEvent::ZoneSelected(rect) => {
                self.pending_zone = Some(rect);
                self.mode = OverlayMode::PixelPick;
                vec![
                    RecorderCommand::SetState(OverlayMode::PixelPick),
                    RecorderCommand::ShowMagnifier,
                ]
            }
            RecorderEvent::PixelSelected { position, color } => {
                let threshold = self.config.default_threshold;
                let step = match self.pending_zone.take() {
                    Some(rect) => Step::PixelZone {
                        rect,
                        color,
                        threshold,
                    },
                    None => Step::PixelState {
                        position,
                        color,
                        threshold,
                    },
                };
                self.record(store, step);
                self.back_to_recording()
            }
        }
    }

    fn enter_recording(
        &mut self,
        scenario_id: String,
        insert_at: InsertAt,
    ) -> Vec<RecorderCommand> {
        info!(scenario_id = %scenario_id, ?insert_at, "녹화 시작");
        self.state = RecorderState::Recording {
            scenario_id,
            insert_at,
        };
        self.mode = OverlayMode::Recording;
        self.pending_zone = None;
        vec![
            RecorderCommand::ShowOverlay,
            RecorderCommand::SetState(OverlayMode::Recording),
        ]
    }

    fn switch_mode(&mut self, icon: OverlayIcon) -> Vec<RecorderCommand> {
        let mode = match icon {
            OverlayIcon::Stop => return self.stop(),
            OverlayIcon::Pixel => OverlayMode::PixelPick,
            OverlayIcon::Zone => OverlayMode::ZonePick,
            OverlayIcon::Delay => OverlayMode::TimeInput,
        };
        let mut commands = Vec::new();
        if self.mode == OverlayMode::PixelPick && mode != OverlayMode::PixelPick {
            commands.push(RecorderCommand::HideMagnifier);
        }
        // 영역 선택 뒤 색상을 고르는 중이면 대기 중인 사각형을 유지한다.
        if mode != OverlayMode::PixelPick {
            self.pending_zone = None;
        }
        let magnifier_shown = self.mode == OverlayMode::PixelPick;
        self.mode = mode;
        commands.push(RecorderCommand::SetState(mode));
        if mode == OverlayMode::PixelPick && !magnifier_shown {
            commands.push(RecorderCommand::ShowMagnifier);
        }
        commands
    }

    fn back_to_recording(&mut self) -> Vec<RecorderCommand> {
        let mut commands = Vec::new();
        if self.mode == OverlayMode::PixelPick {
            commands.push(RecorderCommand::HideMagnifier);
        }
        self.mode = OverlayMode::Recording;
        commands.push(RecorderCommand::SetState(OverlayMode::Recording));
        commands
    }

    /// Step을 삽입 위치에 넣고 커서를 새 Step 뒤로 옮긴다.
    fn record(&mut self, store: &mut ScenarioStore, step: Step) {
        let RecorderState::Recording {
            scenario_id,
            insert_at,
        } = &mut self.state
        else {
            return;
        };
        let description = step.describe();
        match store.add_step(scenario_id, step, *insert_at) {
            Ok(index) => {
                *insert_at = InsertAt::After(index);
                store.select_step(Some(index));
                debug!(index, step = %description, "Step 기록");
            }
            Err(err) => warn!(error = %err, step = %description, "Step 기록 실패"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{MouseButton, Rgb};

    fn machine() -> RecordingStateMachine {
        RecordingStateMachine::new(RecorderConfig::default())
    }

    fn click(x: i32) -> RecorderEvent {
        RecorderEvent::MouseClicked {
            position: Point { x, y: 0 },
            button: MouseButton::Left,
        }
    }

    fn steps(store: &ScenarioStore, id: &str) -> Vec<Step> {
        store.scenario(id).expect("시나리오 없음").steps.clone()
    }

    fn click_step(x: i32) -> Step {
        Step::Click {
            position: Point { x, y: 0 },
            button: MouseButton::Left,
        }
    }

    #[test]
    fn cancelled_draft_is_removed_from_store() {
        let mut store = ScenarioStore::in_memory();
        let mut recorder = machine();
        recorder.start(&mut store);
        let RecorderState::Naming { scenario_id, .. } = recorder.state().clone() else {
            panic!("이름 입력 상태가 아님");
        };
        assert!(store.scenario(&scenario_id).is_some());

        recorder.cancel(&mut store);

        assert!(recorder.is_idle());
        assert!(store.scenario(&scenario_id).is_none());
    }

    #[test]
    fn finish_during_naming_removes_draft() {
        let mut store = ScenarioStore::in_memory();
        let mut recorder = machine();
        recorder.start(&mut store);
        recorder.input_char('a');

        assert!(recorder.finish(&mut store).is_empty());

        assert!(recorder.is_idle());
        assert!(store.scenarios().is_empty());
    }

    #[test]
    fn naming_buffer_edits_and_confirm_uses_trimmed_or_default_name() {
        let mut store = ScenarioStore::in_memory();
        let mut recorder = machine();
        recorder.start(&mut store);
        recorder.backspace();
        for ch in " 로그인 x".chars() {
            recorder.input_char(ch);
        }
        recorder.backspace();
        let commands = recorder.confirm(&mut store);

        let RecorderState::Recording { scenario_id, .. } = recorder.state().clone() else {
            panic!("녹화 상태가 아님");
        };
        assert_eq!(store.scenario(&scenario_id).expect("없음").name, "로그인");
        assert_eq!(
            commands,
            vec![
                RecorderCommand::ShowOverlay,
                RecorderCommand::SetState(OverlayMode::Recording)
            ]
        );

        recorder.stop();
        store.select_scenario(None);
        recorder.start(&mut store);
        recorder.input_char(' ');
        recorder.confirm(&mut store);
        let RecorderState::Recording { scenario_id, .. } = recorder.state().clone() else {
            panic!("녹화 상태가 아님");
        };
        assert_eq!(store.scenario(&scenario_id).expect("없음").name, "새 시나리오");
    }

    #[test]
    fn consecutive_events_insert_after_selected_step_in_capture_order() {
        let mut store = ScenarioStore::in_memory();
        let id = store.create_scenario("s");
        store.add_step(&id, click_step(100), InsertAt::End).unwrap();
        store.add_step(&id, click_step(200), InsertAt::End).unwrap();
        store.select_scenario(Some(&id));
        store.select_step(Some(0));
        let mut recorder = machine();

        recorder.start(&mut store);
        recorder.handle_event(&mut store, click(1));
        recorder.handle_event(&mut store, click(2));

        assert_eq!(
            steps(&store, &id),
            vec![click_step(100), click_step(1), click_step(2), click_step(200)]
        );
        assert_eq!(store.selection().step_index, Some(2));
    }

    #[test]
    fn start_while_busy_is_ignored() {
        let mut store = ScenarioStore::in_memory();
        let id = store.create_scenario("s");
        store.select_scenario(Some(&id));
        let mut recorder = machine();
        recorder.start(&mut store);
        let before = recorder.state().clone();

        assert!(recorder.start(&mut store).is_empty());
        assert_eq!(recorder.state(), &before);
        assert_eq!(store.scenarios().len(), 1);
    }

    #[test]
    fn zone_then_pixel_combines_into_one_pixel_zone_step() {
        let mut store = ScenarioStore::in_memory();
        let id = store.create_scenario("s");
        store.select_scenario(Some(&id));
        let mut recorder = machine();
        recorder.start(&mut store);
        let rect = Rect {
            x: 5,
            y: 6,
            width: 10,
            height: 20,
        };
        let color = Rgb { r: 1, g: 2, b: 3 };

        let commands =
            recorder.handle_event(&mut store, RecorderEvent::OverlayIconClicked(OverlayIcon::Zone));
        assert_eq!(commands, vec![RecorderCommand::SetState(OverlayMode::ZonePick)]);
        let commands = recorder.handle_event(&mut store, RecorderEvent::ZoneSelected(rect));
        assert_eq!(
            commands,
            vec![
                RecorderCommand::SetState(OverlayMode::PixelPick),
                RecorderCommand::ShowMagnifier
            ]
        );
        assert_eq!(recorder.pending_zone(), Some(rect));
        let commands = recorder.handle_event(
            &mut store,
            RecorderEvent::PixelSelected {
                position: Point { x: 7, y: 7 },
                color,
            },
        );

        assert_eq!(
            commands,
            vec![
                RecorderCommand::HideMagnifier,
                RecorderCommand::SetState(OverlayMode::Recording)
            ]
        );
        assert_eq!(recorder.pending_zone(), None);
        assert_eq!(
            steps(&store, &id),
            vec![Step::PixelZone {
                rect,
                color,
                threshold: 30
            }]
        );
    }

    #[test]
    fn pixel_icon_after_zone_selection_keeps_pending_rectangle() {
        let mut store = ScenarioStore::in_memory();
        let id = store.create_scenario("s");
        store.select_scenario(Some(&id));
        let mut recorder = machine();
        recorder.start(&mut store);
        let rect = Rect {
            x: 1,
            y: 2,
            width: 3,
            height: 4,
        };
        let color = Rgb { r: 5, g: 6, b: 7 };

        recorder.handle_event(&mut store, RecorderEvent::ZoneSelected(rect));
        let commands = recorder.handle_event(
            &mut store,
            RecorderEvent::OverlayIconClicked(OverlayIcon::Pixel),
        );
        assert_eq!(commands, vec![RecorderCommand::SetState(OverlayMode::PixelPick)]);
        assert_eq!(recorder.pending_zone(), Some(rect));
        recorder.handle_event(
            &mut store,
            RecorderEvent::PixelSelected {
                position: Point { x: 2, y: 3 },
                color,
            },
        );

        assert_eq!(
            steps(&store, &id),
            vec![Step::PixelZone {
                rect,
                color,
                threshold: 30
            }]
        );
    }

    #[test]
    fn pixel_without_pending_zone_records_pixel_state() {
        let mut store = ScenarioStore::in_memory();
        let id = store.create_scenario("s");
        store.select_scenario(Some(&id));
        let mut recorder = machine();
        recorder.start(&mut store);
        let color = Rgb { r: 9, g: 8, b: 7 };

        recorder.handle_event(&mut store, RecorderEvent::OverlayIconClicked(OverlayIcon::Pixel));
        recorder.handle_event(
            &mut store,
            RecorderEvent::PixelSelected {
                position: Point { x: 4, y: 2 },
                color,
            },
        );

        assert_eq!(
            steps(&store, &id),
            vec![Step::PixelState {
                position: Point { x: 4, y: 2 },
                color,
                threshold: 30
            }]
        );
    }

    #[test]
    fn stopping_mid_zone_capture_clears_pending_rectangle() {
        let mut store = ScenarioStore::in_memory();
        let id = store.create_scenario("s");
        store.select_scenario(Some(&id));
        let mut recorder = machine();
        recorder.start(&mut store);
        recorder.handle_event(
            &mut store,
            RecorderEvent::ZoneSelected(Rect {
                x: 0,
                y: 0,
                width: 1,
                height: 1,
            }),
        );

        let commands = recorder.handle_event(&mut store, RecorderEvent::OverlayClosed);

        assert_eq!(
            commands,
            vec![RecorderCommand::HideMagnifier, RecorderCommand::HideOverlay]
        );
        assert!(recorder.is_idle());
        assert_eq!(recorder.pending_zone(), None);

        recorder.start(&mut store);
        recorder.handle_event(
            &mut store,
            RecorderEvent::PixelSelected {
                position: Point { x: 1, y: 1 },
                color: Rgb { r: 0, g: 0, b: 0 },
            },
        );
        assert!(matches!(steps(&store, &id)[0], Step::PixelState { .. }));
    }

    #[test]
    fn delay_input_and_overlay_moves_are_tracked() {
        let mut store = ScenarioStore::in_memory();
        let id = store.create_scenario("s");
        store.select_scenario(Some(&id));
        let mut recorder = machine();
        recorder.start(&mut store);

        let commands = recorder.handle_event(
            &mut store,
            RecorderEvent::OverlayIconClicked(OverlayIcon::Delay),
        );
        assert_eq!(commands, vec![RecorderCommand::SetState(OverlayMode::TimeInput)]);
        recorder.handle_event(&mut store, RecorderEvent::TimeInputCompleted { ms: 1500 });
        recorder.handle_event(&mut store, RecorderEvent::OverlayMoved(Point { x: 40, y: 50 }));

        assert_eq!(recorder.mode(), OverlayMode::Recording);
        assert_eq!(recorder.overlay_position(), Some(Point { x: 40, y: 50 }));
        assert_eq!(steps(&store, &id), vec![Step::Delay { ms: 1500 }]);
    }

    #[test]
    fn events_outside_recording_are_ignored() {
        let mut store = ScenarioStore::in_memory();
        let id = store.create_scenario("s");
        let mut recorder = machine();

        assert!(recorder.handle_event(&mut store, click(1)).is_empty());
        assert!(recorder.stop().is_empty());
        assert!(steps(&store, &id).is_empty());
    }
}
