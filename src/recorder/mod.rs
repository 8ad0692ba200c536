mod events;
mod machine;
mod session;

pub use events::{OverlayIcon, RECORDER_EVENT_NAMES, RecorderEvent, parse_recorder_event};
pub use machine::{RecorderCommand, RecorderState, RecordingStateMachine};
pub use session::{RecorderIntent, RecordingSession};
