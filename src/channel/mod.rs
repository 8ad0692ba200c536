mod client;
mod error;
mod message;
mod native;
mod process;

pub use client::{
    DEFAULT_REQUEST_TIMEOUT, EXIT_EVENT, EventListener, EventSubscription, ListenerId,
    MessageChannel,
};
pub use error::ChannelError;
pub use message::ChannelEvent;
pub use native::{
    ChannelNativeActions, NativeActions, OverlayMode, PermissionStatus, SharedNativeActions,
};
pub use process::{NativeService, spawn_service};

#[cfg(test)]
pub(crate) use client::tests as test_support;
