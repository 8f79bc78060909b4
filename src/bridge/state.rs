use std::fmt;

use dashbus_error::BridgeError;
use serde::Serialize;

/// Состояние соединения с брокером.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

/// Состояние соединения вместе с причиной последнего разрыва.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkStatus {
    pub state: LinkState,
    pub last_error: Option<BridgeError>,
}

impl LinkState {
    pub fn is_connected(self) -> bool {
        self == LinkState::Connected
    }

    /// Допустим ли переход из текущего состояния в `next`.
    ///
    /// Цикл `Disconnected → Connecting → Connected → Disconnected`; из
    /// `Connecting` можно вернуться в `Disconnected` при неудаче.
    pub fn can_transition_to(
        self,
        next: LinkState,
    ) -> bool {
        use LinkState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connected, Disconnected)
        )
    }
}

impl LinkStatus {
    pub fn disconnected() -> Self {
        Self {
            state: LinkState::Disconnected,
            last_error: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }
}

impl Default for LinkStatus {
    fn default() -> Self {
        Self::disconnected()
    }
}

impl fmt::Display for LinkState {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let s = match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
        };
        f.write_str(s)
    }
}
