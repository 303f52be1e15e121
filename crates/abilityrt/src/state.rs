//! Lifecycle and connection states.
//!
//! Numeric values are stable: they travel in `ABILITY_TRANSITION_DONE`
//! requests and in running-info replies.

use ipc::parcel;

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AbilityState {
    #[default]
    Initial = 0,
    Inactive = 1,
    Active = 2,
    Inactivating = 5,
    Activating = 6,
    Terminating = 8,
    Foreground = 9,
    Background = 10,
    Foregrounding = 11,
    Backgrounding = 12,
    ForegroundFailed = 13,
    ForegroundInvalidMode = 14,
}

impl AbilityState {
    pub const ALL: [AbilityState; 12] = [
        AbilityState::Initial,
        AbilityState::Inactive,
        AbilityState::Active,
        AbilityState::Inactivating,
        AbilityState::Activating,
        AbilityState::Terminating,
        AbilityState::Foreground,
        AbilityState::Background,
        AbilityState::Foregrounding,
        AbilityState::Backgrounding,
        AbilityState::ForegroundFailed,
        AbilityState::ForegroundInvalidMode,
    ];

    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn from_i32(v: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_i32() == v)
    }

    pub fn name(self) -> &'static str {
        match self {
            AbilityState::Initial => "INITIAL",
            AbilityState::Inactive => "INACTIVE",
            AbilityState::Active => "ACTIVE",
            AbilityState::Inactivating => "INACTIVATING",
            AbilityState::Activating => "ACTIVATING",
            AbilityState::Terminating => "TERMINATING",
            AbilityState::Foreground => "FOREGROUND",
            AbilityState::Background => "BACKGROUND",
            AbilityState::Foregrounding => "FOREGROUNDING",
            AbilityState::Backgrounding => "BACKGROUNDING",
            AbilityState::ForegroundFailed => "FOREGROUND_FAILED",
            AbilityState::ForegroundInvalidMode => "FOREGROUND_INVALID_MODE",
        }
    }

    /// States entered while waiting for the app to confirm a transition.
    pub fn is_transitional(self) -> bool {
        matches!(
            self,
            AbilityState::Activating
                | AbilityState::Inactivating
                | AbilityState::Foregrounding
                | AbilityState::Backgrounding
                | AbilityState::Terminating
        )
    }

    pub fn read(p: &mut ipc::Parcel) -> parcel::Result<Self> {
        let v = p.read_i32()?;
        Self::from_i32(v).ok_or_else(|| parcel::Error::InvalidValue(format!("ability state {}", v)))
    }
}

impl std::fmt::Display for AbilityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Connection record states. The normal cycle is
/// `Connecting -> Connected -> Disconnecting -> Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
}

impl ConnectionState {
    pub fn name(self) -> &'static str {
        match self {
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Disconnecting => "DISCONNECTING",
            ConnectionState::Disconnected => "DISCONNECTED",
        }
    }

    /// Whether `self -> next` is an allowed edge. Abandoning a connect goes
    /// straight from `Connecting` to `Disconnecting`.
    pub fn can_move_to(self, next: ConnectionState) -> bool {
        matches!(
            (self, next),
            (ConnectionState::Connecting, ConnectionState::Connected)
                | (ConnectionState::Connecting, ConnectionState::Disconnecting)
                | (ConnectionState::Connected, ConnectionState::Disconnecting)
                | (ConnectionState::Disconnecting, ConnectionState::Disconnected)
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
