//! # Error Taxonomy
//!
//! Every failure an ability-manager operation can report, with the stable
//! numeric status it travels as. A stub writes `Error::code()` into the reply;
//! a proxy rebuilds the error with `Error::from_code()`.
//!
//! Domain statuses live above the ability-manager offset. Generic statuses
//! reuse the transport-level numbers from `ipc::status`.

use ipc::status;

pub const ERR_OK: i32 = 0;
pub const ERR_PERMISSION_DENIED: i32 = status::ERR_PERMISSION_DENIED;
pub const ERR_INVALID_STATE: i32 = status::ERR_INVALID_STATE;
pub const ERR_INVALID_VALUE: i32 = status::ERR_INVALID_VALUE;
pub const ERR_DEAD_OBJECT: i32 = status::ERR_DEAD_OBJECT;
pub const ERR_TIMED_OUT: i32 = status::ERR_TIMED_OUT;

const AAFWK_OFFSET: i32 = 2097152;

pub const RESOLVE_ABILITY_ERR: i32 = AAFWK_OFFSET;
pub const RESOLVE_APP_ERR: i32 = AAFWK_OFFSET + 3;
pub const CREATE_ABILITY_RECORD_FAILED: i32 = AAFWK_OFFSET + 6;
pub const CONNECTION_NOT_EXIST: i32 = AAFWK_OFFSET + 9;
pub const INVALID_CONNECTION_STATE: i32 = AAFWK_OFFSET + 10;
pub const LOAD_ABILITY_TIMEOUT: i32 = AAFWK_OFFSET + 11;
pub const CONNECTION_TIMEOUT: i32 = AAFWK_OFFSET + 12;
pub const INNER_ERR: i32 = AAFWK_OFFSET + 15;
pub const TARGET_ABILITY_NOT_SERVICE: i32 = AAFWK_OFFSET + 18;

// Statuses specific to this runtime.
pub const ERR_LIMIT_REACHED: i32 = AAFWK_OFFSET + 0x100;
pub const ERR_UNKNOWN_ABILITY_TYPE: i32 = AAFWK_OFFSET + 0x101;
pub const ERR_RESTART_NOT_ALLOWED: i32 = AAFWK_OFFSET + 0x102;
pub const ERR_CANCELLED: i32 = AAFWK_OFFSET + 0x103;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Interface token mismatch or an operation issued in the wrong state.
    InvalidState,
    /// Missing required argument, unknown token, or a rejected transition.
    InvalidValue,
    PermissionDenied,
    /// No ability matches the request.
    ResolveAbility,
    /// The application owning the ability cannot be resolved.
    ResolveApp,
    CreateRecordFailed,
    ConnectionNotExist,
    InvalidConnectionState,
    LoadTimeout,
    ConnectionTimeout,
    /// Connect or stop requested on something that is not a service.
    TargetNotService,
    InnerError,
    /// The bounded task queue is full.
    LimitReached,
    UnknownAbilityType,
    /// Restart budget exhausted or restart window not yet elapsed.
    RestartNotAllowed,
    Timeout,
    DeadObject,
    Cancelled,
    /// A status this build does not know.
    Other(i32),
}

impl Error {
    pub fn code(&self) -> i32 {
        match self {
            Error::InvalidState => ERR_INVALID_STATE,
            Error::InvalidValue => ERR_INVALID_VALUE,
            Error::PermissionDenied => ERR_PERMISSION_DENIED,
            Error::ResolveAbility => RESOLVE_ABILITY_ERR,
            Error::ResolveApp => RESOLVE_APP_ERR,
            Error::CreateRecordFailed => CREATE_ABILITY_RECORD_FAILED,
            Error::ConnectionNotExist => CONNECTION_NOT_EXIST,
            Error::InvalidConnectionState => INVALID_CONNECTION_STATE,
            Error::LoadTimeout => LOAD_ABILITY_TIMEOUT,
            Error::ConnectionTimeout => CONNECTION_TIMEOUT,
            Error::TargetNotService => TARGET_ABILITY_NOT_SERVICE,
            Error::InnerError => INNER_ERR,
            Error::LimitReached => ERR_LIMIT_REACHED,
            Error::UnknownAbilityType => ERR_UNKNOWN_ABILITY_TYPE,
            Error::RestartNotAllowed => ERR_RESTART_NOT_ALLOWED,
            Error::Timeout => ERR_TIMED_OUT,
            Error::DeadObject => ERR_DEAD_OBJECT,
            Error::Cancelled => ERR_CANCELLED,
            Error::Other(code) => *code,
        }
    }

    pub fn from_code(code: i32) -> Self {
        match code {
            ERR_INVALID_STATE => Error::InvalidState,
            ERR_INVALID_VALUE => Error::InvalidValue,
            ERR_PERMISSION_DENIED => Error::PermissionDenied,
            RESOLVE_ABILITY_ERR => Error::ResolveAbility,
            RESOLVE_APP_ERR => Error::ResolveApp,
            CREATE_ABILITY_RECORD_FAILED => Error::CreateRecordFailed,
            CONNECTION_NOT_EXIST => Error::ConnectionNotExist,
            INVALID_CONNECTION_STATE => Error::InvalidConnectionState,
            LOAD_ABILITY_TIMEOUT => Error::LoadTimeout,
            CONNECTION_TIMEOUT => Error::ConnectionTimeout,
            TARGET_ABILITY_NOT_SERVICE => Error::TargetNotService,
            INNER_ERR => Error::InnerError,
            ERR_LIMIT_REACHED => Error::LimitReached,
            ERR_UNKNOWN_ABILITY_TYPE => Error::UnknownAbilityType,
            ERR_RESTART_NOT_ALLOWED => Error::RestartNotAllowed,
            ERR_TIMED_OUT => Error::Timeout,
            ERR_DEAD_OBJECT => Error::DeadObject,
            ERR_CANCELLED => Error::Cancelled,
            other => Error::Other(other),
        }
    }

    /// Converts a status read from a reply. `ERR_OK` is success.
    pub fn check(code: i32) -> Result<()> {
        if code == ERR_OK {
            return Ok(());
        }
        Err(Self::from_code(code))
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidState => write!(f, "invalid state"),
            Error::InvalidValue => write!(f, "invalid value"),
            Error::PermissionDenied => write!(f, "permission denied"),
            Error::ResolveAbility => write!(f, "no ability matches the request"),
            Error::ResolveApp => write!(f, "application cannot be resolved"),
            Error::CreateRecordFailed => write!(f, "failed to create ability record"),
            Error::ConnectionNotExist => write!(f, "connection does not exist"),
            Error::InvalidConnectionState => write!(f, "connection is not in a valid state"),
            Error::LoadTimeout => write!(f, "ability load timed out"),
            Error::ConnectionTimeout => write!(f, "connection timed out"),
            Error::TargetNotService => write!(f, "target ability is not a service"),
            Error::InnerError => write!(f, "internal error"),
            Error::LimitReached => write!(f, "task limit reached"),
            Error::UnknownAbilityType => write!(f, "unknown ability type"),
            Error::RestartNotAllowed => write!(f, "restart not allowed"),
            Error::Timeout => write!(f, "timed out"),
            Error::DeadObject => write!(f, "remote object is dead"),
            Error::Cancelled => write!(f, "cancelled"),
            Error::Other(code) => write!(f, "status {}", code),
        }
    }
}

impl std::error::Error for Error {}

impl From<ipc::Error> for Error {
    fn from(e: ipc::Error) -> Self {
        match e {
            ipc::Error::Status(code) => Error::from_code(code),
            ipc::Error::Timeout => Error::Timeout,
            ipc::Error::Parcel(_) | ipc::Error::ProtocolViolation(_) => Error::InnerError,
            ipc::Error::ObjectNotTransferable => Error::InvalidValue,
            ipc::Error::DeadObject | ipc::Error::ChannelClosed | ipc::Error::Transport(_) => Error::DeadObject,
        }
    }
}

impl From<ipc::parcel::Error> for Error {
    fn from(_: ipc::parcel::Error) -> Self {
        Error::InvalidValue
    }
}

pub type Result<T> = std::result::Result<T, Error>;
