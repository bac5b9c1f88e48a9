//! WebSocket close codes and what a client does about them

/// Gateway close codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CloseCode {
    UnknownError = 4000,
    UnknownOpcode = 4001,
    DecodeError = 4002,
    /// Sent a payload before identifying
    NotAuthenticated = 4003,
    /// The token is invalid
    AuthenticationFailed = 4004,
    AlreadyAuthenticated = 4005,
    /// Resume sent with an invalid sequence
    InvalidSequence = 4007,
    RateLimited = 4008,
    SessionTimedOut = 4009,
    InvalidShard = 4010,
    ShardingRequired = 4011,
    InvalidApiVersion = 4012,
    InvalidIntents = 4013,
    /// Privileged intents not enabled for this application
    DisallowedIntents = 4014,
}

/// How a session reacts to a closed connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
    /// Reconnect and resume with the stored session
    Resume,
    /// Reconnect and identify from scratch
    Reidentify,
    /// Stop; reconnecting cannot help
    Fatal(CloseCode),
}

impl CloseAction {
    /// Action for a raw close code
    ///
    /// Standard WebSocket codes, a missing code and unknown codes are treated
    /// as a dropped connection.
    pub fn from_raw(code: Option<u16>) -> Self {
        code.and_then(|code| CloseCode::try_from(code).ok())
            .map_or(Self::Resume, CloseCode::action)
    }
}

impl CloseCode {
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    pub const fn action(self) -> CloseAction {
        use CloseCode::{
            AlreadyAuthenticated, AuthenticationFailed, DecodeError, DisallowedIntents,
            InvalidApiVersion, InvalidIntents, InvalidSequence, InvalidShard, NotAuthenticated,
            RateLimited, SessionTimedOut, ShardingRequired, UnknownError, UnknownOpcode,
        };

        match self {
            UnknownError | UnknownOpcode | DecodeError | AlreadyAuthenticated | RateLimited => {
                CloseAction::Resume
            }
            NotAuthenticated | InvalidSequence | SessionTimedOut => CloseAction::Reidentify,
            AuthenticationFailed | InvalidShard | ShardingRequired | InvalidApiVersion
            | InvalidIntents | DisallowedIntents => CloseAction::Fatal(self),
        }
    }

    /// What went wrong, phrased for logs
    pub const fn description(self) -> &'static str {
        match self {
            Self::UnknownError => "gateway hit an unknown error",
            Self::UnknownOpcode => "client sent an unknown opcode",
            Self::DecodeError => "client sent an undecodable payload",
            Self::NotAuthenticated => "client sent a payload before identifying",
            Self::AuthenticationFailed => "token rejected",
            Self::AlreadyAuthenticated => "client identified twice",
            Self::InvalidSequence => "resume sequence rejected",
            Self::RateLimited => "client sent payloads too quickly",
            Self::SessionTimedOut => "session expired",
            Self::InvalidShard => "shard id or count rejected",
            Self::ShardingRequired => "too many guilds for a single shard",
            Self::InvalidApiVersion => "gateway version rejected",
            Self::InvalidIntents => "intents value rejected",
            Self::DisallowedIntents => "privileged intents not enabled for this application",
        }
    }
}

impl TryFrom<u16> for CloseCode {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Ok(match value {
            4000 => Self::UnknownError,
            4001 => Self::UnknownOpcode,
            4002 => Self::DecodeError,
            4003 => Self::NotAuthenticated,
            4004 => Self::AuthenticationFailed,
            4005 => Self::AlreadyAuthenticated,
            4007 => Self::InvalidSequence,
            4008 => Self::RateLimited,
            4009 => Self::SessionTimedOut,
            4010 => Self::InvalidShard,
            4011 => Self::ShardingRequired,
            4012 => Self::InvalidApiVersion,
            4013 => Self::InvalidIntents,
            4014 => Self::DisallowedIntents,
            other => return Err(other),
        })
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code.as_u16()
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {self:?}: {}", self.as_u16(), self.description())
    }
}
