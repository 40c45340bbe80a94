use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status derived from a lobby's schedule and occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LobbyStatus {
    Closed,
    Ended,
    Full,
    Open,
    Live,
}

impl LobbyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Ended => "ended",
            Self::Full => "full",
            Self::Open => "open",
            Self::Live => "live",
        }
    }
}

impl fmt::Display for LobbyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status as it is stored in the `lobbies.status` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoredStatus {
    #[default]
    Open,
    Full,
    Closed,
    Active,
    Ended,
}

impl StoredStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Full => "full",
            Self::Closed => "closed",
            Self::Active => "active",
            Self::Ended => "ended",
        }
    }

    /// Stored statuses the sync job no longer needs to look at.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Ended)
    }
}

impl fmt::Display for StoredStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoredStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "full" => Ok(Self::Full),
            "closed" => Ok(Self::Closed),
            "active" => Ok(Self::Active),
            "ended" => Ok(Self::Ended),
            other => Err(format!("unknown lobby status '{}'", other)),
        }
    }
}

impl From<LobbyStatus> for StoredStatus {
    fn from(status: LobbyStatus) -> Self {
        match status {
            LobbyStatus::Closed => Self::Closed,
            LobbyStatus::Ended => Self::Ended,
            LobbyStatus::Full => Self::Full,
            LobbyStatus::Open => Self::Open,
            LobbyStatus::Live => Self::Active,
        }
    }
}

/// Resolve a lobby's status at `now`.
///
/// A persisted `closed` always wins. Otherwise capacity is checked before
/// the schedule, so a full lobby that has not started yet reports `full`.
pub fn resolve_status(
    start_time: DateTime<Utc>,
    interval_seconds: u64,
    current_participants: u32,
    max_participants: u32,
    persisted: StoredStatus,
    now: DateTime<Utc>,
) -> LobbyStatus {
    if persisted == StoredStatus::Closed {
        return LobbyStatus::Closed;
    }

    let end_time = i64::try_from(interval_seconds)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|interval| start_time.checked_add_signed(interval))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);

    if current_participants >= max_participants {
        if now >= end_time {
            return LobbyStatus::Ended;
        }
        return LobbyStatus::Full;
    }

    if now < start_time {
        LobbyStatus::Open
    } else if now < end_time {
        LobbyStatus::Live
    } else {
        LobbyStatus::Ended
    }
}

pub fn can_create_team(status: LobbyStatus) -> bool {
    status == LobbyStatus::Open
}

pub fn is_lobby_active(status: LobbyStatus) -> bool {
    matches!(status, LobbyStatus::Live | LobbyStatus::Ended)
}
