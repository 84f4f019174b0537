//! Topic addressing for the event streams.
//!
//! A topic is the string key a subscriber names when registering interest,
//! and the key the engine publishes under. Four families exist: three
//! team-scoped task lifecycle streams and one user-scoped notification
//! stream. Topics carry no stored state.

use std::str::FromStr;

/// Errors that can occur when parsing a topic string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopicParseError {
    /// The string has no `:` separator between prefix and scope.
    #[error("topic missing ':' separator: {0}")]
    MissingSeparator(String),
    /// The prefix is not one of the known topic families.
    #[error("unknown topic prefix: {0}")]
    UnknownPrefix(String),
    /// The scope (team or user id) after the separator is empty.
    #[error("topic has empty scope: {0}")]
    EmptyScope(String),
}

/// A parsed event stream address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Tasks created under a team, rendered as `task-created:<teamId>`.
    TaskCreated(String),
    /// Tasks updated under a team, rendered as `task-updated:<teamId>`.
    TaskUpdated(String),
    /// Tasks deleted under a team, rendered as `task-deleted:<teamId>`.
    TaskDeleted(String),
    /// Notifications for a user, rendered as `notification:<userId>`.
    Notification(String),
}

impl Topic {
    /// Returns the team id for team-scoped topics, `None` for user-scoped.
    #[must_use]
    pub fn team(&self) -> Option<&str> {
        match self {
            Self::TaskCreated(team) | Self::TaskUpdated(team) | Self::TaskDeleted(team) => {
                Some(team)
            }
            Self::Notification(_) => None,
        }
    }

    /// Returns the user id for `notification:` topics, `None` otherwise.
    #[must_use]
    pub fn user(&self) -> Option<&str> {
        match self {
            Self::Notification(user) => Some(user),
            _ => None,
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TaskCreated(team) => write!(f, "task-created:{team}"),
            Self::TaskUpdated(team) => write!(f, "task-updated:{team}"),
            Self::TaskDeleted(team) => write!(f, "task-deleted:{team}"),
            Self::Notification(user) => write!(f, "notification:{user}"),
        }
    }
}

impl FromStr for Topic {
    type Err = TopicParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, scope) = s
            .split_once(':')
            .ok_or_else(|| TopicParseError::MissingSeparator(s.to_string()))?;
        if scope.is_empty() {
            return Err(TopicParseError::EmptyScope(s.to_string()));
        }
        match prefix {
            "task-created" => Ok(Self::TaskCreated(scope.to_string())),
            "task-updated" => Ok(Self::TaskUpdated(scope.to_string())),
            "task-deleted" => Ok(Self::TaskDeleted(scope.to_string())),
            "notification" => Ok(Self::Notification(scope.to_string())),
            other => Err(TopicParseError::UnknownPrefix(other.to_string())),
        }
    }
}
