//! Read-only user/team directory contract.
//!
//! User and team records are owned by the external identity service; the
//! gateway only reads them, to render display names into notification text.
//! [`InMemoryDirectory`] is the in-process implementation used by the demo
//! deployment and by tests.

use std::collections::HashMap;

use parking_lot::RwLock;

/// A user record as exposed by the external user/team store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    /// Opaque user id.
    pub id: String,
    /// Email address.
    pub email: String,
    /// Display name.
    pub name: String,
    /// Role, e.g. `"member"` or `"admin"`.
    pub role: String,
    /// Team the user belongs to.
    pub team_id: String,
}

/// A team record as exposed by the external user/team store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamRecord {
    /// Opaque team id.
    pub id: String,
    /// Team display name.
    pub name: String,
    /// Member user ids.
    pub member_ids: Vec<String>,
}

/// Read access to user and team records.
pub trait UserDirectory: Send + Sync {
    /// Looks up a user by id.
    fn find_user(&self, id: &str) -> Option<UserRecord>;
    /// Returns all known users.
    fn list_users(&self) -> Vec<UserRecord>;
    /// Looks up a team by id.
    fn find_team(&self, id: &str) -> Option<TeamRecord>;
}

/// In-memory directory, populated by the embedder.
#[derive(Default)]
pub struct InMemoryDirectory {
    users: RwLock<HashMap<String, UserRecord>>,
    teams: RwLock<HashMap<String, TeamRecord>>,
}

impl InMemoryDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a user record.
    pub fn upsert_user(&self, user: UserRecord) {
        self.users.write().insert(user.id.clone(), user);
    }

    /// Inserts or replaces a team record.
    pub fn upsert_team(&self, team: TeamRecord) {
        self.teams.write().insert(team.id.clone(), team);
    }

    /// Adds a user to a team's member list.
    ///
    /// Returns `false` if the team is unknown or the user is already a member.
    pub fn add_member(&self, team_id: &str, user_id: &str) -> bool {
        let mut teams = self.teams.write();
        let Some(team) = teams.get_mut(team_id) else {
            return false;
        };
        if team.member_ids.iter().any(|m| m == user_id) {
            return false;
        }
        team.member_ids.push(user_id.to_string());
        true
    }

    /// Removes a user from a team's member list.
    ///
    /// Returns `false` if the team is unknown or the user was not a member.
    pub fn remove_member(&self, team_id: &str, user_id: &str) -> bool {
        let mut teams = self.teams.write();
        let Some(team) = teams.get_mut(team_id) else {
            return false;
        };
        let before = team.member_ids.len();
        team.member_ids.retain(|m| m != user_id);
        team.member_ids.len() < before
    }
}

impl UserDirectory for InMemoryDirectory {
    fn find_user(&self, id: &str) -> Option<UserRecord> {
        self.users.read().get(id).cloned()
    }

    fn list_users(&self) -> Vec<UserRecord> {
        self.users.read().values().cloned().collect()
    }

    fn find_team(&self, id: &str) -> Option<TeamRecord> {
        self.teams.read().get(id).cloned()
    }
}
