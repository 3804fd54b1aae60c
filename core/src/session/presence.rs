/// Presence & typing tracker for the partner of the active conversation
use crate::types::{User, UserStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the partner is doing, as far as we know
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PresenceState {
    #[default]
    Unknown,
    Offline { last_seen: Option<DateTime<Utc>> },
    Online,
    Typing,
}

#[derive(Debug, Clone, Default)]
pub struct PresenceTracker {
    partner: Option<User>,
    room: Option<String>,
    /// Availability underneath a typing indicator
    base: Availability,
    typing: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Availability {
    #[default]
    Unknown,
    Offline(Option<DateTime<Utc>>),
    Online,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start over for a newly activated room
    pub fn reset(&mut self, room: &str) {
        *self = Self {
            room: Some(room.to_string()),
            ..Self::default()
        };
    }

    pub fn partner(&self) -> Option<&User> {
        self.partner.as_ref()
    }

    /// Seed partner metadata from the conversation fetch
    pub fn set_partner(&mut self, partner: User) {
        self.base = if partner.is_online {
            Availability::Online
        } else {
            Availability::Offline(partner.last_seen)
        };
        self.partner = Some(partner);
    }

    /// `user status` event; ignored unless it concerns the partner
    pub fn on_status(&mut self, status: &UserStatus) -> bool {
        let Some(partner) = self.partner.as_mut() else {
            return false;
        };
        if partner.id != status.user_id {
            return false;
        }

        partner.is_online = status.is_online;
        partner.last_seen = status.last_seen.or(partner.last_seen);
        self.base = if status.is_online {
            Availability::Online
        } else {
            Availability::Offline(partner.last_seen)
        };
        true
    }

    /// `typing` event; ignored for rooms other than the active one
    pub fn on_typing(&mut self, room: &str) -> bool {
        if self.room.as_deref() != Some(room) {
            return false;
        }
        self.typing = true;
        true
    }

    /// `stop typing` event; reverts to the underlying availability
    pub fn on_stop_typing(&mut self, room: &str) -> bool {
        if self.room.as_deref() != Some(room) {
            return false;
        }
        self.typing = false;
        true
    }

    pub fn state(&self) -> PresenceState {
        if self.typing {
            return PresenceState::Typing;
        }
        match self.base {
            Availability::Unknown => PresenceState::Unknown,
            Availability::Offline(last_seen) => PresenceState::Offline { last_seen },
            Availability::Online => PresenceState::Online,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partner(online: bool) -> User {
        let mut user = User::new("u2", "bo");
        user.is_online = online;
        user
    }

    fn status(user_id: &str, online: bool) -> UserStatus {
        UserStatus {
            user_id: user_id.to_string(),
            is_online: online,
            last_seen: None,
        }
    }

    #[test]
    fn test_unknown_until_partner_known() {
        let mut tracker = PresenceTracker::new();
        tracker.reset("c1");
        assert_eq!(tracker.state(), PresenceState::Unknown);

        // No partner yet, status is dropped
        assert!(!tracker.on_status(&status("u2", true)));
        assert_eq!(tracker.state(), PresenceState::Unknown);
    }

    #[test]
    fn test_typing_reverts_to_online_not_offline() {
        let mut tracker = PresenceTracker::new();
        tracker.reset("c1");
        tracker.set_partner(partner(false));
        assert!(matches!(tracker.state(), PresenceState::Offline { .. }));

        assert!(tracker.on_status(&status("u2", true)));
        assert_eq!(tracker.state(), PresenceState::Online);

        assert!(tracker.on_typing("c1"));
        assert_eq!(tracker.state(), PresenceState::Typing);

        assert!(tracker.on_stop_typing("c1"));
        assert_eq!(tracker.state(), PresenceState::Online);
    }

    #[test]
    fn test_other_room_and_user_ignored() {
        let mut tracker = PresenceTracker::new();
        tracker.reset("c1");
        tracker.set_partner(partner(true));

        assert!(!tracker.on_typing("c2"));
        assert!(!tracker.on_status(&status("someone-else", false)));
        assert_eq!(tracker.state(), PresenceState::Online);
    }

    #[test]
    fn test_offline_keeps_last_seen() {
        let mut tracker = PresenceTracker::new();
        tracker.reset("c1");
        tracker.set_partner(partner(true));

        let seen = "2024-05-01T10:00:00Z".parse::<DateTime<Utc>>().unwrap();
        tracker.on_status(&UserStatus {
            user_id: "u2".to_string(),
            is_online: false,
            last_seen: Some(seen),
        });
        assert_eq!(tracker.state(), PresenceState::Offline { last_seen: Some(seen) });
        assert_eq!(tracker.partner().and_then(|p| p.last_seen), Some(seen));
    }

    #[test]
    fn test_reset_drops_partner() {
        let mut tracker = PresenceTracker::new();
        tracker.reset("c1");
        tracker.set_partner(partner(true));
        tracker.on_typing("c1");

        tracker.reset("c2");
        assert!(tracker.partner().is_none());
        assert_eq!(tracker.state(), PresenceState::Unknown);
    }
}
