//! Subscription domain entity and lifecycle state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::ledger::OwnerType;
use crate::domain::{DomainError, DomainResult};

/// Subscription lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SubscriptionStatus {
    Active,
    Inactive,
    Expired,
    Suspended,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
            Self::Expired => "EXPIRED",
            Self::Suspended => "SUSPENDED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(Self::Active),
            "INACTIVE" => Some(Self::Inactive),
            "EXPIRED" => Some(Self::Expired),
            "SUSPENDED" => Some(Self::Suspended),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Who drove a lifecycle transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangedBy {
    /// Scheduler or other autonomous process
    System,
    User(String),
    Admin(String),
}

impl ChangedBy {
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin(_))
    }
}

impl std::fmt::Display for ChangedBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User(id) => write!(f, "user:{}", id),
            Self::Admin(id) => write!(f, "admin:{}", id),
        }
    }
}

/// Tier subscription for an owner.
///
/// At most one subscription per owner is `Active` at any instant; the
/// subscription service enforces this on activation. Records are never
/// deleted. `Cancelled` is terminal; reactivation requires a new record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub owner_id: String,
    pub owner_type: OwnerType,
    pub tier_id: String,
    pub status: SubscriptionStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn new(
        owner_id: impl Into<String>,
        owner_type: OwnerType,
        tier_id: impl Into<String>,
        end_date: Option<DateTime<Utc>>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            owner_type,
            tier_id: tier_id.into(),
            status: SubscriptionStatus::Active,
            start_date: now,
            end_date,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the transition is allowed for the given actor.
    ///
    /// Time-based expiry is reserved to the system actor; suspension,
    /// cancellation and reinstatement are administrative. `Cancelled`
    /// accepts nothing, and `Expired` can never return to `Active`.
    pub fn can_transition(
        from: SubscriptionStatus,
        to: SubscriptionStatus,
        changed_by: &ChangedBy,
    ) -> bool {
        use SubscriptionStatus::*;
        match (from, to) {
            (Active, Inactive) => true,
            (Active, Expired) => *changed_by == ChangedBy::System,
            (Active, Suspended) | (Active, Cancelled) => changed_by.is_admin(),
            (Inactive, Suspended) | (Inactive, Cancelled) => changed_by.is_admin(),
            (Expired, Suspended) | (Expired, Cancelled) => changed_by.is_admin(),
            (Suspended, Active) | (Suspended, Cancelled) => changed_by.is_admin(),
            _ => false,
        }
    }

    /// Apply a validated transition, returning the previous status.
    pub fn transition(
        &mut self,
        to: SubscriptionStatus,
        changed_by: &ChangedBy,
    ) -> DomainResult<SubscriptionStatus> {
        if !Self::can_transition(self.status, to, changed_by) {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        let previous = self.status;
        self.status = to;
        self.updated_at = Utc::now();
        Ok(previous)
    }

    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }

    /// Whether this record is due for time-based expiry.
    pub fn is_due_for_expiry(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active
            && self.end_date.map(|end| end <= now).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sub() -> Subscription {
        Subscription::new("O1", OwnerType::Business, "tier-pro", None)
    }

    fn admin() -> ChangedBy {
        ChangedBy::Admin("A1".into())
    }

    #[test]
    fn new_subscription_is_active() {
        let s = sub();
        assert!(s.is_active());
        assert!(s.end_date.is_none());
    }

    #[test]
    fn active_to_inactive_allowed_for_user() {
        let mut s = sub();
        let prev = s
            .transition(SubscriptionStatus::Inactive, &ChangedBy::User("U1".into()))
            .unwrap();
        assert_eq!(prev, SubscriptionStatus::Active);
        assert_eq!(s.status, SubscriptionStatus::Inactive);
    }

    #[test]
    fn only_system_may_expire() {
        let mut s = sub();
        let err = s
            .transition(SubscriptionStatus::Expired, &ChangedBy::User("U1".into()))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));

        s.transition(SubscriptionStatus::Expired, &ChangedBy::System)
            .unwrap();
        assert_eq!(s.status, SubscriptionStatus::Expired);
    }

    #[test]
    fn expired_cannot_reactivate() {
        let mut s = sub();
        s.transition(SubscriptionStatus::Expired, &ChangedBy::System)
            .unwrap();
        assert!(s
            .transition(SubscriptionStatus::Active, &admin())
            .is_err());
    }

    #[test]
    fn cancelled_is_terminal() {
        let mut s = sub();
        s.transition(SubscriptionStatus::Cancelled, &admin()).unwrap();
        for to in [
            SubscriptionStatus::Active,
            SubscriptionStatus::Inactive,
            SubscriptionStatus::Expired,
            SubscriptionStatus::Suspended,
        ] {
            assert!(s.transition(to, &admin()).is_err());
        }
    }

    #[test]
    fn suspend_requires_admin() {
        let mut s = sub();
        assert!(s
            .transition(SubscriptionStatus::Suspended, &ChangedBy::User("U1".into()))
            .is_err());
        s.transition(SubscriptionStatus::Suspended, &admin()).unwrap();
        // Admin may reinstate a suspended subscription
        s.transition(SubscriptionStatus::Active, &admin()).unwrap();
        assert!(s.is_active());
    }

    #[test]
    fn due_for_expiry_only_when_active_and_past_end() {
        let now = Utc::now();
        let mut s = sub();
        assert!(!s.is_due_for_expiry(now)); // no end_date

        s.end_date = Some(now - Duration::hours(1));
        assert!(s.is_due_for_expiry(now));

        s.transition(SubscriptionStatus::Expired, &ChangedBy::System)
            .unwrap();
        assert!(!s.is_due_for_expiry(now)); // no longer active
    }

    #[test]
    fn status_roundtrip() {
        for status in [
            SubscriptionStatus::Active,
            SubscriptionStatus::Inactive,
            SubscriptionStatus::Expired,
            SubscriptionStatus::Suspended,
            SubscriptionStatus::Cancelled,
        ] {
            assert_eq!(SubscriptionStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(SubscriptionStatus::from_str("BOGUS"), None);
    }

    #[test]
    fn changed_by_display() {
        assert_eq!(ChangedBy::System.to_string(), "system");
        assert_eq!(ChangedBy::User("U1".into()).to_string(), "user:U1");
        assert_eq!(ChangedBy::Admin("A1".into()).to_string(), "admin:A1");
    }
}
