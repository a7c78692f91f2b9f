//! Strongly-typed identifiers (avoid mixing strings/UUIDs arbitrarily).

use std::fmt;

use uuid::Uuid;

/// User (trainee, supervisor or admin account) identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub Uuid);

/// Evidence record identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EvidenceId(pub Uuid);

/// Magic link identifier (never the bearer token itself).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MagicLinkId(pub Uuid);

/// Edit request identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EditRequestId(pub Uuid);

macro_rules! display_uuid {
    ($($ty:ty),*) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }
        )*
    };
}

display_uuid!(UserId, EvidenceId, MagicLinkId, EditRequestId);
