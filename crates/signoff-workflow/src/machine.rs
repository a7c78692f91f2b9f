//! Sign-off state machine and field-locking predicate.
//!
//! Every write to an evidence record, in-app or through a magic link, is planned here:
//! [`plan`] resolves the legal transition, checks each patched field against
//! [`can_write_field`], and produces the compare-and-set [`EvidenceUpdate`] the store applies.
//!
//! | From      | Actor      | Action            | To        |
//! |-----------|------------|-------------------|-----------|
//! | Draft     | Owner      | Save              | Draft     |
//! | Draft     | Owner      | Submit            | Submitted |
//! | Submitted | Supervisor | Save              | Submitted |
//! | Submitted | Supervisor | SignOff           | SignedOff |
//! | Submitted | Supervisor | Decline           | Draft     |
//! | Submitted | Owner      | Withdraw          | Draft     |
//! | SignedOff | Supervisor | ApproveAmendment  | Draft     |

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use signoff_storage::{Evidence, EvidenceStatus, EvidenceUpdate, MagicLink, SupervisorIdentity, User};

use crate::validator::check_link;
use crate::WorkflowError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    /// Supervisor of record: matching credential, or a currently valid link for the record.
    Supervisor,
    Stranger,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Save,
    Submit,
    SignOff,
    Decline,
    /// Owner takes back a submission nobody can act on any more.
    Withdraw,
    ApproveAmendment,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::Save,
        Action::Submit,
        Action::SignOff,
        Action::Decline,
        Action::Withdraw,
        Action::ApproveAmendment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Save => "save",
            Action::Submit => "submit",
            Action::SignOff => "sign_off",
            Action::Decline => "decline",
            Action::Withdraw => "withdraw",
            Action::ApproveAmendment => "approve_amendment",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is asking.
#[derive(Clone, Copy, Debug)]
pub enum Actor<'a> {
    Account(&'a User),
    Link(&'a MagicLink),
}

/// Resolve the actor's role on `record` at `now`.
pub fn role_of(record: &Evidence, actor: Actor<'_>, now: DateTime<Utc>) -> Role {
    match actor {
        Actor::Account(user) if user.id == record.owner_id => Role::Owner,
        Actor::Account(user) => {
            let matches = match (&user.credential_id, &record.supervisor) {
                (Some(cred), Some(sup)) => sup.credential_id.as_deref() == Some(cred.as_str()),
                _ => false,
            };
            if matches {
                Role::Supervisor
            } else {
                Role::Stranger
            }
        }
        Actor::Link(link) => {
            if link.evidence_id == record.id && check_link(link, record, now).is_ok() {
                Role::Supervisor
            } else {
                Role::Stranger
            }
        }
    }
}

/// The transition table. Anything not listed is illegal.
pub fn transition(
    from: EvidenceStatus,
    role: Role,
    action: Action,
) -> Result<EvidenceStatus, WorkflowError> {
    use Action::*;
    use EvidenceStatus::*;

    if role == Role::Stranger {
        return Err(WorkflowError::Unauthorized);
    }

    match (from, role, action) {
        (Draft, Role::Owner, Save) => Ok(Draft),
        (Draft, Role::Owner, Submit) => Ok(Submitted),
        (Submitted, Role::Supervisor, Save) => Ok(Submitted),
        (Submitted, Role::Supervisor, SignOff) => Ok(SignedOff),
        (Submitted, Role::Supervisor, Decline) => Ok(Draft),
        (Submitted, Role::Owner, Withdraw) => Ok(Draft),
        (SignedOff, Role::Supervisor, ApproveAmendment) => Ok(Draft),
        _ => Err(WorkflowError::IllegalTransition { from, action }),
    }
}

/// Locking predicate: may `role` write top-level payload key `field` on `record` right now?
pub fn can_write_field(record: &Evidence, role: Role, field: &str) -> bool {
    match (record.status, role) {
        (EvidenceStatus::Draft, Role::Owner) => {
            !record.is_amending() || record.unlocked_fields.iter().any(|f| f == field)
        }
        (EvidenceStatus::Submitted, Role::Supervisor) => true,
        _ => false,
    }
}

/// JSON merge patch: objects merge recursively, `null` removes a key, anything else replaces.
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target) = target {
        for (key, value) in patch {
            if value.is_null() {
                target.remove(key);
            } else {
                merge_patch(target.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

/// Inputs a transition may carry besides the action itself.
#[derive(Clone, Debug, Default)]
pub struct Changes {
    /// Merge patch for the payload. Must be a JSON object.
    pub patch: Option<Value>,
    /// Pending supervisor, required by `Submit`.
    pub supervisor: Option<SupervisorIdentity>,
    /// Finalized supervisor name recorded at `SignOff`.
    pub supervisor_name: Option<String>,
    /// Fields reopened by `ApproveAmendment`.
    pub unlocked_fields: Vec<String>,
}

impl Changes {
    pub fn patch(patch: Value) -> Self {
        Self {
            patch: Some(patch),
            ..Self::default()
        }
    }
}

/// Plan a write: check role, transition and field locks, then build the CAS update.
///
/// Nothing is written here; a refusal leaves the caller with nothing to apply.
pub fn plan(
    record: &Evidence,
    role: Role,
    action: Action,
    changes: &Changes,
    now: DateTime<Utc>,
) -> Result<EvidenceUpdate, WorkflowError> {
    let to = transition(record.status, role, action)?;

    let mut payload = record.payload.clone();
    if let Some(patch) = &changes.patch {
        let Value::Object(fields) = patch else {
            return Err(WorkflowError::InvalidRequest(
                "updates must be a JSON object".into(),
            ));
        };
        if !fields.is_empty() && matches!(
            action,
            Action::Decline | Action::Withdraw | Action::ApproveAmendment
        ) {
            return Err(WorkflowError::InvalidRequest(format!(
                "{} does not accept form updates",
                action
            )));
        }
        if let Some(locked) = fields.keys().find(|k| !can_write_field(record, role, k)) {
            return Err(WorkflowError::InvalidRequest(format!(
                "field '{}' is locked",
                locked
            )));
        }
        merge_patch(&mut payload, patch);
    }

    let mut update = EvidenceUpdate {
        id: record.id,
        expected_version: record.version,
        expected_status: record.status,
        status: to,
        payload,
        supervisor: record.supervisor.clone(),
        signed_off_at: record.signed_off_at,
        unlocked_fields: record.unlocked_fields.clone(),
        updated_at: now,
    };

    match action {
        Action::Save | Action::Decline => {}
        Action::Withdraw => update.supervisor = None,
        Action::Submit => {
            let Some(supervisor) = changes.supervisor.clone() else {
                return Err(WorkflowError::InvalidRequest(
                    "a supervisor is required to submit".into(),
                ));
            };
            update.supervisor = Some(supervisor);
        }
        Action::SignOff => {
            if update.signed_off_at.is_none() {
                update.signed_off_at = Some(now);
            }
            if let (Some(sup), Some(name)) = (update.supervisor.as_mut(), &changes.supervisor_name)
            {
                sup.name = Some(name.clone());
            }
            update.unlocked_fields.clear();
        }
        Action::ApproveAmendment => {
            if changes.unlocked_fields.is_empty() {
                return Err(WorkflowError::InvalidRequest(
                    "an amendment must name at least one field".into(),
                ));
            }
            update.unlocked_fields = changes.unlocked_fields.clone();
        }
    }

    Ok(update)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;
    use signoff_storage::{EvidenceId, EvidenceKind, MagicLinkId, UserId};

    fn uid(n: u128) -> UserId {
        UserId(uuid_from(n))
    }

    fn uuid_from(n: u128) -> uuid::Uuid {
        uuid::Uuid::from_u128(n)
    }

    fn record(status: EvidenceStatus) -> Evidence {
        let now = Utc::now();
        Evidence {
            id: EvidenceId(uuid_from(10)),
            owner_id: uid(1),
            kind: EvidenceKind::Dops,
            status,
            payload: json!({ "a": 1, "nested": { "x": 1, "y": 2 } }),
            supervisor: Some(SupervisorIdentity {
                name: None,
                email: "sup@example.org".into(),
                credential_id: Some("7654321".into()),
            }),
            signed_off_at: None,
            unlocked_fields: vec![],
            version: 4,
            created_at: now,
            updated_at: now,
        }
    }

    fn user(id: u128, credential: Option<&str>) -> User {
        User {
            id: uid(id),
            email: format!("u{}@example.org", id),
            name: format!("User {}", id),
            credential_id: credential.map(str::to_string),
            created_at: Utc::now(),
        }
    }

    fn link(record: &Evidence, expires_in: Duration) -> MagicLink {
        let now = Utc::now();
        MagicLink {
            id: MagicLinkId(uuid_from(99)),
            token_hash: "h".into(),
            evidence_id: record.id,
            recipient_email: "sup@example.org".into(),
            recipient_credential_id: None,
            kind: record.kind,
            created_by: record.owner_id,
            created_at: now,
            expires_at: now + expires_in,
            used_at: None,
        }
    }

    #[test]
    fn roles_resolve_from_ownership_credentials_and_links() {
        let now = Utc::now();
        let r = record(EvidenceStatus::Submitted);

        assert_eq!(role_of(&r, Actor::Account(&user(1, None)), now), Role::Owner);
        assert_eq!(
            role_of(&r, Actor::Account(&user(2, Some("7654321"))), now),
            Role::Supervisor
        );
        assert_eq!(
            role_of(&r, Actor::Account(&user(3, Some("1111111"))), now),
            Role::Stranger
        );

        let valid = link(&r, Duration::hours(1));
        assert_eq!(role_of(&r, Actor::Link(&valid), now), Role::Supervisor);

        let expired = link(&r, Duration::hours(-1));
        assert_eq!(role_of(&r, Actor::Link(&expired), now), Role::Stranger);

        let mut other = record(EvidenceStatus::Submitted);
        other.id = EvidenceId(uuid_from(11));
        assert_eq!(role_of(&other, Actor::Link(&valid), now), Role::Stranger);
    }

    #[test]
    fn transition_table_is_closed() {
        use EvidenceStatus::*;
        let legal = [
            (Draft, Role::Owner, Action::Save, Draft),
            (Draft, Role::Owner, Action::Submit, Submitted),
            (Submitted, Role::Supervisor, Action::Save, Submitted),
            (Submitted, Role::Supervisor, Action::SignOff, SignedOff),
            (Submitted, Role::Supervisor, Action::Decline, Draft),
            (Submitted, Role::Owner, Action::Withdraw, Draft),
            (SignedOff, Role::Supervisor, Action::ApproveAmendment, Draft),
        ];

        for from in [Draft, Submitted, SignedOff] {
            for role in [Role::Owner, Role::Supervisor] {
                for action in Action::ALL {
                    let expected = legal
                        .iter()
                        .find(|(f, r, a, _)| *f == from && *r == role && *a == action)
                        .map(|(_, _, _, to)| *to);
                    match (transition(from, role, action), expected) {
                        (Ok(to), Some(want)) => assert_eq!(to, want),
                        (Err(WorkflowError::IllegalTransition { from: f, action: a }), None) => {
                            assert_eq!((f, a), (from, action));
                        }
                        (got, want) => {
                            panic!("{:?}/{:?}/{:?}: got {:?}, want {:?}", from, role, action, got, want)
                        }
                    }
                }
                assert!(matches!(
                    transition(from, Role::Stranger, Action::Save),
                    Err(WorkflowError::Unauthorized)
                ));
            }
        }
    }

    #[test]
    fn locking_predicate_follows_status_and_role() {
        let draft = record(EvidenceStatus::Draft);
        assert!(can_write_field(&draft, Role::Owner, "a"));
        assert!(!can_write_field(&draft, Role::Supervisor, "a"));

        let submitted = record(EvidenceStatus::Submitted);
        assert!(!can_write_field(&submitted, Role::Owner, "a"));
        assert!(can_write_field(&submitted, Role::Supervisor, "a"));

        let signed = record(EvidenceStatus::SignedOff);
        for role in [Role::Owner, Role::Supervisor, Role::Stranger] {
            assert!(!can_write_field(&signed, role, "a"));
        }

        let mut amending = record(EvidenceStatus::Draft);
        amending.signed_off_at = Some(Utc::now());
        amending.unlocked_fields = vec!["a".into()];
        assert!(can_write_field(&amending, Role::Owner, "a"));
        assert!(!can_write_field(&amending, Role::Owner, "nested"));
    }

    #[test]
    fn merge_patch_merges_nested_and_removes_nulls() {
        let mut doc = json!({ "a": 1, "nested": { "x": 1, "y": 2 }, "gone": true });
        merge_patch(
            &mut doc,
            &json!({ "b": 2, "nested": { "y": 3, "z": 4 }, "gone": null }),
        );
        assert_eq!(
            doc,
            json!({ "a": 1, "b": 2, "nested": { "x": 1, "y": 3, "z": 4 } })
        );
    }

    #[test]
    fn plan_sign_off_sets_timestamp_once_and_finalizes_supervisor() {
        let now = Utc::now();
        let r = record(EvidenceStatus::Submitted);
        let changes = Changes {
            patch: Some(json!({ "rating": 4 })),
            supervisor_name: Some("Dr Sup".into()),
            ..Changes::default()
        };

        let update = plan(&r, Role::Supervisor, Action::SignOff, &changes, now).unwrap();
        assert_eq!(update.status, EvidenceStatus::SignedOff);
        assert_eq!(update.signed_off_at, Some(now));
        assert_eq!(update.expected_version, 4);
        assert_eq!(update.expected_status, EvidenceStatus::Submitted);
        assert_eq!(update.payload["rating"], 4);
        assert_eq!(update.payload["a"], 1);
        assert_eq!(
            update.supervisor.unwrap().name.as_deref(),
            Some("Dr Sup")
        );

        let mut again = record(EvidenceStatus::Submitted);
        let first = now - Duration::days(30);
        again.signed_off_at = Some(first);
        let update = plan(&again, Role::Supervisor, Action::SignOff, &Changes::default(), now)
            .unwrap();
        assert_eq!(update.signed_off_at, Some(first));
    }

    #[test]
    fn plan_rejects_locked_fields_and_non_objects() {
        let now = Utc::now();
        let mut amending = record(EvidenceStatus::Draft);
        amending.signed_off_at = Some(now);
        amending.unlocked_fields = vec!["a".into()];

        let err = plan(
            &amending,
            Role::Owner,
            Action::Save,
            &Changes::patch(json!({ "nested": {} })),
            now,
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidRequest(_)));

        let ok = plan(
            &amending,
            Role::Owner,
            Action::Save,
            &Changes::patch(json!({ "a": 2 })),
            now,
        )
        .unwrap();
        assert_eq!(ok.payload["a"], 2);

        let err = plan(
            &record(EvidenceStatus::Draft),
            Role::Owner,
            Action::Save,
            &Changes::patch(json!([1, 2])),
            now,
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidRequest(_)));
    }

    #[test]
    fn plan_submit_requires_supervisor_and_approval_requires_fields() {
        let now = Utc::now();
        let err = plan(
            &record(EvidenceStatus::Draft),
            Role::Owner,
            Action::Submit,
            &Changes::default(),
            now,
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidRequest(_)));

        let err = plan(
            &record(EvidenceStatus::SignedOff),
            Role::Supervisor,
            Action::ApproveAmendment,
            &Changes::default(),
            now,
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidRequest(_)));

        let update = plan(
            &record(EvidenceStatus::SignedOff),
            Role::Supervisor,
            Action::ApproveAmendment,
            &Changes {
                unlocked_fields: vec!["a".into()],
                ..Changes::default()
            },
            now,
        )
        .unwrap();
        assert_eq!(update.status, EvidenceStatus::Draft);
        assert_eq!(update.unlocked_fields, vec!["a".to_string()]);
    }

    #[test]
    fn plan_withdraw_clears_pending_supervisor() {
        let now = Utc::now();
        let update = plan(
            &record(EvidenceStatus::Submitted),
            Role::Owner,
            Action::Withdraw,
            &Changes::default(),
            now,
        )
        .unwrap();
        assert_eq!(update.status, EvidenceStatus::Draft);
        assert!(update.supervisor.is_none());
        assert_eq!(update.payload, record(EvidenceStatus::Submitted).payload);

        let err = plan(
            &record(EvidenceStatus::Submitted),
            Role::Owner,
            Action::Withdraw,
            &Changes::patch(json!({ "a": 2 })),
            now,
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidRequest(_)));
    }
}
