//! Access control policy.
//!
//! Pure predicates over an acting identity, a record and an operation. The
//! record store filters every collection through [`visibility_for`] and
//! [`can_view_record`], and every mutation command checks
//! [`can_mutate_record`] or [`can_perform`] before it reaches the remote
//! store. Role and status are always read from the actor passed in, so a
//! role change takes effect on the next check.

use crate::roles::{ApprovalStatus, Role};
use crate::types::EntityId;

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

/// The subset of an identity the policy needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: EntityId,
    pub role: Role,
    pub status: ApprovalStatus,
}

impl Actor {
    pub fn new(id: EntityId, role: Role, status: ApprovalStatus) -> Self {
        Self { id, role, status }
    }

    pub fn is_manager(&self) -> bool {
        self.role.is_manager()
    }

    pub fn is_approved(&self) -> bool {
        self.status.is_approved()
    }
}

/// Records that can be assigned to, attended by, or owned by an identity.
pub trait Assignable {
    /// `true` if `user_id` is the assignee, an attendee, or the recipient.
    fn is_assigned_to(&self, user_id: EntityId) -> bool;

    /// `true` only for the profile row of `user_id` itself.
    fn is_profile_of(&self, _user_id: EntityId) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Who may issue an update to a given field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldScope {
    /// Editable by the record's assignee as well as managers.
    Shared,
    /// Editable by managers only.
    ManagerOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateTable,
    DeleteTable,
    AddRecord,
    DeleteRecord,
    Update(FieldScope),
}

impl Operation {
    /// An update touching several fields is as restricted as its most
    /// restricted field.
    pub fn update_of(scopes: impl IntoIterator<Item = FieldScope>) -> Self {
        let manager_only = scopes
            .into_iter()
            .any(|scope| scope == FieldScope::ManagerOnly);
        if manager_only {
            Operation::Update(FieldScope::ManagerOnly)
        } else {
            Operation::Update(FieldScope::Shared)
        }
    }
}

// ---------------------------------------------------------------------------
// Visibility
// ---------------------------------------------------------------------------

/// Row scope applied to every collection fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Approved managers see every row.
    Everything,
    /// Approved editors see rows assigned to them.
    Assigned(EntityId),
    /// Pending and rejected identities see their own profile only.
    ProfileOnly(EntityId),
    /// Anonymous sessions see nothing.
    Nothing,
}

pub fn visibility_for(actor: Option<&Actor>) -> Visibility {
    match actor {
        None => Visibility::Nothing,
        Some(actor) if !actor.is_approved() => Visibility::ProfileOnly(actor.id),
        Some(actor) if actor.is_manager() => Visibility::Everything,
        Some(actor) => Visibility::Assigned(actor.id),
    }
}

// ---------------------------------------------------------------------------
// Predicates
// ---------------------------------------------------------------------------

pub fn can_view_record<R: Assignable + ?Sized>(actor: &Actor, record: &R) -> bool {
    match visibility_for(Some(actor)) {
        Visibility::Everything => true,
        Visibility::Assigned(id) => record.is_assigned_to(id),
        Visibility::ProfileOnly(id) => record.is_profile_of(id),
        Visibility::Nothing => false,
    }
}

/// Structural operations that do not depend on an existing record.
pub fn can_perform(actor: &Actor, op: Operation) -> bool {
    if !actor.is_approved() {
        return false;
    }
    match op {
        Operation::CreateTable
        | Operation::DeleteTable
        | Operation::AddRecord
        | Operation::DeleteRecord
        | Operation::Update(FieldScope::ManagerOnly) => actor.is_manager(),
        Operation::Update(FieldScope::Shared) => true,
    }
}

pub fn can_mutate_record<R: Assignable + ?Sized>(actor: &Actor, record: &R, op: Operation) -> bool {
    // Own preferences stay editable while an account awaits approval.
    if op == Operation::Update(FieldScope::Shared) && record.is_profile_of(actor.id) {
        return true;
    }
    if !can_perform(actor, op) {
        return false;
    }
    match op {
        Operation::Update(FieldScope::Shared) => {
            actor.is_manager() || record.is_assigned_to(actor.id)
        }
        _ => true,
    }
}
