//! Single decision point for every authorization question in the system.
//!
//! Handlers and services never compare roles or owner ids themselves. They
//! describe the caller, the action and the target record, and ask `decide`.

use uuid::Uuid;
use vpsboard_common::{Error, Result, Role};

/// Authenticated caller identity threaded through every domain operation.
#[derive(Debug, Clone, Copy)]
pub struct Identity {
    pub principal_id: Uuid,
    pub role: Role,
}

impl Identity {
    pub fn new(principal_id: Uuid, role: Role) -> Self {
        Identity { principal_id, role }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyAction {
    View,
    Mutate,
    Delete,
    ChangeRole,
}

/// Target of an authorization check, reduced to the ownership facts
/// the decision needs.
#[derive(Debug, Clone, Copy)]
pub enum PolicyTarget {
    Instance { owner_id: Uuid },
    Snapshot { instance_owner_id: Uuid },
    AuditRecord { instance_owner_id: Option<Uuid>, author_id: Uuid },
    Principal { id: Uuid },
    /// Fleet-wide state: the capacity ledger and cross-tenant listings.
    Fleet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Row visibility for list endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Unrestricted,
    Owned(Uuid),
}

fn allow_if(condition: bool) -> Decision {
    if condition {
        Decision::Allow
    } else {
        Decision::Deny
    }
}

/// Authorization rules:
/// - admins may do everything, with one exception: an admin may not delete
///   their own account;
/// - users may view and mutate only records they own;
/// - every principal may view and edit their own profile, but role changes
///   are reserved to admins;
/// - audit records are visible to their author and to the owner of the
///   instance they reference, and are never mutable;
/// - the fleet (capacity ledger, cross-tenant listings) is readable by any
///   authenticated principal and mutable only by admins.
pub fn decide(who: &Identity, action: PolicyAction, target: &PolicyTarget) -> Decision {
    match target {
        PolicyTarget::Principal { id } => {
            let own_account = *id == who.principal_id;
            match action {
                PolicyAction::ChangeRole => allow_if(who.is_admin()),
                PolicyAction::Delete if who.is_admin() && own_account => Decision::Deny,
                PolicyAction::Delete => allow_if(who.is_admin() || own_account),
                PolicyAction::View | PolicyAction::Mutate => {
                    allow_if(who.is_admin() || own_account)
                }
            }
        }
        _ if who.is_admin() => Decision::Allow,
        PolicyTarget::Instance { owner_id } => allow_if(*owner_id == who.principal_id),
        PolicyTarget::Snapshot { instance_owner_id } => {
            allow_if(*instance_owner_id == who.principal_id)
        }
        PolicyTarget::AuditRecord {
            instance_owner_id,
            author_id,
        } => match action {
            PolicyAction::View => allow_if(
                *instance_owner_id == Some(who.principal_id) || *author_id == who.principal_id,
            ),
            _ => Decision::Deny,
        },
        PolicyTarget::Fleet => match action {
            PolicyAction::View => Decision::Allow,
            _ => Decision::Deny,
        },
    }
}

/// `decide`, folded into the error type services speak.
pub fn require(
    who: &Identity,
    action: PolicyAction,
    target: &PolicyTarget,
    denial: &str,
) -> Result<()> {
    match decide(who, action, target) {
        Decision::Allow => Ok(()),
        Decision::Deny => Err(Error::Forbidden(denial.to_string())),
    }
}

pub fn list_scope(who: &Identity) -> Scope {
    if who.is_admin() {
        Scope::Unrestricted
    } else {
        Scope::Owned(who.principal_id)
    }
}
