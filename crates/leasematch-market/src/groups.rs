//! Deployment-group registry.
//!
//! ## Group state machine
//!
//! ```text
//!            provider closes bid          start
//!   OPEN ─────────────────────▶ PAUSED ─────────▶ OPEN
//!    │  escrow overdrawn            │
//!    ├────────────────────▶ INSUFFICIENT_FUNDS
//!    │                             │
//!    ▼ close                       ▼ close
//!   CLOSED ◀───────────────────────┘
//! ```
//!
//! Only an Open group gets a fresh order after its lease closes.

use leasematch_types::{
    DeploymentId, Group, GroupId, GroupSpec, GroupState, KvStore, LedgerError, LedgerEvent,
    Result, TxContext, load, load_prefix, save,
};
use tracing::debug;

use crate::keys;

#[derive(Debug, Clone, Copy, Default)]
pub struct GroupRegistry;

impl GroupRegistry {
    pub fn get_group(&self, store: &dyn KvStore, id: &GroupId) -> Result<Option<Group>> {
        load(store, &keys::group_key(id))
    }

    /// # Errors
    /// `GroupNotFound`.
    pub fn require_group(&self, store: &dyn KvStore, id: &GroupId) -> Result<Group> {
        self.get_group(store, id)?
            .ok_or_else(|| LedgerError::GroupNotFound(id.clone()))
    }

    /// Groups of a deployment, ascending by `gseq`.
    pub fn groups_for_deployment(
        &self,
        store: &dyn KvStore,
        id: &DeploymentId,
    ) -> Result<Vec<Group>> {
        load_prefix(store, &keys::groups_prefix(id))
    }

    /// # Errors
    /// `InvalidSpec` / `InvalidAddress` / `GroupExists`.
    pub fn create_group(
        &self,
        ctx: &mut TxContext<'_>,
        id: GroupId,
        spec: GroupSpec,
    ) -> Result<Group> {
        id.owner.validate()?;
        spec.validate()?;
        if self.get_group(&*ctx, &id)?.is_some() {
            return Err(LedgerError::GroupExists(id));
        }
        let group = Group {
            id,
            state: GroupState::Open,
            spec,
            created_at: ctx.height(),
        };
        save(ctx, keys::group_key(&group.id), &group)?;
        ctx.emit(LedgerEvent::GroupCreated {
            id: group.id.clone(),
        });
        debug!(group = %group.id, spec = %group.spec.name, "group created");
        Ok(group)
    }

    /// A provider walked away from the group's lease: pause an Open group.
    pub fn on_bid_closed(&self, ctx: &mut TxContext<'_>, id: &GroupId) -> Result<Group> {
        self.transition(ctx, id, GroupState::Paused)
    }

    /// The group's lease closed. The group itself is unchanged; callers
    /// re-order only if it is still Open.
    pub fn on_lease_closed(&self, store: &dyn KvStore, id: &GroupId) -> Result<Group> {
        self.require_group(store, id)
    }

    /// The deployment's escrow ran dry.
    pub fn on_insufficient_funds(&self, ctx: &mut TxContext<'_>, id: &GroupId) -> Result<Group> {
        self.transition(ctx, id, GroupState::InsufficientFunds)
    }

    /// Idempotent.
    pub fn close_group(&self, ctx: &mut TxContext<'_>, id: &GroupId) -> Result<Group> {
        self.transition(ctx, id, GroupState::Closed)
    }

    /// # Errors
    /// `GroupNotPaused` unless the group is Paused.
    pub fn start_group(&self, ctx: &mut TxContext<'_>, id: &GroupId) -> Result<Group> {
        let group = self.require_group(&*ctx, id)?;
        if group.state != GroupState::Paused {
            return Err(LedgerError::GroupNotPaused {
                id: id.clone(),
                actual: group.state,
            });
        }
        self.transition(ctx, id, GroupState::Open)
    }

    /// Apply `target` when the state machine allows it; otherwise leave the
    /// group as it is.
    fn transition(
        &self,
        ctx: &mut TxContext<'_>,
        id: &GroupId,
        target: GroupState,
    ) -> Result<Group> {
        let mut group = self.require_group(&*ctx, id)?;
        if !group.state.can_transition_to(target) {
            return Ok(group);
        }
        debug!(group = %id, from = %group.state, to = %target, "group transition");
        group.state = target;
        save(ctx, keys::group_key(id), &group)?;
        let id = id.clone();
        ctx.emit(match target {
            GroupState::Open => LedgerEvent::GroupStarted { id },
            GroupState::Paused => LedgerEvent::GroupPaused { id },
            GroupState::InsufficientFunds => LedgerEvent::GroupInsufficientFunds { id },
            GroupState::Closed => LedgerEvent::GroupClosed { id },
        });
        Ok(group)
    }
}
