//! Contact listener
//!
//! Hosts observe and filter the contact pipeline through an optional
//! listener with default no-op methods. All callbacks run inline on the
//! stepping thread; they may read bodies but must not add or remove bodies
//! or constraints.

use body::{BodyId, RigidBody};
use narrow::manifold::ContactManifold;
use narrow::ContactHit;

/// Verdict of [`ContactListener::on_contact_validate`](trait.ContactListener.html#method.on_contact_validate).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidateResult {
    /// Keep this hit, keep validating the rest.
    AcceptContact,
    /// Keep this hit and every remaining hit of this pair without asking.
    AcceptAllContactsForThisBodyPair,
    /// Drop this hit, keep validating the rest.
    RejectContact,
    /// Drop this hit and every remaining hit of this pair this step.
    RejectAllContactsForThisBodyPair,
}

/// Contact pipeline callbacks.
///
/// `on_body_pair_validate` sees the body with the higher motion type first
/// (ties broken toward the lower id); the `on_contact_*` callbacks see the
/// pair ordered the same way.
pub trait ContactListener {
    /// Called per candidate pair before the narrow phase; `false` drops the
    /// pair this step.
    fn on_body_pair_validate(&mut self, _body_a: &RigidBody, _body_b: &RigidBody) -> bool {
        true
    }

    /// Called per narrow phase hit before manifold reduction.
    fn on_contact_validate(
        &mut self,
        _body_a: &RigidBody,
        _body_b: &RigidBody,
        _hit: &ContactHit,
    ) -> ValidateResult {
        ValidateResult::AcceptContact
    }

    /// Called for a manifold of a pair that was not touching last step.
    fn on_contact_added(
        &mut self,
        _body_a: &RigidBody,
        _body_b: &RigidBody,
        _manifold: &ContactManifold,
    ) {
    }

    /// Called for a manifold of a pair that was already touching last step.
    fn on_contact_persisted(
        &mut self,
        _body_a: &RigidBody,
        _body_b: &RigidBody,
        _manifold: &ContactManifold,
    ) {
    }

    /// Called after the step for pairs that stopped touching.
    fn on_contact_removed(&mut self, _body_a: BodyId, _body_b: BodyId) {}
}
