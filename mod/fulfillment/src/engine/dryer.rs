//! Dryer unload lifecycle: mark unloaded → dual-control verify → (uncheck).
//!
//! A dryer assignment keeps its machine occupied until the unload is
//! *verified*, not merely marked. Verification is the checkpoint that frees
//! the machine, and — once every dryer load is done — moves the order to
//! `on_cart`.

use washflow_core::ServiceError;

use super::FulfillmentEngine;
use crate::model::{Actor, MachineType, Order};
use crate::policy::{self, SAME_PERSON_TAG};
use crate::store::FulfillmentStore;

impl FulfillmentEngine {
    /// First signature: the person who emptied the dryer marks it unloaded.
    ///
    /// The assignment stays open — the machine is still occupied until a
    /// second person verifies.
    pub fn mark_unloaded(
        &self,
        order_id: &str,
        machine_id: &str,
        actor: &Actor,
    ) -> Result<Order, ServiceError> {
        let initials = policy::initials_for(actor);
        let (order, ()) = self.update_order(order_id, |order| {
            let now = self.now();
            let Some(a) = order.open_assignment_mut(machine_id) else {
                return Err(ServiceError::NotFound(format!(
                    "no open assignment for machine {machine_id}"
                )));
            };
            if a.machine_type != MachineType::Dryer {
                return Err(ServiceError::Validation(
                    "unload applies to dryer assignments".into(),
                ));
            }
            if a.is_unloaded() {
                return Err(ServiceError::Conflict(
                    "dryer load is already marked unloaded".into(),
                ));
            }
            a.unloaded_at = Some(now);
            a.unloaded_by = Some(actor.id.clone());
            a.unloaded_initials = Some(initials.clone());
            Ok(())
        })?;
        self.record(
            actor,
            "order.unload",
            "order",
            order_id,
            format!("dryer unloaded by {initials}"),
            serde_json::json!({ "machineId": machine_id }),
        );
        Ok(order)
    }

    /// Second signature: verify the unload. Dual-control — the verifier must
    /// differ from the unloader unless `force_same_person` confirms the
    /// override, which is then tagged in the history and audit record.
    ///
    /// Verifying closes the assignment, frees the dryer, and — when this was
    /// the last open dryer load — moves the order to `on_cart`.
    pub fn verify_unload(
        &self,
        order_id: &str,
        machine_id: &str,
        actor: &Actor,
        force_same_person: bool,
    ) -> Result<Order, ServiceError> {
        let initials = policy::initials_for(actor);
        let (order, (changed, forced)) = self.update_order(order_id, |order| {
            let now = self.now();
            if order
                .latest_assignment(machine_id)
                .is_some_and(|a| a.is_unload_checked())
            {
                return Err(ServiceError::Conflict(
                    "dryer unload is already verified".into(),
                ));
            }
            let Some(a) = order.open_assignment_mut(machine_id) else {
                return Err(ServiceError::NotFound(format!(
                    "no open assignment for machine {machine_id}"
                )));
            };
            if a.machine_type != MachineType::Dryer {
                return Err(ServiceError::Validation(
                    "unload verification applies to dryer assignments".into(),
                ));
            }
            if !a.is_unloaded() {
                return Err(ServiceError::InvalidStateTransition {
                    required: "unloaded".into(),
                    actual: "assigned".into(),
                });
            }
            let forced = policy::check_dual_control(
                "verify dryer unload",
                a.unloaded_by.as_deref(),
                actor,
                force_same_person,
            )?;
            a.unload_verified_at = Some(now);
            a.unload_verified_by = Some(actor.id.clone());
            a.unload_verified_initials = Some(initials.clone());
            let machine_name = a.machine_name.clone();

            let mut note = format!("{machine_name} unload verified by {initials}");
            if forced {
                note.push(' ');
                note.push_str(SAME_PERSON_TAG);
            }
            let changed = self.advance_status(order, actor, Some(note.clone()));
            if !changed {
                self.push_note(order, actor, note);
            }
            Ok((changed, forced))
        })?;

        // The assignment no longer occupies the dryer.
        self.free_machine_best_effort(machine_id, order_id);

        let details = if forced {
            format!("dryer unload verified by {initials} {SAME_PERSON_TAG}")
        } else {
            format!("dryer unload verified by {initials}")
        };
        self.record(
            actor,
            "order.unload_check",
            "order",
            order_id,
            details,
            serde_json::json!({
                "machineId": machine_id,
                "samePerson": forced,
                "status": order.status.as_str(),
            }),
        );
        self.notify(&order, actor, changed);
        Ok(order)
    }

    /// Undo an unload mark / verification on the most recent assignment for
    /// this dryer. Idempotent; used to recover from mis-scans.
    ///
    /// Clearing the verification reopens the assignment, which puts the load
    /// back in the dryer — so the machine must still be ours to take. If it
    /// has been handed to another order since the verify freed it, the
    /// uncheck fails with `Conflict` instead of double-booking the machine.
    /// Status is re-derived with regression allowed (this is one of the
    /// explicit actions that may regress it).
    pub fn uncheck_unload(
        &self,
        order_id: &str,
        machine_id: &str,
        actor: &Actor,
    ) -> Result<Order, ServiceError> {
        // Pre-validate on a fresh load: the no-op paths must not touch the
        // machine.
        let order = self.store().find_order(order_id)?;
        if order.deleted {
            return Err(ServiceError::NotFound(format!("order {order_id}")));
        }
        let Some(a) = order.latest_assignment(machine_id) else {
            return Ok(order);
        };
        if a.machine_type != MachineType::Dryer {
            return Err(ServiceError::Validation(
                "unload uncheck applies to dryer assignments".into(),
            ));
        }
        if a.is_fold_started() {
            return Err(ServiceError::Conflict(
                "folding already started for this load".into(),
            ));
        }
        if a.unloaded_at.is_none() && a.unload_verified_at.is_none() {
            return Ok(order);
        }

        // The occupancy CAS decides the race against a concurrent assign.
        let reoccupied = self.reoccupy_machine(machine_id, order_id)?;

        let result = self.update_order(order_id, |order| {
            let Some(a) = order.latest_assignment_mut(machine_id) else {
                return Ok((false, false));
            };
            if a.is_fold_started() {
                return Err(ServiceError::Conflict(
                    "folding already started for this load".into(),
                ));
            }
            if a.unloaded_at.is_none() && a.unload_verified_at.is_none() {
                return Ok((false, false));
            }
            a.unloaded_at = None;
            a.unloaded_by = None;
            a.unloaded_initials = None;
            a.unload_verified_at = None;
            a.unload_verified_by = None;
            a.unload_verified_initials = None;
            let changed =
                self.apply_status(order, actor, Some("dryer unload unchecked".into()), true);
            Ok((true, changed))
        });

        match result {
            Ok((order, (cleared, changed))) => {
                if cleared {
                    self.record(
                        actor,
                        "order.unload_uncheck",
                        "order",
                        order_id,
                        "dryer unload unchecked".into(),
                        serde_json::json!({
                            "machineId": machine_id,
                            "status": order.status.as_str(),
                        }),
                    );
                    self.notify(&order, actor, changed);
                }
                Ok(order)
            }
            Err(e) => {
                // The assignment never reopened; undo our occupancy.
                if reoccupied {
                    self.free_machine_best_effort(machine_id, order_id);
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use crate::model::{MachineStatus, MachineType, OrderStatus};
    use crate::store::FulfillmentStore;
    use washflow_core::ServiceError;

    fn dried_order(fx: &Fixture) -> String {
        seed_machine(fx, "d1", "D-01", MachineType::Dryer);
        let order = seed_order(fx, &[], false);
        fx.engine
            .assign_machine(&order.id, "D-01", &actor("u1", "Dana Fox"), None)
            .unwrap();
        order.id
    }

    #[test]
    fn unload_alone_keeps_machine_occupied() {
        let fx = fixture();
        let order_id = dried_order(&fx);

        let order = fx
            .engine
            .mark_unloaded(&order_id, "d1", &actor("u1", "Dana Fox"))
            .unwrap();
        assert_eq!(order.status, OrderStatus::InDryer);
        assert_eq!(order.assignments[0].unloaded_initials.as_deref(), Some("DF"));
        assert!(order.assignments[0].is_open());

        let machine = fx.store.find_machine("d1").unwrap();
        assert_eq!(machine.status, MachineStatus::InUse);
        assert_machine_invariant(&fx, "d1");
    }

    #[test]
    fn double_unload_is_conflict() {
        let fx = fixture();
        let order_id = dried_order(&fx);
        let dana = actor("u1", "Dana Fox");

        fx.engine.mark_unloaded(&order_id, "d1", &dana).unwrap();
        let err = fx.engine.mark_unloaded(&order_id, "d1", &dana).unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[test]
    fn verify_without_unload_is_invalid_state() {
        let fx = fixture();
        let order_id = dried_order(&fx);

        let err = fx
            .engine
            .verify_unload(&order_id, "d1", &actor("u2", "Sam Reyes"), false)
            .unwrap_err();
        match err {
            ServiceError::InvalidStateTransition { required, actual } => {
                assert_eq!(required, "unloaded");
                assert_eq!(actual, "assigned");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn verify_by_second_person_frees_machine_and_moves_to_on_cart() {
        let fx = fixture();
        let order_id = dried_order(&fx);

        fx.engine
            .mark_unloaded(&order_id, "d1", &actor("u1", "Dana Fox"))
            .unwrap();
        let order = fx
            .engine
            .verify_unload(&order_id, "d1", &actor("u2", "Sam Reyes"), false)
            .unwrap();

        assert_eq!(order.status, OrderStatus::OnCart);
        let a = &order.assignments[0];
        assert!(a.is_unload_checked());
        assert!(!a.is_open());
        assert_eq!(a.unload_verified_initials.as_deref(), Some("SR"));

        let machine = fx.store.find_machine("d1").unwrap();
        assert_eq!(machine.status, MachineStatus::Available);
        assert_machine_invariant(&fx, "d1");
    }

    #[test]
    fn same_person_requires_explicit_confirmation() {
        let fx = fixture();
        let order_id = dried_order(&fx);
        let dana = actor("u1", "Dana Fox");

        fx.engine.mark_unloaded(&order_id, "d1", &dana).unwrap();
        let err = fx
            .engine
            .verify_unload(&order_id, "d1", &dana, false)
            .unwrap_err();
        match &err {
            ServiceError::ConfirmationRequired { performer, .. } => {
                assert_eq!(performer, "u1");
            }
            other => panic!("unexpected error: {other}"),
        }

        // State untouched by the rejected attempt.
        let order = fx.engine.get_order(&order_id).unwrap();
        assert!(order.assignments[0].unload_verified_at.is_none());

        // Re-invoking with the confirmation succeeds and is tagged.
        let order = fx.engine.verify_unload(&order_id, "d1", &dana, true).unwrap();
        assert_eq!(order.status, OrderStatus::OnCart);
        assert!(
            order
                .status_history
                .iter()
                .any(|h| h.note.as_deref().is_some_and(|n| n.contains("(same person)"))),
            "override must be tagged in history"
        );
        let events = fx.recorder.events();
        let check = events
            .iter()
            .find(|e| e.action == "order.unload_check")
            .unwrap();
        assert!(check.details.contains("(same person)"));
    }

    #[test]
    fn double_verify_is_conflict() {
        let fx = fixture();
        let order_id = dried_order(&fx);

        fx.engine
            .mark_unloaded(&order_id, "d1", &actor("u1", "Dana Fox"))
            .unwrap();
        fx.engine
            .verify_unload(&order_id, "d1", &actor("u2", "Sam Reyes"), false)
            .unwrap();
        let err = fx
            .engine
            .verify_unload(&order_id, "d1", &actor("u3", "Kim Ito"), false)
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[test]
    fn on_cart_waits_for_all_dryers() {
        let fx = fixture();
        seed_machine(&fx, "d1", "D-01", MachineType::Dryer);
        seed_machine(&fx, "d2", "D-02", MachineType::Dryer);
        let order = seed_order(&fx, &[], false);
        let dana = actor("u1", "Dana Fox");
        let sam = actor("u2", "Sam Reyes");

        fx.engine.assign_machine(&order.id, "D-01", &dana, None).unwrap();
        fx.engine.assign_machine(&order.id, "D-02", &dana, None).unwrap();

        fx.engine.mark_unloaded(&order.id, "d1", &dana).unwrap();
        let mid = fx.engine.verify_unload(&order.id, "d1", &sam, false).unwrap();
        assert_eq!(mid.status, OrderStatus::InDryer, "one dryer still open");

        fx.engine.mark_unloaded(&order.id, "d2", &dana).unwrap();
        let done = fx.engine.verify_unload(&order.id, "d2", &sam, false).unwrap();
        assert_eq!(done.status, OrderStatus::OnCart);
    }

    #[test]
    fn late_dryer_scan_after_on_cart_does_not_regress() {
        let fx = fixture();
        let order_id = dried_order(&fx);
        let dana = actor("u1", "Dana Fox");
        let sam = actor("u2", "Sam Reyes");

        fx.engine.mark_unloaded(&order_id, "d1", &dana).unwrap();
        fx.engine.verify_unload(&order_id, "d1", &sam, false).unwrap();

        // An extra dryer scan after on_cart: ledger records it, status stays.
        seed_machine(&fx, "d2", "D-02", MachineType::Dryer);
        let order = fx.engine.assign_machine(&order_id, "D-02", &dana, None).unwrap();
        assert_eq!(order.status, OrderStatus::OnCart);
        assert_eq!(order.assignments.len(), 2);
    }

    #[test]
    fn uncheck_reopens_assignment_and_reoccupies_machine() {
        let fx = fixture();
        let order_id = dried_order(&fx);
        let dana = actor("u1", "Dana Fox");
        let sam = actor("u2", "Sam Reyes");

        fx.engine.mark_unloaded(&order_id, "d1", &dana).unwrap();
        fx.engine.verify_unload(&order_id, "d1", &sam, false).unwrap();

        let order = fx.engine.uncheck_unload(&order_id, "d1", &sam).unwrap();
        assert_eq!(order.status, OrderStatus::InDryer, "explicit uncheck may regress");
        let a = &order.assignments[0];
        assert!(a.unloaded_at.is_none());
        assert!(a.unload_verified_at.is_none());
        assert!(a.is_open());

        let machine = fx.store.find_machine("d1").unwrap();
        assert_eq!(machine.status, MachineStatus::InUse);
        assert_eq!(machine.current_order.as_deref(), Some(order_id.as_str()));
        assert_machine_invariant(&fx, "d1");
    }

    #[test]
    fn uncheck_fails_when_dryer_was_reassigned() {
        let fx = fixture();
        let order_id = dried_order(&fx);
        let dana = actor("u1", "Dana Fox");
        let sam = actor("u2", "Sam Reyes");

        fx.engine.mark_unloaded(&order_id, "d1", &dana).unwrap();
        fx.engine.verify_unload(&order_id, "d1", &sam, false).unwrap();

        // The freed dryer goes to another order before the uncheck lands.
        let other = seed_order(&fx, &[], false);
        fx.engine.assign_machine(&other.id, "D-01", &dana, None).unwrap();

        let err = fx.engine.uncheck_unload(&order_id, "d1", &sam).unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        // The verification stands and the dryer still belongs to the other
        // order — no second open assignment may reference it.
        let order = fx.engine.get_order(&order_id).unwrap();
        assert!(order.assignments[0].is_unload_checked());
        assert!(!order.assignments[0].is_open());
        let machine = fx.store.find_machine("d1").unwrap();
        assert_eq!(machine.current_order.as_deref(), Some(other.id.as_str()));
        assert_machine_invariant(&fx, "d1");
    }

    #[test]
    fn uncheck_fails_when_dryer_went_into_maintenance() {
        let fx = fixture();
        let order_id = dried_order(&fx);
        let dana = actor("u1", "Dana Fox");
        let sam = actor("u2", "Sam Reyes");

        fx.engine.mark_unloaded(&order_id, "d1", &dana).unwrap();
        fx.engine.verify_unload(&order_id, "d1", &sam, false).unwrap();

        let mut machine = fx.store.find_machine("d1").unwrap();
        machine.status = MachineStatus::Maintenance;
        fx.store.save_machine(&machine, machine.version).unwrap();

        let err = fx.engine.uncheck_unload(&order_id, "d1", &sam).unwrap_err();
        assert!(matches!(err, ServiceError::MachineUnavailable(_)));
        let order = fx.engine.get_order(&order_id).unwrap();
        assert!(order.assignments[0].is_unload_checked());
    }

    #[test]
    fn uncheck_is_idempotent() {
        let fx = fixture();
        let order_id = dried_order(&fx);
        let sam = actor("u2", "Sam Reyes");

        let before = fx.recorder.events().len();
        let order = fx.engine.uncheck_unload(&order_id, "d1", &sam).unwrap();
        assert_eq!(order.status, OrderStatus::InDryer);
        assert_eq!(fx.recorder.events().len(), before, "no-op records nothing");
    }

    #[test]
    fn unload_on_washer_is_validation_error() {
        let fx = fixture();
        seed_machine(&fx, "w1", "W-01", MachineType::Washer);
        let order = seed_order(&fx, &[], false);
        let dana = actor("u1", "Dana Fox");
        fx.engine.assign_machine(&order.id, "W-01", &dana, None).unwrap();

        let err = fx.engine.mark_unloaded(&order.id, "w1", &dana).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }
}
