//! Folding: per-load fold start, order-level fold completion, and the
//! dual-control folding verification.

use washflow_core::ServiceError;

use super::FulfillmentEngine;
use crate::model::{Actor, MachineType, Order, OrderStatus};
use crate::policy::{self, SAME_PERSON_TAG};

impl FulfillmentEngine {
    /// Start folding a verified dryer load. Moves the order to `folding`.
    pub fn start_folding(
        &self,
        order_id: &str,
        machine_id: &str,
        actor: &Actor,
    ) -> Result<Order, ServiceError> {
        let (order, changed) = self.update_order(order_id, |order| {
            if !matches!(order.status, OrderStatus::OnCart | OrderStatus::Folding) {
                return Err(ServiceError::InvalidStateTransition {
                    required: "on_cart".into(),
                    actual: order.status.as_str().into(),
                });
            }
            let now = self.now();
            let Some(a) = order.latest_assignment_mut(machine_id) else {
                return Err(ServiceError::NotFound(format!(
                    "no assignment for machine {machine_id}"
                )));
            };
            if a.machine_type != MachineType::Dryer {
                return Err(ServiceError::Validation(
                    "folding starts from a dryer load".into(),
                ));
            }
            if !a.is_unload_checked() {
                return Err(ServiceError::InvalidStateTransition {
                    required: "unload_checked".into(),
                    actual: if a.is_unloaded() { "unloaded" } else { "assigned" }.into(),
                });
            }
            if a.is_fold_started() {
                return Err(ServiceError::Conflict(
                    "folding already started for this load".into(),
                ));
            }
            a.fold_started_at = Some(now);
            a.fold_started_by = Some(actor.id.clone());
            let name = a.machine_name.clone();
            let changed =
                self.advance_status(order, actor, Some(format!("folding started ({name} load)")));
            Ok(changed)
        })?;
        self.record(
            actor,
            "order.fold_start",
            "order",
            order_id,
            format!("folding started on order #{}", order.seq),
            serde_json::json!({ "machineId": machine_id }),
        );
        self.notify(&order, actor, changed);
        Ok(order)
    }

    /// The folder declares the whole order folded. Moves it to `folded`,
    /// pending dual-control verification.
    pub fn mark_folded(&self, order_id: &str, actor: &Actor) -> Result<Order, ServiceError> {
        let (order, changed) = self.update_order(order_id, |order| {
            if order.folded_at.is_some() {
                return Err(ServiceError::Conflict("order is already marked folded".into()));
            }
            if order.status != OrderStatus::Folding {
                return Err(ServiceError::InvalidStateTransition {
                    required: "folding".into(),
                    actual: order.status.as_str().into(),
                });
            }
            order.folded_at = Some(self.now());
            order.folded_by = Some(actor.id.clone());
            let changed = self.advance_status(order, actor, Some("marked folded".into()));
            Ok(changed)
        })?;
        self.record(
            actor,
            "order.fold_done",
            "order",
            order_id,
            format!("order #{} marked folded", order.seq),
            serde_json::Value::Null,
        );
        self.notify(&order, actor, changed);
        Ok(order)
    }

    /// Dual-control verification of the fold against the person who folded.
    /// Does not change the status (`folded` stays until the final check); the
    /// checkpoint is recorded in history instead.
    pub fn verify_folding(
        &self,
        order_id: &str,
        actor: &Actor,
        force_same_person: bool,
    ) -> Result<Order, ServiceError> {
        let initials = policy::initials_for(actor);
        let (order, forced) = self.update_order(order_id, |order| {
            if order.folding_checked_at.is_some() {
                return Err(ServiceError::Conflict("folding is already verified".into()));
            }
            if order.folded_at.is_none() {
                return Err(ServiceError::InvalidStateTransition {
                    required: "folded".into(),
                    actual: order.status.as_str().into(),
                });
            }
            let forced = policy::check_dual_control(
                "verify folding",
                order.folded_by.as_deref(),
                actor,
                force_same_person,
            )?;
            let now = self.now();
            order.folding_checked_at = Some(now.clone());
            order.folding_checked_by = Some(actor.id.clone());
            order.folding_checked_initials = Some(initials.clone());
            for a in &mut order.assignments {
                if a.is_fold_started() && a.fold_verified_at.is_none() {
                    a.fold_verified_at = Some(now.clone());
                    a.fold_verified_by = Some(actor.id.clone());
                }
            }
            let mut note = format!("folding verified by {initials}");
            if forced {
                note.push(' ');
                note.push_str(SAME_PERSON_TAG);
            }
            self.push_note(order, actor, note);
            Ok(forced)
        })?;
        let details = if forced {
            format!("folding verified by {initials} {SAME_PERSON_TAG}")
        } else {
            format!("folding verified by {initials}")
        };
        self.record(
            actor,
            "order.fold_check",
            "order",
            order_id,
            details,
            serde_json::json!({ "samePerson": forced }),
        );
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use crate::model::{MachineType, OrderStatus};
    use washflow_core::ServiceError;

    /// Drive an order through wash + dry to `on_cart`.
    fn carted_order(fx: &Fixture) -> String {
        seed_machine(fx, "w1", "W-01", MachineType::Washer);
        seed_machine(fx, "d1", "D-01", MachineType::Dryer);
        let order = seed_order(fx, &[], false);
        let dana = actor("u1", "Dana Fox");
        let sam = actor("u2", "Sam Reyes");

        fx.engine.assign_machine(&order.id, "W-01", &dana, None).unwrap();
        fx.engine.release_machine(&order.id, "w1", &dana).unwrap();
        fx.engine.assign_machine(&order.id, "D-01", &dana, None).unwrap();
        fx.engine.mark_unloaded(&order.id, "d1", &dana).unwrap();
        fx.engine.verify_unload(&order.id, "d1", &sam, false).unwrap();
        order.id
    }

    #[test]
    fn fold_start_requires_verified_load() {
        let fx = fixture();
        seed_machine(&fx, "d1", "D-01", MachineType::Dryer);
        let order = seed_order(&fx, &[], false);
        let dana = actor("u1", "Dana Fox");
        fx.engine.assign_machine(&order.id, "D-01", &dana, None).unwrap();

        let err = fx.engine.start_folding(&order.id, "d1", &dana).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidStateTransition { .. }));
    }

    #[test]
    fn fold_flow_through_verification() {
        let fx = fixture();
        let order_id = carted_order(&fx);
        let kim = actor("u3", "Kim Ito");
        let sam = actor("u2", "Sam Reyes");

        let order = fx.engine.start_folding(&order_id, "d1", &kim).unwrap();
        assert_eq!(order.status, OrderStatus::Folding);

        let order = fx.engine.mark_folded(&order_id, &kim).unwrap();
        assert_eq!(order.status, OrderStatus::Folded);
        assert_eq!(order.folded_by.as_deref(), Some("u3"));

        let order = fx.engine.verify_folding(&order_id, &sam, false).unwrap();
        assert_eq!(order.status, OrderStatus::Folded, "verification keeps folded");
        assert_eq!(order.folding_checked_initials.as_deref(), Some("SR"));
        assert!(order.assignments.last().unwrap().fold_verified_at.is_some());
    }

    #[test]
    fn fold_start_twice_is_conflict() {
        let fx = fixture();
        let order_id = carted_order(&fx);
        let kim = actor("u3", "Kim Ito");

        fx.engine.start_folding(&order_id, "d1", &kim).unwrap();
        let err = fx.engine.start_folding(&order_id, "d1", &kim).unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[test]
    fn mark_folded_requires_folding() {
        let fx = fixture();
        let order_id = carted_order(&fx);

        let err = fx
            .engine
            .mark_folded(&order_id, &actor("u3", "Kim Ito"))
            .unwrap_err();
        match err {
            ServiceError::InvalidStateTransition { required, actual } => {
                assert_eq!(required, "folding");
                assert_eq!(actual, "on_cart");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn folding_verification_is_dual_controlled() {
        let fx = fixture();
        let order_id = carted_order(&fx);
        let kim = actor("u3", "Kim Ito");

        fx.engine.start_folding(&order_id, "d1", &kim).unwrap();
        fx.engine.mark_folded(&order_id, &kim).unwrap();

        let err = fx.engine.verify_folding(&order_id, &kim, false).unwrap_err();
        assert!(matches!(err, ServiceError::ConfirmationRequired { .. }));

        let order = fx.engine.verify_folding(&order_id, &kim, true).unwrap();
        assert!(
            order
                .status_history
                .iter()
                .any(|h| h.note.as_deref().is_some_and(|n| n.contains("(same person)")))
        );
    }

    #[test]
    fn verify_folding_before_folded_is_invalid_state() {
        let fx = fixture();
        let order_id = carted_order(&fx);

        let err = fx
            .engine
            .verify_folding(&order_id, &actor("u2", "Sam Reyes"), false)
            .unwrap_err();
        match err {
            ServiceError::InvalidStateTransition { required, .. } => {
                assert_eq!(required, "folded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
