//! Dual-control ("four-eyes") verification policy.
//!
//! Applied at every "X then verify-X" checkpoint: the person who performed a
//! step may not be the person who certifies it. The block is soft — a real
//! single-staff shift can override with an explicit confirmation flag — but
//! every override is permanently tagged in the audit trail and the order's
//! status history.

use washflow_core::ServiceError;

use crate::model::Actor;

/// Tag appended to audit details and status-history notes when a checkpoint
/// was self-verified under the explicit override.
pub const SAME_PERSON_TAG: &str = "(same person)";

/// Check the four-eyes rule for a verification step.
///
/// Returns `Ok(true)` when the verifier is the performer and the override
/// flag was supplied (the caller must tag the resulting records), `Ok(false)`
/// for a normal second-person verification, and
/// [`ServiceError::ConfirmationRequired`] when the verifier is the performer
/// and no override was given — the two-phase confirm flow re-invokes the same
/// call with `force_same_person: true`.
pub fn check_dual_control(
    action: &str,
    performer: Option<&str>,
    verifier: &Actor,
    force_same_person: bool,
) -> Result<bool, ServiceError> {
    let Some(performer) = performer else {
        return Ok(false);
    };
    if performer != verifier.id {
        return Ok(false);
    }
    if force_same_person {
        return Ok(true);
    }
    Err(ServiceError::ConfirmationRequired {
        action: action.to_string(),
        performer: performer.to_string(),
    })
}

/// Initials recorded alongside a verification timestamp.
///
/// Uses the supplied initials when present (≥2 characters), otherwise
/// derives them from the actor's first/last name. Physical paper-trail
/// convention: every checkpoint gets initials, independent of the full
/// actor identity.
pub fn initials_for(actor: &Actor) -> String {
    if let Some(supplied) = &actor.initials {
        let trimmed = supplied.trim();
        if trimmed.chars().count() >= 2 {
            return trimmed.to_uppercase();
        }
    }
    derive_initials(&actor.name)
}

fn derive_initials(name: &str) -> String {
    let words: Vec<&str> = name.split_whitespace().collect();
    match words.as_slice() {
        [] => "??".to_string(),
        [only] => {
            let mut chars = only.chars();
            let first = chars.next().unwrap_or('?');
            let second = chars.next().unwrap_or(first);
            format!("{first}{second}").to_uppercase()
        }
        [first, .., last] => {
            let a = first.chars().next().unwrap_or('?');
            let b = last.chars().next().unwrap_or('?');
            format!("{a}{b}").to_uppercase()
        }
    }
}
