//! The status transition authority.
//!
//! Encodes the legal order state graph and rejects everything else. All status writes in the system go through
//! [`verify_transition`] before they reach the store, and the store write itself is conditional on the status the
//! caller observed, so an order can never take a value that is not reachable from `Pending` along these edges:
//!
//! | From       | To                                             |
//! |------------|------------------------------------------------|
//! | Pending    | Paid, Cancelled, Expired                       |
//! | Paid       | Processing, Cancelled, Refunded, PartiallyRefunded |
//! | Processing | Shipped, Cancelled, Refunded, PartiallyRefunded    |
//! | Shipped    | Delivered, Refunded, PartiallyRefunded         |
//! | (terminal) | —                                              |
//!
//! The authority performs no side effects. Inventory movements and notifications are orchestrated by the callers
//! around a successful transition.

use sfg_common::Money;
use thiserror::Error;

use crate::db_types::OrderStatusType;

#[derive(Debug, Clone, Error)]
pub enum TransitionError {
    #[error("Order is {current} and cannot move to {requested}. Allowed: [{allowed}]")]
    TerminalOrInvalidTransition { current: OrderStatusType, requested: OrderStatusType, allowed: String },
    #[error("Refund of {requested} is not valid against an order total of {total}")]
    InvalidRefundAmount { requested: Money, total: Money },
    #[error("Cannot ship without a carrier and a tracking number")]
    MissingShipmentDetails,
}

/// The set of statuses the given status may legally move to. Terminal statuses return the empty slice.
pub fn allowed_transitions(from: OrderStatusType) -> &'static [OrderStatusType] {
    use OrderStatusType::*;
    match from {
        Pending => &[Paid, Cancelled, Expired],
        Paid => &[Processing, Cancelled, Refunded, PartiallyRefunded],
        Processing => &[Shipped, Cancelled, Refunded, PartiallyRefunded],
        Shipped => &[Delivered, Refunded, PartiallyRefunded],
        Delivered | Cancelled | Expired | Refunded | PartiallyRefunded => &[],
    }
}

/// Checks that `from -> to` is an edge of the state graph.
pub fn verify_transition(from: OrderStatusType, to: OrderStatusType) -> Result<(), TransitionError> {
    let allowed = allowed_transitions(from);
    if allowed.contains(&to) {
        Ok(())
    } else {
        let allowed = allowed.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(", ");
        Err(TransitionError::TerminalOrInvalidTransition { current: from, requested: to, allowed })
    }
}

/// Decides which refund status a requested amount maps to. Equal to the order total means `Refunded`; strictly
/// between zero and the total means `PartiallyRefunded`; zero or more than the total is rejected.
pub fn classify_refund(requested: Money, total: Money) -> Result<OrderStatusType, TransitionError> {
    if !requested.is_positive() || requested > total {
        return Err(TransitionError::InvalidRefundAmount { requested, total });
    }
    if requested == total {
        Ok(OrderStatusType::Refunded)
    } else {
        Ok(OrderStatusType::PartiallyRefunded)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db_types::OrderStatusType::*;

    const ALL: [OrderStatusType; 9] =
        [Pending, Paid, Processing, Shipped, Delivered, Cancelled, Expired, Refunded, PartiallyRefunded];

    #[test]
    fn terminal_statuses_allow_nothing() {
        for terminal in [Delivered, Cancelled, Expired, Refunded, PartiallyRefunded] {
            for target in ALL {
                assert!(
                    verify_transition(terminal, target).is_err(),
                    "{terminal} -> {target} should have been rejected"
                );
            }
        }
    }

    #[test]
    fn pending_edges() {
        assert!(verify_transition(Pending, Paid).is_ok());
        assert!(verify_transition(Pending, Cancelled).is_ok());
        assert!(verify_transition(Pending, Expired).is_ok());
        assert!(verify_transition(Pending, Shipped).is_err());
        assert!(verify_transition(Pending, Delivered).is_err());
        assert!(verify_transition(Pending, Refunded).is_err());
    }

    #[test]
    fn fulfillment_path_is_linear() {
        assert!(verify_transition(Paid, Processing).is_ok());
        assert!(verify_transition(Processing, Shipped).is_ok());
        assert!(verify_transition(Shipped, Delivered).is_ok());
        // No skipping ahead
        assert!(verify_transition(Paid, Shipped).is_err());
        assert!(verify_transition(Paid, Delivered).is_err());
        assert!(verify_transition(Processing, Delivered).is_err());
        // No going back
        assert!(verify_transition(Shipped, Processing).is_err());
        assert!(verify_transition(Processing, Paid).is_err());
        assert!(verify_transition(Paid, Pending).is_err());
    }

    #[test]
    fn no_self_transitions() {
        for status in ALL {
            assert!(verify_transition(status, status).is_err(), "{status} -> {status} should have been rejected");
        }
    }

    #[test]
    fn rejection_names_current_status_and_allowed_set() {
        let err = verify_transition(Paid, Delivered).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Paid"));
        assert!(msg.contains("Processing"));
        assert!(msg.contains("Cancelled"));
        assert!(msg.contains("Refunded"));
    }

    #[test]
    fn refund_classification() {
        let total = Money::from(100);
        assert_eq!(classify_refund(Money::from(100), total).unwrap(), Refunded);
        assert_eq!(classify_refund(Money::from(99), total).unwrap(), PartiallyRefunded);
        assert_eq!(classify_refund(Money::from(1), total).unwrap(), PartiallyRefunded);
        assert!(classify_refund(Money::from(0), total).is_err());
        assert!(classify_refund(Money::from(101), total).is_err());
        assert!(classify_refund(Money::from(-5), total).is_err());
    }
}
