//! Clients for the external collaborators: the payment processor, the carrier tracking service and the
//! notification relay. All of them sit behind the engine's collaborator traits (or behind the event hooks) so the
//! rest of the system never sees HTTP.

mod notifier;
mod processor;
mod tracker;

pub use notifier::Notifier;
pub use processor::HttpPaymentProcessor;
pub use tracker::HttpDeliveryTracker;
