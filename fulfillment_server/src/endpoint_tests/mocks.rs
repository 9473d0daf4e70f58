use fulfillment_engine::{
    db_types::OrderRef,
    traits::{CollaboratorError, DeliveryTracker, PaymentProcessor, PaymentQuote, TrackingSnapshot},
};
use mockall::mock;
use sfg_common::{CoinAmount, Money};

mock! {
    pub Processor {}
    impl PaymentProcessor for Processor {
        async fn request_payment(
            &self,
            order_ref: &OrderRef,
            currency: &str,
            fiat_total: Money,
        ) -> Result<PaymentQuote, CollaboratorError>;
    }
}

mock! {
    pub Tracker {}
    impl DeliveryTracker for Tracker {
        async fn track(&self, carrier: &str, tracking_number: &str) -> Result<TrackingSnapshot, CollaboratorError>;
        async fn register(&self, carrier: &str, tracking_number: &str) -> Result<(), CollaboratorError>;
    }
}

pub fn standard_quote() -> PaymentQuote {
    PaymentQuote {
        payment_address: "bc1qmockaddress".to_string(),
        crypto_amount: CoinAmount::from(500_000),
        minimum: CoinAmount::from(10_000),
    }
}
