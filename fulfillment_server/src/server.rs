use std::time::Duration;

use actix_web::{http::KeepAlive, middleware::Logger, web, App, HttpServer};
use fulfillment_engine::{
    events::{EventHandlers, EventHooks, EventProducers},
    traits::DeliveryTracker,
    CheckoutApi,
    OrderFlowApi,
    SqliteDatabase,
};
use log::*;

use crate::{
    auth::ApiKeyRegistry,
    config::{CronOptions, ServerConfig, ServerOptions, WebhookOptions},
    errors::ServerError,
    integrations::{HttpDeliveryTracker, HttpPaymentProcessor, Notifier},
    rate_limit::SlidingWindowLimiter,
    routes::{
        health,
        AdjustStockRoute,
        CheckoutRoute,
        CronExpireRoute,
        CronTrackDeliveriesRoute,
        CustomerProfileRoute,
        InventoryLevelRoute,
        InventoryMovementsRoute,
        ManualOrderRoute,
        OrderByRefRoute,
        OrderStatusRoute,
        OrdersSearchRoute,
        PaymentUpdateRoute,
        RefundRoute,
        UpdateStatusRoute,
    },
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let notifier = Notifier::new(config.notifier.clone());
    let tracker = HttpDeliveryTracker::new(config.tracker.clone());
    let processor = HttpPaymentProcessor::new(config.processor.clone());
    let handlers = EventHandlers::new(32, notification_hooks(notifier, tracker.clone()));
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let srv = create_server_instance(config, db, producers, processor, tracker)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

/// The notification dispatcher: event hooks that relay to the notifier and register shipments with the carrier
/// tracker. Everything in here is best-effort; the hooks log their own failures and nothing propagates back into
/// the transitions that published the events.
fn notification_hooks(notifier: Notifier, tracker: HttpDeliveryTracker) -> EventHooks {
    let mut hooks = EventHooks::default();
    let n = notifier.clone();
    hooks.on_order_paid(move |event| {
        let n = n.clone();
        Box::pin(async move {
            n.order_paid(&event).await;
        })
    });
    let n = notifier.clone();
    hooks.on_order_shipped(move |event| {
        let n = n.clone();
        let t = tracker.clone();
        Box::pin(async move {
            if let (Some(carrier), Some(tracking_number)) =
                (event.order.carrier.as_deref(), event.order.tracking_number.as_deref())
            {
                if let Err(e) = t.register(carrier, tracking_number).await {
                    warn!("🚚️ Could not register {carrier}/{tracking_number} for tracking: {e}");
                }
            }
            n.order_shipped(&event).await;
        })
    });
    let n = notifier.clone();
    hooks.on_order_refunded(move |event| {
        let n = n.clone();
        Box::pin(async move {
            n.order_refunded(&event).await;
        })
    });
    hooks.on_low_stock(move |event| {
        let n = notifier.clone();
        Box::pin(async move {
            n.low_stock(&event).await;
        })
    });
    hooks
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    producers: EventProducers,
    processor: HttpPaymentProcessor,
    tracker: HttpDeliveryTracker,
) -> Result<actix_web::dev::Server, ServerError> {
    let host = config.host.clone();
    let port = config.port;
    // State that must be shared across workers is built once, outside the app factory
    let registry = web::Data::new(config.api_keys.clone());
    let limiter = web::Data::new(SlidingWindowLimiter::new(
        config.rate_limit_max,
        Duration::from_secs(config.rate_limit_window_secs),
    ));
    let srv = HttpServer::new(move || {
        let orders_api = OrderFlowApi::new(db.clone(), producers.clone(), config.low_stock_threshold);
        let checkout_api = CheckoutApi::new(db.clone(), config.checkout.clone());
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("sfg::access_log"))
            .app_data(web::Data::new(orders_api))
            .app_data(web::Data::new(checkout_api))
            .app_data(web::Data::new(config.checkout.clone()))
            .app_data(web::Data::new(processor.clone()))
            .app_data(web::Data::new(tracker.clone()))
            .app_data(web::Data::new(ServerOptions::from_config(&config)))
            .app_data(web::Data::new(WebhookOptions { secret: config.webhook_secret.clone() }))
            .app_data(web::Data::new(CronOptions {
                secret: config.cron_secret.clone(),
                order_expiry: config.order_expiry,
            }))
            .app_data(registry.clone())
            .app_data(limiter.clone());
        let shop_scope = web::scope("/shop")
            .service(CheckoutRoute::<SqliteDatabase, HttpPaymentProcessor>::new())
            .service(PaymentUpdateRoute::<SqliteDatabase>::new())
            .service(OrderStatusRoute::<SqliteDatabase>::new());
        let api_scope = web::scope("/api")
            .service(OrdersSearchRoute::<SqliteDatabase>::new())
            .service(OrderByRefRoute::<SqliteDatabase>::new())
            .service(UpdateStatusRoute::<SqliteDatabase>::new())
            .service(RefundRoute::<SqliteDatabase>::new())
            .service(ManualOrderRoute::<SqliteDatabase>::new())
            .service(InventoryLevelRoute::<SqliteDatabase>::new())
            .service(InventoryMovementsRoute::<SqliteDatabase>::new())
            .service(AdjustStockRoute::<SqliteDatabase>::new())
            .service(CustomerProfileRoute::<SqliteDatabase>::new());
        let cron_scope = web::scope("/cron")
            .service(CronExpireRoute::<SqliteDatabase>::new())
            .service(CronTrackDeliveriesRoute::<SqliteDatabase, HttpDeliveryTracker>::new());
        app.service(health).service(shop_scope).service(api_scope).service(cron_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}
