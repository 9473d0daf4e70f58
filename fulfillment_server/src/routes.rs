//! Request handler definitions
//!
//! Define each route and its handler here.
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will
//! cause the current worker to stop processing new requests. For this reason, any long, non-cpu-bound operation
//! (I/O, database calls, collaborator calls) must be awaited rather than blocked on; async handlers get executed
//! concurrently by worker threads and don't block execution.

use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use fulfillment_engine::{
    db_types::{OrderRef, OrderStatusType, Role, SettlementOutcome},
    order_objects::{CheckoutRequest, ManualOrderRequest, OrderQueryFilter, ShipmentRequest},
    traits::{DeliveryTracker, FulfillmentDatabase, OrderManagement, PaymentProcessor},
    CheckoutApi,
    CheckoutSettings,
    OrderFlowApi,
};
use log::*;
use sfg_common::{CoinAmount, COIN_SCALE};

use crate::{
    auth::StaffClaims,
    config::{CronOptions, ServerOptions, WebhookOptions},
    data_objects::{
        AdjustStockParams,
        CustomerProfileResponse,
        JsonResponse,
        OrderStatusResponse,
        PaymentUpdateParams,
        RefundParams,
        UpdateStatusParams,
    },
    errors::{AuthError, ServerError},
    helpers::get_remote_ip,
    rate_limit::SlidingWindowLimiter,
};

/// The fixed acknowledgement the payment processor expects. It retries delivery until it sees exactly this body,
/// so authorised webhook calls must always answer with it, whatever happened internally.
pub const WEBHOOK_ACK: &str = "OK";

pub const CRON_SECRET_HEADER: &str = "sfg-cron-secret";

// actix-web cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };

    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+ where requires [$($roles:expr),*])  => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>)
                    .wrap($crate::middleware::AclMiddlewareFactory::new(&[$($roles),+]));
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------  Checkout  ----------------------------------------------------
route!(checkout => Post "/checkout" impl FulfillmentDatabase, PaymentProcessor);
/// The public purchase endpoint.
///
/// Guarded by the sliding-window rate limiter before anything touches the store. A successful call answers with
/// the order reference, order number, payment address and quoted crypto amount; the customer pays, and the
/// processor's webhook does the rest asynchronously.
pub async fn checkout<BFul, PPay>(
    req: HttpRequest,
    body: web::Json<CheckoutRequest>,
    api: web::Data<CheckoutApi<BFul>>,
    processor: web::Data<PPay>,
    limiter: web::Data<SlidingWindowLimiter>,
    options: web::Data<ServerOptions>,
) -> Result<HttpResponse, ServerError>
where
    BFul: FulfillmentDatabase,
    PPay: PaymentProcessor,
{
    if let Some(ip) = get_remote_ip(&req, options.use_x_forwarded_for, options.use_forwarded) {
        if !limiter.check(ip) {
            return Err(ServerError::RateLimited);
        }
    }
    let receipt = api.place_order(body.into_inner(), processor.as_ref()).await?;
    Ok(HttpResponse::Ok().json(receipt))
}

//----------------------------------------------   Webhook  ----------------------------------------------------
route!(payment_update => Get "/payment_update" impl FulfillmentDatabase);
/// The payment processor's settlement webhook.
///
/// The secret is checked first and a missing configuration is fail-closed. Once the call is authorised, the
/// response is always [`WEBHOOK_ACK`] with HTTP 200 — the processor retries until it sees that sentinel, and a
/// retry storm over an internal hiccup helps nobody: the settlement flow is replay-safe, so the next delivery of
/// a dropped event is handled like any other duplicate.
pub async fn payment_update<BFul: FulfillmentDatabase>(
    query: web::Query<PaymentUpdateParams>,
    api: web::Data<OrderFlowApi<BFul>>,
    options: web::Data<WebhookOptions>,
) -> Result<HttpResponse, ServerError> {
    let params = query.into_inner();
    let Some(secret) = options.secret.as_ref() else {
        warn!("💸️ Webhook called but SFG_WEBHOOK_SECRET is not configured. Failing closed.");
        return Err(ServerError::FailClosed("The payment webhook is not configured".to_string()));
    };
    if params.secret.as_deref() != Some(secret.reveal().as_str()) {
        warn!("💸️ Webhook called with a missing or invalid secret. Rejecting.");
        return Err(ServerError::AuthenticationError(AuthError::InvalidSharedSecret));
    }
    if params.pending.as_deref() != Some("0") {
        debug!("💸️ Non-final payment notice for {}. Acknowledging without processing.", params.order_ref);
        return Ok(HttpResponse::Ok().body(WEBHOOK_ACK));
    }
    let order_ref = OrderRef(params.order_ref);
    let amount = params.amount.as_deref().and_then(parse_coin_amount);
    match api.settle_order(&order_ref, amount).await {
        Ok(SettlementOutcome::Settled(order)) => {
            info!("💸️ Order {} settled via webhook", order.order_ref);
        },
        Ok(SettlementOutcome::Duplicate(order)) => {
            debug!("💸️ Duplicate webhook delivery for {} ignored", order.order_ref);
        },
        Err(e) => {
            // The processor still gets its ack; whatever went wrong is ours to resolve
            warn!("💸️ Webhook processing failed for {order_ref}: {e}");
        },
    }
    Ok(HttpResponse::Ok().body(WEBHOOK_ACK))
}

/// Parses the processor's decimal coin amount (e.g. "0.5") into micro-coins. The value is informational, so a
/// value that does not parse is dropped rather than failing the webhook.
fn parse_coin_amount(s: &str) -> Option<CoinAmount> {
    s.trim().parse::<f64>().ok().map(|coins| CoinAmount::from((coins * COIN_SCALE as f64).round() as i64))
}

//----------------------------------------------  Status poll  ----------------------------------------------------
route!(order_status => Get "/order/{order_ref}/status" impl FulfillmentDatabase);
/// The customer's status poll. Unauthenticated by design, and therefore returns nothing but the status string:
/// no amounts, no addresses, no contact details.
pub async fn order_status<BFul: FulfillmentDatabase>(
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<BFul>>,
) -> Result<HttpResponse, ServerError> {
    let order_ref = OrderRef(path.into_inner());
    let order = api
        .db()
        .fetch_order_by_ref(&order_ref)
        .await
        .map_err(|e| ServerError::BackendError(e.to_string()))?
        .ok_or_else(|| ServerError::NoRecordFound("Order".to_string()))?;
    Ok(HttpResponse::Ok().json(OrderStatusResponse { status: order.status.to_string() }))
}

//----------------------------------------------   Orders (staff)  ----------------------------------------------------
route!(orders_search => Get "/orders" impl FulfillmentDatabase where requires [Role::ReadAll]);
pub async fn orders_search<BFul: FulfillmentDatabase>(
    query: web::Query<OrderQueryFilter>,
    api: web::Data<OrderFlowApi<BFul>>,
) -> Result<HttpResponse, ServerError> {
    let query = query.into_inner();
    debug!("💻️ GET order search for [{query}]");
    let orders = api.db().search_orders(query).await.map_err(|e| {
        debug!("💻️ Could not fetch orders. {e}");
        ServerError::BackendError(e.to_string())
    })?;
    Ok(HttpResponse::Ok().json(orders))
}

route!(order_by_ref => Get "/orders/{order_ref}" impl FulfillmentDatabase where requires [Role::ReadAll]);
pub async fn order_by_ref<BFul: FulfillmentDatabase>(
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<BFul>>,
) -> Result<HttpResponse, ServerError> {
    let order_ref = OrderRef(path.into_inner());
    debug!("💻️ GET order {order_ref}");
    let order = api
        .db()
        .fetch_order_by_ref(&order_ref)
        .await
        .map_err(|e| ServerError::BackendError(e.to_string()))?
        .ok_or_else(|| ServerError::NoRecordFound(format!("Order {order_ref}")))?;
    Ok(HttpResponse::Ok().json(order))
}

route!(update_status => Post "/orders/{order_ref}/status" impl FulfillmentDatabase where requires [Role::Write]);
/// The staff status-update endpoint. Drives the forward transitions (`Processing`, `Shipped`, `Delivered`) and
/// cancellation; refunds have their own endpoint since they carry an amount.
pub async fn update_status<BFul: FulfillmentDatabase>(
    claims: StaffClaims,
    path: web::Path<String>,
    body: web::Json<UpdateStatusParams>,
    api: web::Data<OrderFlowApi<BFul>>,
) -> Result<HttpResponse, ServerError> {
    let order_ref = OrderRef(path.into_inner());
    let params = body.into_inner();
    debug!("💻️ POST update status of {order_ref} to {} by {}", params.new_status, claims.label);
    let order = match params.new_status {
        OrderStatusType::Processing => api.mark_processing(&order_ref).await?,
        OrderStatusType::Shipped => {
            let request = ShipmentRequest {
                carrier: params.carrier.unwrap_or_default(),
                tracking_number: params.tracking_number.unwrap_or_default(),
                shipping_cost: params.shipping_cost,
            };
            api.ship_order(&order_ref, &request).await?
        },
        OrderStatusType::Delivered => api.mark_delivered(&order_ref).await?,
        OrderStatusType::Cancelled => api.cancel_order(&order_ref, &claims.label).await?,
        OrderStatusType::Refunded | OrderStatusType::PartiallyRefunded => {
            return Err(ServerError::ValidationError("Use the refund endpoint to refund an order".to_string()));
        },
        other => {
            return Err(ServerError::ValidationError(format!("Orders cannot be moved to {other} by hand")));
        },
    };
    Ok(HttpResponse::Ok().json(order))
}

route!(refund => Post "/orders/{order_ref}/refund" impl FulfillmentDatabase where requires [Role::Write]);
pub async fn refund<BFul: FulfillmentDatabase>(
    claims: StaffClaims,
    path: web::Path<String>,
    body: web::Json<RefundParams>,
    api: web::Data<OrderFlowApi<BFul>>,
) -> Result<HttpResponse, ServerError> {
    let order_ref = OrderRef(path.into_inner());
    let params = body.into_inner();
    debug!("💻️ POST refund {order_ref} by {}", claims.label);
    let order = api.refund_order(&order_ref, params.amount, params.reason.as_deref(), &claims.label).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(manual_order => Post "/manual_order" impl FulfillmentDatabase where requires [Role::Write]);
pub async fn manual_order<BFul: FulfillmentDatabase>(
    claims: StaffClaims,
    body: web::Json<ManualOrderRequest>,
    api: web::Data<OrderFlowApi<BFul>>,
    settings: web::Data<CheckoutSettings>,
) -> Result<HttpResponse, ServerError> {
    let request = body.into_inner();
    debug!("💻️ POST manual order by {}", claims.label);
    let order = api.create_manual_order(&request, &claims.label, settings.as_ref()).await?;
    Ok(HttpResponse::Ok().json(order))
}

//----------------------------------------------  Inventory (staff)  --------------------------------------------------
route!(inventory_level => Get "/inventory/{sku}" impl FulfillmentDatabase where requires [Role::ReadAll]);
pub async fn inventory_level<BFul: FulfillmentDatabase>(
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<BFul>>,
) -> Result<HttpResponse, ServerError> {
    let sku = path.into_inner();
    let level = api.inventory().level(&sku).await?;
    Ok(HttpResponse::Ok().json(level))
}

route!(inventory_movements => Get "/inventory/{sku}/movements" impl FulfillmentDatabase where requires [Role::ReadAll]);
pub async fn inventory_movements<BFul: FulfillmentDatabase>(
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<BFul>>,
) -> Result<HttpResponse, ServerError> {
    let sku = path.into_inner();
    let movements = api.inventory().movements(&sku).await?;
    Ok(HttpResponse::Ok().json(movements))
}

route!(adjust_stock => Post "/inventory/{sku}" impl FulfillmentDatabase where requires [Role::Write]);
/// Staff stock adjustment. A CAS conflict here surfaces as a 409 with "please retry" — unlike the webhook flow,
/// there is a human on the other end who can simply try again.
pub async fn adjust_stock<BFul: FulfillmentDatabase>(
    claims: StaffClaims,
    path: web::Path<String>,
    body: web::Json<AdjustStockParams>,
    api: web::Data<OrderFlowApi<BFul>>,
) -> Result<HttpResponse, ServerError> {
    let sku = path.into_inner();
    let params = body.into_inner();
    debug!("💻️ POST stock adjustment for {sku} ({}) by {}", params.adjustment, claims.label);
    let new_quantity =
        api.inventory().adjust(&sku, params.adjustment, &params.reason, &claims.label, None).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "sku": sku, "quantity": new_quantity })))
}

//----------------------------------------------  Customers (staff)  --------------------------------------------------
route!(customer_profile => Get "/customers/{email}" impl FulfillmentDatabase where requires [Role::ReadAll]);
pub async fn customer_profile<BFul: FulfillmentDatabase>(
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<BFul>>,
) -> Result<HttpResponse, ServerError> {
    let email = path.into_inner().trim().to_ascii_lowercase();
    let customer = api
        .db()
        .fetch_customer(&email)
        .await
        .map_err(|e| ServerError::BackendError(e.to_string()))?
        .ok_or_else(|| ServerError::NoRecordFound(format!("Customer {email}")))?;
    let lifetime_spend =
        api.db().spend_for_customer(&email).await.map_err(|e| ServerError::BackendError(e.to_string()))?;
    let profile = CustomerProfileResponse {
        email: customer.email,
        name: customer.name,
        phone: customer.phone,
        lifetime_spend,
    };
    Ok(HttpResponse::Ok().json(profile))
}

//----------------------------------------------      Cron      ----------------------------------------------------
fn check_cron_secret(req: &HttpRequest, options: &CronOptions) -> Result<(), ServerError> {
    let Some(secret) = options.secret.as_ref() else {
        warn!("🕰️ Cron endpoint called but SFG_CRON_SECRET is not configured. Failing closed.");
        return Err(ServerError::FailClosed("The cron endpoints are not configured".to_string()));
    };
    let provided = req.headers().get(CRON_SECRET_HEADER).and_then(|v| v.to_str().ok());
    if provided != Some(secret.reveal().as_str()) {
        warn!("🕰️ Cron endpoint called with a missing or invalid secret. Rejecting.");
        return Err(ServerError::AuthenticationError(AuthError::InvalidSharedSecret));
    }
    Ok(())
}

route!(cron_expire => Post "/expire" impl FulfillmentDatabase);
/// Sweeps stale pending orders to `Expired`. Invoked by the scheduler, authenticated by the shared secret.
pub async fn cron_expire<BFul: FulfillmentDatabase>(
    req: HttpRequest,
    api: web::Data<OrderFlowApi<BFul>>,
    options: web::Data<CronOptions>,
) -> Result<HttpResponse, ServerError> {
    check_cron_secret(&req, options.as_ref())?;
    let expired = api.expire_old_orders(options.order_expiry).await?;
    let refs = expired.iter().map(|o| o.order_ref.as_str()).collect::<Vec<_>>().join(", ");
    info!("🕰️ Expiry sweep complete. {} orders expired. [{refs}]", expired.len());
    Ok(HttpResponse::Ok().json(JsonResponse::success(format!("{} orders expired", expired.len()))))
}

route!(cron_track_deliveries => Post "/track_deliveries" impl FulfillmentDatabase, DeliveryTracker);
/// Polls the carrier tracker for every shipped order. Per-order failures are collected into the report rather
/// than aborting the sweep.
pub async fn cron_track_deliveries<BFul, TTrack>(
    req: HttpRequest,
    api: web::Data<OrderFlowApi<BFul>>,
    tracker: web::Data<TTrack>,
    options: web::Data<CronOptions>,
) -> Result<HttpResponse, ServerError>
where
    BFul: FulfillmentDatabase,
    TTrack: DeliveryTracker,
{
    check_cron_secret(&req, options.as_ref())?;
    let report = api.poll_deliveries(tracker.as_ref()).await?;
    Ok(HttpResponse::Ok().json(report))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn coin_amounts_parse_from_decimal_strings() {
        assert_eq!(parse_coin_amount("0.5"), Some(CoinAmount::from(500_000)));
        assert_eq!(parse_coin_amount(" 2 "), Some(CoinAmount::from(2_000_000)));
        assert_eq!(parse_coin_amount("0.000001"), Some(CoinAmount::from(1)));
        assert_eq!(parse_coin_amount("not-a-number"), None);
    }
}
