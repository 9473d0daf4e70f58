use actix_web::{http::StatusCode, test, web, web::ServiceConfig, App};
use chrono::Duration;
use fulfillment_engine::{
    db_types::OrderStatusType,
    events::EventProducers,
    traits::{CollaboratorError, OrderManagement, TrackingSnapshot},
    OrderFlowApi,
    SqliteDatabase,
};
use serde_json::json;

use super::{helpers::*, mocks::MockTracker};
use crate::{
    config::CronOptions,
    routes::{CronExpireRoute, CronTrackDeliveriesRoute, CRON_SECRET_HEADER},
};

fn configure(db: SqliteDatabase, tracker: MockTracker) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        base_app_data(&db, cfg);
        cfg.app_data(web::Data::new(tracker));
        cfg.service(
            web::scope("/cron")
                .service(CronExpireRoute::<SqliteDatabase>::new())
                .service(CronTrackDeliveriesRoute::<SqliteDatabase, MockTracker>::new()),
        );
    }
}

async fn cron_post(
    db: SqliteDatabase,
    tracker: MockTracker,
    path: &str,
    secret: Option<&str>,
) -> (StatusCode, String) {
    let app = test::init_service(App::new().configure(configure(db, tracker))).await;
    let mut req = test::TestRequest::post().uri(path);
    if let Some(secret) = secret {
        req = req.insert_header((CRON_SECRET_HEADER, secret));
    }
    let response = test::call_service(&app, req.to_request()).await;
    into_parts(response).await
}

#[actix_web::test]
async fn unconfigured_cron_secret_fails_closed() {
    let _ = env_logger::try_init().ok();
    let db = test_db("cron_unconfigured").await;
    let app = test::init_service(App::new().configure(move |cfg: &mut ServiceConfig| {
        base_app_data(&db, cfg);
        cfg.app_data(web::Data::new(CronOptions { secret: None, order_expiry: Duration::hours(24) }));
        cfg.service(web::scope("/cron").service(CronExpireRoute::<SqliteDatabase>::new()));
    }))
    .await;
    let req = test::TestRequest::post()
        .uri("/cron/expire")
        .insert_header((CRON_SECRET_HEADER, "anything"))
        .to_request();
    let response = test::call_service(&app, req).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[actix_web::test]
async fn wrong_or_missing_secret_is_rejected() {
    let _ = env_logger::try_init().ok();
    let db = test_db("cron_bad_secret").await;
    let (status, _) = cron_post(db.clone(), MockTracker::new(), "/cron/expire", Some("wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = cron_post(db, MockTracker::new(), "/cron/expire", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn expiry_sweep_honours_the_age_threshold() {
    let _ = env_logger::try_init().ok();
    let db = test_db("cron_expire").await;
    let stale = seed_pending_order(&db, 1).await;
    let fresh = seed_pending_order(&db, 1).await;
    age_order(&db, &stale.order_ref, 25).await;
    age_order(&db, &fresh.order_ref, 23).await;

    let (status, body) = cron_post(db.clone(), MockTracker::new(), "/cron/expire", Some(CRON_SECRET)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("1 orders expired"), "unexpected body: {body}");

    let stored = db.fetch_order_by_ref(&stale.order_ref).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatusType::Expired);
    let stored = db.fetch_order_by_ref(&fresh.order_ref).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatusType::Pending);
}

#[actix_web::test]
async fn delivery_sweep_reports_per_order_outcomes() {
    let _ = env_logger::try_init().ok();
    let db = test_db("cron_track").await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default(), 3);
    let delivered = seed_pending_order(&db, 1).await;
    let lost = seed_pending_order(&db, 1).await;
    for (order, tn) in [(&delivered, "TN-OK"), (&lost, "TN-FAIL")] {
        api.settle_order(&order.order_ref, None).await.unwrap();
        let request = fulfillment_engine::order_objects::ShipmentRequest {
            carrier: "DHL".to_string(),
            tracking_number: tn.to_string(),
            shipping_cost: None,
        };
        api.ship_order(&order.order_ref, &request).await.unwrap();
    }

    let mut tracker = MockTracker::new();
    tracker.expect_track().returning(|_, tracking_number| {
        if tracking_number == "TN-FAIL" {
            Err(CollaboratorError::Unreachable("tracking service timed out".to_string()))
        } else {
            Ok(TrackingSnapshot { status: "Delivered".to_string(), delivered: true, events: Vec::new() })
        }
    });

    let (status, body) = cron_post(db.clone(), tracker, "/cron/track_deliveries", Some(CRON_SECRET)).await;
    assert_eq!(status, StatusCode::OK);
    let report: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(report["checked"], 2);
    assert_eq!(report["delivered"].as_array().unwrap().len(), 1);
    assert_eq!(report["errors"].as_array().unwrap().len(), 1);

    let stored = db.fetch_order_by_ref(&delivered.order_ref).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatusType::Delivered);
    let stored = db.fetch_order_by_ref(&lost.order_ref).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatusType::Shipped);
}

#[actix_web::test]
async fn sweep_report_mentions_nothing_when_idle() {
    let _ = env_logger::try_init().ok();
    let db = test_db("cron_idle").await;
    let (status, body) = cron_post(db, MockTracker::new(), "/cron/track_deliveries", Some(CRON_SECRET)).await;
    assert_eq!(status, StatusCode::OK);
    let report: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(report["checked"], 0);
    assert_eq!(json!([]), report["errors"]);
}
