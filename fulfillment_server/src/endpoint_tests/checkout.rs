use actix_web::{http::StatusCode, test, web, web::ServiceConfig, App};
use fulfillment_engine::SqliteDatabase;
use serde_json::json;

use super::{helpers::*, mocks::*};
use crate::{auth::API_KEY_HEADER, rate_limit::SlidingWindowLimiter, routes::CheckoutRoute};

fn checkout_body(quantity: u32) -> serde_json::Value {
    json!({
        "email": "alice@example.com",
        "quantity": quantity,
        "currency": "BTC",
        "address": {
            "name": "Alice Tester",
            "line1": "12 Long Street",
            "city": "Cape Town",
            "postcode": "8001",
            "country": "ZA"
        }
    })
}

fn configure(db: SqliteDatabase, processor: MockProcessor) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        base_app_data(&db, cfg);
        cfg.app_data(web::Data::new(processor));
        cfg.service(web::scope("/shop").service(CheckoutRoute::<SqliteDatabase, MockProcessor>::new()));
    }
}

#[actix_web::test]
async fn checkout_returns_payment_details() {
    let _ = env_logger::try_init().ok();
    let db = test_db("co_ok").await;
    let mut processor = MockProcessor::new();
    processor.expect_request_payment().returning(|_, _, _| Ok(standard_quote()));

    let (status, body) = post_request(None, "/shop/checkout", checkout_body(2), configure(db, processor)).await;
    assert_eq!(status, StatusCode::OK, "body: {body}");
    let receipt: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(receipt["fiat_total"], 24);
    assert_eq!(receipt["payment_address"], "bc1qmockaddress");
    assert_eq!(receipt["currency"], "BTC");
    assert_eq!(receipt["order_number"].as_str().unwrap().len(), 5);
}

#[actix_web::test]
async fn invalid_body_is_a_400_with_a_description() {
    let _ = env_logger::try_init().ok();
    let db = test_db("co_invalid").await;
    let mut processor = MockProcessor::new();
    processor.expect_request_payment().never();

    let mut body = checkout_body(2);
    body["email"] = json!("not-an-email");
    let (status, body) = post_request(None, "/shop/checkout", body, configure(db, processor)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("email"), "unexpected body: {body}");
}

#[actix_web::test]
async fn out_of_stock_is_a_conflict() {
    let _ = env_logger::try_init().ok();
    let db = test_db("co_stock").await;
    let mut processor = MockProcessor::new();
    processor.expect_request_payment().never();

    let (status, _) = post_request(None, "/shop/checkout", checkout_body(11), configure(db, processor)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[actix_web::test]
async fn rate_limiter_kicks_in_per_source() {
    let _ = env_logger::try_init().ok();
    let db = test_db("co_rate").await;
    let mut processor = MockProcessor::new();
    processor.expect_request_payment().returning(|_, _, _| Ok(standard_quote()));

    let app = test::init_service(App::new().configure(move |cfg: &mut ServiceConfig| {
        base_app_data(&db, cfg);
        cfg.app_data(web::Data::new(SlidingWindowLimiter::new(2, std::time::Duration::from_secs(60))));
        cfg.app_data(web::Data::new(processor));
        cfg.service(web::scope("/shop").service(CheckoutRoute::<SqliteDatabase, MockProcessor>::new()));
    }))
    .await;

    let peer = "10.1.2.3:4000".parse().unwrap();
    for expected in [StatusCode::OK, StatusCode::OK, StatusCode::TOO_MANY_REQUESTS] {
        let req = test::TestRequest::post()
            .uri("/shop/checkout")
            .peer_addr(peer)
            .set_json(checkout_body(1))
            .to_request();
        let response = test::call_service(&app, req).await;
        assert_eq!(response.status(), expected);
    }
}

#[actix_web::test]
async fn checkout_needs_no_api_key() {
    let _ = env_logger::try_init().ok();
    let db = test_db("co_public").await;
    let mut processor = MockProcessor::new();
    processor.expect_request_payment().returning(|_, _, _| Ok(standard_quote()));

    // A stray API key header on the public route is simply ignored
    let app = test::init_service(App::new().configure(configure(db, processor))).await;
    let req = test::TestRequest::post()
        .uri("/shop/checkout")
        .insert_header((API_KEY_HEADER, "not-a-real-key"))
        .set_json(checkout_body(1))
        .to_request();
    let response = test::call_service(&app, req).await;
    assert_eq!(response.status(), StatusCode::OK);
}
