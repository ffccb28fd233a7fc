/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/
use crate::support::{config, context};
use driver_session_reflector::{
    common::types::*,
    outbound::external::{HttpRideApi, RideApi},
    tools::error::AppError,
};
use serde_json::json;
use std::time::Duration;
use wiremock::{
    matchers::{body_json, header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

fn dto(id: u64, status: &str) -> serde_json::Value {
    json!({
        "bookingId": id,
        "bookingCode": format!("NFX-{id}"),
        "status": status,
        "customerName": "Asha",
        "customerPhone": "+91-9000000001",
        "pickupAddress": "MG Road",
        "pickupLat": 12.97,
        "pickupLng": 77.59,
        "dropAddress": "Airport",
        "dropLat": 13.19,
        "dropLng": 77.70,
        "distance": 31.5,
        "fare": 640.0,
        "passengerCount": 2,
        "vehicleType": "sedan",
        "createdAt": "2024-03-01T09:15:30"
    })
}

fn api(server: &MockServer) -> anyhow::Result<HttpRideApi> {
    let config = config(&format!("{}/api", server.uri()), Duration::from_secs(10))?;
    Ok(HttpRideApi::new(&config, context())?)
}

#[tokio::test]
async fn pending_rides_are_filtered_by_vehicle_type_with_bearer() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/rides/pending"))
        .and(query_param("vehicleType", "sedan"))
        .and(header("authorization", "Bearer jwt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([dto(1, "PENDING"), dto(2, "BROADCASTED")])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let rides = api(&server)?
        .pending_rides(&VehicleType("sedan".to_string()))
        .await?;

    assert_eq!(rides.len(), 2);
    assert_eq!(rides[0].booking_id, BookingId::from("1"));
    assert_eq!(rides[1].status, RideStatus::PENDING);
    assert_eq!(rides[0].passenger_count, 2);
    assert_eq!(
        rides[0].dropoff.location,
        Some(Point {
            lat: Latitude(13.19),
            lon: Longitude(77.70)
        })
    );
    Ok(())
}

#[tokio::test]
async fn no_content_means_no_active_ride() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/rides/active"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    assert_eq!(api(&server)?.active_ride().await?, None);
    Ok(())
}

#[tokio::test]
async fn active_ride_is_decoded() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/rides/active"))
        .respond_with(ResponseTemplate::new(200).set_body_json(dto(5, "IN_PROGRESS")))
        .mount(&server)
        .await;

    let active = api(&server)?.active_ride().await?;
    assert_eq!(active.map(|ride| ride.status), Some(RideStatus::ONGOING));
    Ok(())
}

#[tokio::test]
async fn unauthorized_is_an_auth_failure() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/rides/driver/history"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Token expired"})))
        .mount(&server)
        .await;

    let result = api(&server)?.history().await;
    assert_eq!(result, Err(AppError::AuthFailure("Token expired".to_string())));
    Ok(())
}

#[tokio::test]
async fn rejected_accept_is_a_conflict() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/rides/7/accept"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"message": "Ride already accepted by another driver"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/rides/8/accept"))
        .respond_with(ResponseTemplate::new(409))
        .mount(&server)
        .await;

    let api = api(&server)?;
    assert_eq!(
        api.accept(&BookingId::from("7")).await,
        Err(AppError::ConflictFailure(
            "Ride already accepted by another driver".to_string()
        ))
    );
    assert!(matches!(
        api.accept(&BookingId::from("8")).await,
        Err(AppError::ConflictFailure(_))
    ));
    Ok(())
}

#[tokio::test]
async fn bad_request_elsewhere_is_rejected_not_conflict() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/rides/7/start"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"message": "Ride is not in ARRIVED state"})))
        .mount(&server)
        .await;

    assert_eq!(
        api(&server)?.start(&BookingId::from("7")).await,
        Err(AppError::RequestRejected(
            400,
            "Ride is not in ARRIVED state".to_string()
        ))
    );
    Ok(())
}

#[tokio::test]
async fn server_errors_are_network_failures() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/rides/7/arrived"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let result = api(&server)?.arrived(&BookingId::from("7")).await;
    assert!(matches!(result, Err(ref err) if err.is_retryable()));
    Ok(())
}

#[tokio::test]
async fn complete_sends_final_location() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/rides/7/complete"))
        .and(query_param("finalLat", "12.97"))
        .and(query_param("finalLng", "77.59"))
        .respond_with(ResponseTemplate::new(200).set_body_json(dto(7, "COMPLETED")))
        .expect(1)
        .mount(&server)
        .await;

    let final_location = Point {
        lat: Latitude(12.97),
        lon: Longitude(77.59),
    };
    let completed = api(&server)?
        .complete(&BookingId::from("7"), Some(&final_location))
        .await?;
    assert_eq!(completed.status, RideStatus::COMPLETED);
    Ok(())
}

#[tokio::test]
async fn cancel_sends_reason_body() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/rides/7/cancel"))
        .and(body_json(json!({"reason": "Customer unreachable"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(dto(7, "CANCELLED_BY_DRIVER")))
        .expect(1)
        .mount(&server)
        .await;

    let cancelled = api(&server)?
        .cancel(&BookingId::from("7"), "Customer unreachable")
        .await?;
    assert_eq!(cancelled.status, RideStatus::CANCELLED);
    Ok(())
}

#[tokio::test]
async fn malformed_body_is_a_deserialization_error() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/rides/driver/history"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    assert!(matches!(
        api(&server)?.history().await,
        Err(AppError::DeserializationError(_))
    ));
    Ok(())
}

#[tokio::test]
async fn logged_out_context_sends_nothing() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let context = context();
    let config = config(&format!("{}/api", server.uri()), Duration::from_secs(10))?;
    let api = HttpRideApi::new(&config, context.to_owned())?;
    context.invalidate();

    assert!(matches!(
        api.history().await,
        Err(AppError::AuthFailure(_))
    ));
    Ok(())
}
