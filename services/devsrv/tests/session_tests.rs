//! End-to-end session behavior against a simulated device
//!
//! Each test drives one side of an in-memory pipe as the device while a real
//! `Session` runs on the other side with the in-memory store and queue.

#![allow(clippy::disallowed_methods)]

mod common;

use common::{wait_until, TestGateway, MAC};
use devsrv::protocol::frame::frame_type;
use devsrv::protocol::{ReportAck, Request};
use devsrv::session::SessionEnd;
use devsrv::store::{DeviceStore, DeviceUpdate};
use tokio::io::AsyncWriteExt;

// ============================================================================
// Handshake
// ============================================================================

#[tokio::test]
async fn test_malformed_identifier_rejected() {
    let gateway = TestGateway::new();
    let (mut device, session) = gateway.connect(b"abc").await;

    assert_eq!(session.await.unwrap(), SessionEnd::Rejected);
    assert!(gateway.store.is_empty());
    assert!(gateway.registry.lookup(MAC).is_none());
    assert!(device.drain().await.is_empty());
}

#[tokio::test]
async fn test_new_device_gets_record_and_link_test() {
    let gateway = TestGateway::new();
    let (mut device, session) = gateway.connect(MAC.as_bytes()).await;

    device.expect(&Request::link_test()).await;
    device.respond(frame_type::LINK, &[0x00]).await;

    wait_until(|| gateway.store.get(MAC).is_some()).await;
    let record = gateway.store.get(MAC).unwrap();
    assert!(record.online);
    assert_eq!(record.ip, "10.0.0.9");
    assert_eq!(record.power, 0);

    gateway.shutdown.cancel();
    assert_eq!(session.await.unwrap(), SessionEnd::Shutdown);
    assert!(gateway.registry.lookup(MAC).is_none());
}

#[tokio::test]
async fn test_known_device_marked_online() {
    let gateway = TestGateway::new();
    gateway.known_device(MAC).await;
    gateway
        .store
        .apply(MAC, DeviceUpdate::Online(false))
        .await
        .unwrap();

    let (_device, session) = gateway.connect(MAC.as_bytes()).await;
    wait_until(|| gateway.store.get(MAC).is_some_and(|r| r.online)).await;

    gateway.shutdown.cancel();
    assert_eq!(session.await.unwrap(), SessionEnd::Shutdown);
}

// ============================================================================
// Commands
// ============================================================================

#[tokio::test]
async fn test_heater_on_sets_power_and_posts_success() {
    let gateway = TestGateway::new();
    gateway.known_device(MAC).await;
    let (mut device, session) = gateway.connect(MAC.as_bytes()).await;

    gateway.push(MAC, r#"{"id":"h1","type":1,"time":5}"#).await;
    device.expect(&Request::heater_on(5)).await;
    device.respond(frame_type::HEATER, &[0, 1, 5, 0]).await;

    let result = gateway.wait_result("h1").await;
    assert_eq!(result.code, 0, "{}", result.msg);
    assert_eq!(gateway.store.get(MAC).unwrap().power, 5);

    gateway.shutdown.cancel();
    session.await.unwrap();
}

#[tokio::test]
async fn test_out_of_range_durations_never_reach_device() {
    let gateway = TestGateway::new();
    gateway.known_device(MAC).await;
    let (mut device, session) = gateway.connect(MAC.as_bytes()).await;

    gateway.push(MAC, r#"{"id":"h0","type":1,"time":0}"#).await;
    gateway.push(MAC, r#"{"id":"h9","type":1,"time":9}"#).await;
    gateway.push(MAC, r#"{"id":"hb","type":2}"#).await;

    // The first frame on the wire is the heartbeat
    device.expect(&Request::heartbeat()).await;
    device.respond(frame_type::LINK, &[0x00]).await;

    assert_eq!(gateway.wait_result("h0").await.code, 1);
    assert_eq!(gateway.wait_result("h9").await.code, 1);
    assert_eq!(gateway.wait_result("hb").await.code, 0);
    assert!(!gateway
        .store
        .updates_for(MAC)
        .iter()
        .any(|u| matches!(u, DeviceUpdate::Power(_))));

    gateway.shutdown.cancel();
    session.await.unwrap();
}

#[tokio::test]
async fn test_unknown_type_posts_failure() {
    let gateway = TestGateway::new();
    gateway.known_device(MAC).await;
    let (_device, session) = gateway.connect(MAC.as_bytes()).await;

    gateway.push(MAC, r#"{"id":"u3","type":3}"#).await;
    let result = gateway.wait_result("u3").await;
    assert_eq!(result.code, 1);

    gateway.shutdown.cancel();
    session.await.unwrap();
}

#[tokio::test]
async fn test_climate_read_updates_record() {
    let gateway = TestGateway::new();
    gateway.known_device(MAC).await;
    let (mut device, session) = gateway.connect(MAC.as_bytes()).await;

    gateway.push(MAC, r#"{"id":"t1","type":4}"#).await;
    device.expect(&Request::read_climate()).await;
    // -20.0 degrees, 60.0 % humidity
    device
        .respond(frame_type::CLIMATE, &[0x00, 0x80, 0xC8, 0x02, 0x58])
        .await;

    assert_eq!(gateway.wait_result("t1").await.code, 0);
    let record = gateway.store.get(MAC).unwrap();
    assert_eq!(record.temperature, -20.0);
    assert_eq!(record.humidity, 60.0);

    gateway.shutdown.cancel();
    session.await.unwrap();
}

#[tokio::test]
async fn test_status_check_empty_cartridge() {
    let gateway = TestGateway::new();
    gateway.known_device(MAC).await;
    gateway
        .store
        .apply(MAC, DeviceUpdate::Dosage(0.5))
        .await
        .unwrap();
    let (mut device, session) = gateway.connect(MAC.as_bytes()).await;

    gateway.push(MAC, r#"{"id":"s1","type":6}"#).await;
    device.expect(&Request::status_check()).await;
    device.respond(frame_type::HEATER, &[3, 0, 0, 0]).await;

    let result = gateway.wait_result("s1").await;
    assert_eq!(result.code, 1);
    assert_eq!(gateway.store.get(MAC).unwrap().dosage, 0.0);

    gateway.shutdown.cancel();
    session.await.unwrap();
}

#[tokio::test]
async fn test_delete_closes_session() {
    let gateway = TestGateway::new();
    gateway.known_device(MAC).await;
    let (mut device, session) = gateway.connect(MAC.as_bytes()).await;
    gateway.wait_registered(MAC).await;

    gateway.push(MAC, r#"{"id":"d1","type":-1}"#).await;

    assert_eq!(session.await.unwrap(), SessionEnd::Deleted);
    assert!(gateway.store.get(MAC).is_none());
    assert!(gateway.registry.lookup(MAC).is_none());
    assert_eq!(gateway.queue.results("d1")[0].code, 0);
    assert!(device.drain().await.is_empty());
}

// ============================================================================
// Reports
// ============================================================================

#[tokio::test]
async fn test_report_during_command_interrupts_without_resend() {
    let gateway = TestGateway::new();
    gateway.known_device(MAC).await;
    let (mut device, session) = gateway.connect(MAC.as_bytes()).await;

    gateway.push(MAC, r#"{"id":"off","type":0}"#).await;
    device.expect(&Request::heater_off()).await;

    // Key 3 pressed instead of answering
    device.report(2, 3).await;
    device.expect(&Request::report_ack(ReportAck::Ok)).await;

    let result = gateway.wait_result("off").await;
    assert_eq!(result.code, 1);
    assert_eq!(result.msg, "interrupted by device report");

    let powers: Vec<_> = gateway
        .store
        .updates_for(MAC)
        .into_iter()
        .filter(|u| matches!(u, DeviceUpdate::Power(_)))
        .collect();
    assert_eq!(powers, vec![DeviceUpdate::Power(6)]);

    // Nothing was resent: the next frame is the next command
    gateway.push(MAC, r#"{"id":"hb","type":2}"#).await;
    device.expect(&Request::heartbeat()).await;
    device.respond(frame_type::LINK, &[0x00]).await;
    assert_eq!(gateway.wait_result("hb").await.code, 0);

    gateway.shutdown.cancel();
    session.await.unwrap();
}

#[tokio::test]
async fn test_idle_potion_replaced_triggers_level_read() {
    let gateway = TestGateway::new();
    gateway.known_device(MAC).await;
    let (mut device, session) = gateway.connect(MAC.as_bytes()).await;
    gateway.wait_registered(MAC).await;

    device.report(4, 0).await;
    device.expect(&Request::report_ack(ReportAck::Ok)).await;
    device.expect(&Request::read_potion()).await;
    // 25 minutes consumed of 150
    device.respond(frame_type::POTION, &[0, 25, 0]).await;

    wait_until(|| gateway.store.get(MAC).is_some_and(|r| r.dosage == 0.83)).await;

    gateway.shutdown.cancel();
    session.await.unwrap();
}

#[tokio::test]
async fn test_idle_report_with_bad_checksum() {
    let gateway = TestGateway::new();
    gateway.known_device(MAC).await;
    let (mut device, session) = gateway.connect(MAC.as_bytes()).await;
    gateway.wait_registered(MAC).await;

    device
        .stream
        .write_all(&[0xF5, 0xAA, 0x08, 0x02, 0x01, 0x00])
        .await
        .unwrap();
    device
        .expect(&Request::report_ack(ReportAck::ChecksumError))
        .await;
    assert!(!gateway
        .store
        .updates_for(MAC)
        .iter()
        .any(|u| matches!(u, DeviceUpdate::Power(_))));

    gateway.shutdown.cancel();
    session.await.unwrap();
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_unresponsive_new_device_goes_offline_once() {
    let gateway = TestGateway::new();
    let (mut device, session) = gateway.connect(MAC.as_bytes()).await;

    for _ in 0..5 {
        device.expect(&Request::link_test()).await;
    }

    assert_eq!(session.await.unwrap(), SessionEnd::LinkLost);
    assert_eq!(
        gateway.store.updates_for(MAC),
        vec![DeviceUpdate::Online(false)]
    );
    assert!(!gateway.store.get(MAC).unwrap().online);
    assert!(gateway.registry.lookup(MAC).is_none());
}

#[tokio::test]
async fn test_reconnect_replaces_previous_session() {
    let gateway = TestGateway::new();
    gateway.known_device(MAC).await;

    let (_first_device, first) = gateway.connect(MAC.as_bytes()).await;
    gateway.wait_registered(MAC).await;
    let first_id = gateway.registry.lookup(MAC).unwrap().id();

    let (_second_device, second) = gateway.connect(MAC.as_bytes()).await;
    assert_eq!(first.await.unwrap(), SessionEnd::Replaced);

    wait_until(|| {
        gateway
            .registry
            .lookup(MAC)
            .is_some_and(|h| h.id() != first_id)
    })
    .await;
    assert!(!gateway
        .store
        .updates_for(MAC)
        .contains(&DeviceUpdate::Online(false)));

    gateway.shutdown.cancel();
    assert_eq!(second.await.unwrap(), SessionEnd::Shutdown);
    assert!(gateway.registry.lookup(MAC).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_offline_flag_ends_idle_session() {
    let gateway = TestGateway::new();
    gateway.known_device(MAC).await;
    let (_device, session) = gateway.connect(MAC.as_bytes()).await;
    gateway.wait_registered(MAC).await;
    wait_until(|| {
        gateway
            .store
            .updates_for(MAC)
            .contains(&DeviceUpdate::Online(true))
    })
    .await;

    gateway
        .store
        .apply(MAC, DeviceUpdate::Online(false))
        .await
        .unwrap();

    assert_eq!(session.await.unwrap(), SessionEnd::Offline);
    assert!(gateway.registry.lookup(MAC).is_none());
}

#[tokio::test]
async fn test_device_disconnect_marks_offline() {
    let gateway = TestGateway::new();
    gateway.known_device(MAC).await;
    let (device, session) = gateway.connect(MAC.as_bytes()).await;
    gateway.wait_registered(MAC).await;

    drop(device);

    assert_eq!(session.await.unwrap(), SessionEnd::LinkLost);
    assert!(!gateway.store.get(MAC).unwrap().online);
}
