//! Workspace-root end-to-end scenarios driving the full `Runtime`: discovery
//! against a real directory, focus cycling across attached guests, and LED
//! propagation, exactly as a deployed binary would see them (S1, S2, S4, S6).

use std::time::Duration;

use vmswitch::build_adapters;
use vmswitch::config::AdapterChoice;
use vmswitch_core::{Runtime, RuntimeConfig};
use vmswitch_event::FocusDirection;
use vmswitch_test_support::MockGuest;

async fn handshake(guest: &mut MockGuest, domain: i64, pid: i64) {
    for (execute, value) in [
        ("qmp_capabilities", serde_json::json!({})),
        ("query-xen-status", serde_json::json!({"domain": domain})),
        ("query-process-info", serde_json::json!({"pid": pid})),
        ("query-kbd-leds", serde_json::json!({"caps": false, "num": false, "scroll": false})),
    ] {
        let req = guest.next_request().await.expect("handshake request");
        assert_eq!(req.execute, execute);
        guest.reply(req.id.unwrap(), value);
    }
}

#[tokio::test]
async fn runtime_discovers_pre_existing_sockets_and_cycles_focus_across_them() {
    let dir = tempfile::tempdir().unwrap();

    // S6: two candidates already present before the runtime starts, so the
    // initial scan (not the watch) must attach both.
    let mut guest_a = MockGuest::bind(dir.path().join("slot-1")).await.unwrap();
    let mut guest_b = MockGuest::bind(dir.path().join("slot-2")).await.unwrap();

    let adapters = build_adapters(AdapterChoice::Null, AdapterChoice::Null, AdapterChoice::Null);
    let config = RuntimeConfig { qmp_dir: dir.path().to_path_buf(), response_timeout: None };
    let runtime = Runtime::start(config, adapters).await.unwrap();

    handshake(&mut guest_a, 11, 111).await;
    handshake(&mut guest_b, 22, 222).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(runtime.registry.slot_ids().await, vec![0, 1, 2]);
    assert_eq!(runtime.registry.focused_slot().await, 0);

    // Auto-reply to whatever the upcoming kbd-reset/transition traffic sends.
    tokio::spawn(async move {
        while let Some(req) = guest_a.next_request().await {
            guest_a.reply(req.id.unwrap(), serde_json::json!({}));
        }
    });
    tokio::spawn(async move {
        while let Some(req) = guest_b.next_request().await {
            guest_b.reply(req.id.unwrap(), serde_json::json!({}));
        }
    });

    runtime.registry.focus_advance(FocusDirection::Next).await;
    assert_eq!(runtime.registry.focused_slot().await, 1);

    runtime.registry.focus_advance(FocusDirection::Next).await;
    assert_eq!(runtime.registry.focused_slot().await, 2);

    // Wraps back to the host (S2).
    runtime.registry.focus_advance(FocusDirection::Next).await;
    assert_eq!(runtime.registry.focused_slot().await, 0);

    runtime.shutdown().await;
}

#[tokio::test]
async fn runtime_attaches_a_socket_created_after_startup() {
    let dir = tempfile::tempdir().unwrap();

    let adapters = build_adapters(AdapterChoice::Null, AdapterChoice::Null, AdapterChoice::Null);
    let config = RuntimeConfig { qmp_dir: dir.path().to_path_buf(), response_timeout: None };
    let runtime = Runtime::start(config, adapters).await.unwrap();

    assert_eq!(runtime.registry.slot_ids().await, vec![0]);

    // S6 continued: the watch half picks up a socket created post-startup.
    let mut guest = MockGuest::bind(dir.path().join("slot-7")).await.unwrap();
    handshake(&mut guest, 70, 700).await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(runtime.registry.slot_ids().await, vec![0, 7]);

    runtime.shutdown().await;
}
