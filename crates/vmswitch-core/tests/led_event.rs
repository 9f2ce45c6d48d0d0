//! S4: an unsolicited `KBD_LEDS_UPDATE` event always updates the cached LED
//! state, but only reaches the physical keyboard when its endpoint is the
//! one currently focused.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use vmswitch_core::endpoint::attach;
use vmswitch_core::{EndpointContext, LedSet, Registry};
use vmswitch_test_support::{Call, MockGuest, RecordingConsoleBackend, RecordingConsoleFrontend};

#[tokio::test]
async fn led_event_updates_cache_always_but_backend_only_when_focused() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("slot-5");
    let mut guest = MockGuest::bind(&path).await.unwrap();

    let backend_calls = Arc::new(Mutex::new(Vec::new()));
    let backend = Arc::new(RecordingConsoleBackend { calls: backend_calls.clone() });
    let frontend = Arc::new(RecordingConsoleFrontend { calls: Arc::new(Mutex::new(Vec::new())) });

    let registry = Registry::new(backend.clone(), frontend);
    let context = Arc::new(EndpointContext::new(registry.focus_cell(), backend, None));
    attach(path.clone(), registry.clone(), context).await.unwrap();

    for (execute, value) in [
        ("qmp_capabilities", serde_json::json!({})),
        ("query-xen-status", serde_json::json!({"domain": 9})),
        ("query-process-info", serde_json::json!({"pid": 55})),
        ("query-kbd-leds", serde_json::json!({"caps": false, "num": false, "scroll": false})),
    ] {
        let req = guest.next_request().await.unwrap();
        assert_eq!(req.execute, execute);
        guest.reply(req.id.unwrap(), value);
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Not focused yet (focus is still on the host): an LED event updates the
    // cache but must not reach the backend.
    backend_calls.lock().unwrap().clear();
    guest.emit_event("KBD_LEDS_UPDATE", serde_json::json!({"caps": true, "num": false, "scroll": false}));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(backend_calls.lock().unwrap().is_empty());
    let cache = registry.cache_for(5).await.unwrap();
    assert!(cache.led_state.caps);

    // Focus the guest. The transition itself applies the cached LED state.
    registry.focus_advance(vmswitch_event::FocusDirection::Next).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(registry.focused_slot().await, 5);
    assert_eq!(
        *backend_calls.lock().unwrap().last().unwrap(),
        Call::SetLeds(LedSet { caps: true, num: false, scroll: false })
    );

    // Now focused: a fresh LED event must reach the backend immediately.
    backend_calls.lock().unwrap().clear();
    guest.emit_event("KBD_LEDS_UPDATE", serde_json::json!({"caps": false, "num": true, "scroll": false}));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(
        *backend_calls.lock().unwrap(),
        vec![Call::SetLeds(LedSet { caps: false, num: true, scroll: false })]
    );
}
