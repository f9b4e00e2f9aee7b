//! Error handling and edge case tests.

use placemap::{
    DocumentStore, FixedLocator, GatewayError, IdentityResolver, InteractionController,
    LiveSession, MapConfig, PlaceError, PlaceForm, PlaceKey, PlaceRecord, PlaceStore, Position,
    Result, StaticGeocoder, StoreConfig, SubscriptionConfig, SubscriptionHandle, UiCommand,
    UiEvent,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Store wrapper whose removes and subscribes can be made to fail.
struct FlakyStore {
    inner: DocumentStore,
    fail_remove: AtomicBool,
    fail_subscribe: AtomicBool,
}

impl FlakyStore {
    fn new() -> Self {
        Self {
            inner: DocumentStore::in_memory(),
            fail_remove: AtomicBool::new(false),
            fail_subscribe: AtomicBool::new(false),
        }
    }

    fn outage() -> PlaceError {
        PlaceError::Io(std::io::Error::new(std::io::ErrorKind::Other, "backend offline"))
    }
}

impl PlaceStore for FlakyStore {
    fn read_all(&self) -> Result<Vec<PlaceRecord>> {
        self.inner.read_all()
    }

    fn subscribe(&self, config: SubscriptionConfig) -> Result<SubscriptionHandle> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(Self::outage());
        }
        self.inner.subscribe(config)
    }

    fn put(&self, key: &PlaceKey, record: PlaceRecord) -> Result<()> {
        self.inner.put(key, record)
    }

    fn remove(&self, key: &PlaceKey) -> Result<()> {
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(Self::outage());
        }
        self.inner.remove(key)
    }
}

fn form(title: &str, lat: &str, lng: &str) -> PlaceForm {
    PlaceForm {
        title: title.into(),
        content: "details".into(),
        lat: lat.into(),
        lng: lng.into(),
        ..Default::default()
    }
}

fn key(lat: &str, lng: &str) -> PlaceKey {
    PlaceKey::from_position(&Position::parse(lat, lng).unwrap())
}

fn controller(store: Arc<dyn PlaceStore>, config: MapConfig) -> InteractionController {
    InteractionController::new(
        store,
        Arc::new(StaticGeocoder::new()),
        Arc::new(FixedLocator(Err(GatewayError::Unavailable("timeout".into())))),
        config,
    )
}

// --- Validation ---

#[test]
fn test_invalid_forms_never_write() {
    let store = Arc::new(DocumentStore::in_memory());
    let resolver = IdentityResolver::new(store.clone(), Arc::new(StaticGeocoder::new()));

    let mut cases = vec![
        form("", "1", "1"),
        form("Title", "abc", "1"),
        form("Title", "1", "NaN"),
        form("Title", "91", "0"),
        form("Title", "0", "-180.5"),
        form("Title", "", ""),
    ];
    let mut unknown = form("Title", "", "");
    unknown.address = "Nowhere Lane".into();
    cases.push(unknown);

    for input in cases {
        let err = resolver.apply_edit(&input, None).unwrap_err();
        assert!(err.is_validation(), "{:?} should be a validation error", err);
    }
    assert!(store.is_empty());
    assert_eq!(store.revision(), placemap::Revision(0));
}

#[test]
fn test_out_of_range_coordinate_names_field() {
    match Position::parse("45", "200") {
        Err(PlaceError::InvalidCoordinate { field, value }) => {
            assert_eq!(field, "lng");
            assert_eq!(value, "200");
        }
        other => panic!("expected InvalidCoordinate, got {:?}", other),
    }
}

#[test]
fn test_put_rejects_mismatched_key() {
    let store = DocumentStore::in_memory();
    let record = PlaceRecord::new("A", "B", None, Position::new(1.0, 1.0).unwrap());

    let result = store.put(&key("2", "2"), record);
    assert!(matches!(result, Err(PlaceError::InconsistentKey { .. })));
    assert!(store.is_empty());
}

#[test]
fn test_remove_absent_key_is_silent() {
    let store = DocumentStore::in_memory();
    store.remove(&key("7", "7")).unwrap();
    assert_eq!(store.revision(), placemap::Revision(0));
}

// --- Partial Moves ---

#[test]
fn test_failed_remove_leaves_orphan() {
    let store = Arc::new(FlakyStore::new());
    let mut controller = controller(store.clone(), MapConfig::default());

    controller.dispatch(UiEvent::Submitted(form("Shed", "1", "1")));
    store.fail_remove.store(true, Ordering::SeqCst);

    let commands = controller.dispatch(UiEvent::Submitted(form("Shed", "2", "2")));
    assert!(matches!(
        &commands[..],
        [UiCommand::Alert(msg)] if msg.contains("could not be removed")
    ));

    // Both copies exist; the new one is selected
    assert_eq!(store.inner.len(), 2);
    assert_eq!(controller.selection().key(), Some(&key("2", "2")));
}

#[test]
fn test_failed_remove_request_keeps_selection() {
    let store = Arc::new(FlakyStore::new());
    let mut controller = controller(store.clone(), MapConfig::default());

    controller.dispatch(UiEvent::Submitted(form("Shed", "1", "1")));
    store.fail_remove.store(true, Ordering::SeqCst);

    let commands = controller.dispatch(UiEvent::RemoveRequested);
    assert!(matches!(&commands[..], [UiCommand::Alert(_)]));
    assert_eq!(controller.selection().key(), Some(&key("1", "1")));
    assert_eq!(store.inner.len(), 1);
}

// --- Subscription Loss ---

#[test]
fn test_session_alerts_then_recovers_after_lost_subscription() {
    let store = Arc::new(FlakyStore::new());
    let config = MapConfig {
        subscription: SubscriptionConfig { buffer_size: 1 },
        resubscribe_attempts: 2,
        resubscribe_backoff_ms: 1,
        ..Default::default()
    };
    let mut session = LiveSession::start(store.clone(), controller(store.clone(), config)).unwrap();

    // Overflow the one-slot buffer, then take the store's subscriptions down
    session.handle_ui(UiEvent::Submitted(form("Barn", "4", "4")));
    store.fail_subscribe.store(true, Ordering::SeqCst);

    let commands = session.pump().unwrap();
    assert!(matches!(
        commands.last(),
        Some(UiCommand::Alert(msg)) if msg.contains("Subscription lost")
    ));
    assert!(!session.is_connected());

    store.fail_subscribe.store(false, Ordering::SeqCst);
    let commands = session.pump().unwrap();
    assert!(session.is_connected());
    assert!(matches!(&commands[..], [UiCommand::Render(plan)] if plan.markers.len() == 1));
}

#[test]
fn test_session_start_fails_without_subscription() {
    let store = Arc::new(FlakyStore::new());
    store.fail_subscribe.store(true, Ordering::SeqCst);

    let result = LiveSession::start(store.clone(), controller(store.clone(), MapConfig::default()));
    assert!(matches!(result, Err(PlaceError::Io(_))));
}

// --- Store Files ---

#[test]
fn test_second_open_is_locked() {
    let dir = TempDir::new().unwrap();
    let config = StoreConfig {
        path: dir.path().join("places"),
        ..Default::default()
    };

    let _first = DocumentStore::open_or_create(config.clone()).unwrap();
    assert!(matches!(
        DocumentStore::open(config),
        Err(PlaceError::Locked)
    ));
}

#[test]
fn test_missing_store_not_created() {
    let dir = TempDir::new().unwrap();
    let result = DocumentStore::open_or_create(StoreConfig {
        path: dir.path().join("absent"),
        create_if_missing: false,
        ..Default::default()
    });
    assert!(matches!(result, Err(PlaceError::NotInitialized)));
}

#[test]
fn test_bad_manifest_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("places");
    std::fs::create_dir_all(&path).unwrap();
    std::fs::write(path.join("MANIFEST"), b"NOPE\x01").unwrap();

    let result = DocumentStore::open(StoreConfig {
        path,
        ..Default::default()
    });
    assert!(matches!(result, Err(PlaceError::InvalidFormat(_))));
}

#[test]
fn test_config_file_errors() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("map.json");

    std::fs::write(&path, "{ not json").unwrap();
    assert!(matches!(
        MapConfig::from_json_file(&path),
        Err(PlaceError::Deserialization(_))
    ));

    std::fs::write(&path, r#"{"default_zoom": 15, "focus_zoom": 12}"#).unwrap();
    assert!(matches!(
        MapConfig::from_json_file(&path),
        Err(PlaceError::InvalidFormat(_))
    ));
}
