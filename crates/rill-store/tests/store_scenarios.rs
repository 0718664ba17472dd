//! End-to-end store scenarios: schema defaults, merges, validation, and
//! dispatch, observed through watchers the way UI code consumes a store.

use rill_core::expect::Validator;
use rill_store::{ErrorMap, Schema, StateMap, Store, StoreWatcher};
use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;

fn state_log(store: &Store) -> Rc<RefCell<Vec<StateMap>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    store
        .watch(StoreWatcher::new().on_state(move |state| {
            sink.borrow_mut().push(state);
        }))
        .forget();
    log
}

fn error_log(store: &Store) -> Rc<RefCell<Vec<ErrorMap>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    store
        .watch(StoreWatcher::new().on_errors(move |errors| {
            sink.borrow_mut().push(errors);
        }))
        .forget();
    log
}

#[test]
fn count_updates_then_resets_to_default() {
    let schema = Schema::builder().field("count", json!(0)).build().unwrap();
    let store = Store::builder().schema(schema).build().unwrap();
    let states = state_log(&store);

    store.update(json!({ "count": 5 }));
    assert_eq!(states.borrow().last().unwrap()["count"], json!(5));

    store.reset();
    assert_eq!(states.borrow().last().unwrap()["count"], json!(0));
}

#[test]
fn invalid_field_reports_then_clears() {
    let schema = Schema::builder()
        .validated_field("memes", json!(""), Validator::predicate(|v| v.is_string()))
        .build()
        .unwrap();
    let store = Store::builder().schema(schema).build().unwrap();
    let errors = error_log(&store);

    store.update(json!({ "memes": 42 }));
    {
        let log = errors.borrow();
        let latest = log.last().unwrap();
        assert!(latest["memes"].message.contains("memes"));
    }

    store.update(json!({ "memes": "ok" }));
    {
        let log = errors.borrow();
        let latest = log.last().unwrap();
        assert!(!latest.contains_key("memes"));
    }
}

#[test]
fn empty_update_rebroadcasts_unchanged_state() {
    let schema = Schema::builder().field("count", json!(0)).build().unwrap();
    let store = Store::builder().schema(schema).build().unwrap();
    store.update(json!({ "count": 3 }));

    let states = state_log(&store);
    store.update(json!({}));
    assert_eq!(states.borrow().len(), 1);
    assert_eq!(states.borrow()[0]["count"], json!(3));
}

#[test]
fn authentication_flow_through_dispatch() {
    let schema = Schema::builder()
        .validated_field("user_id", json!(null), Validator::predicate(|v| {
            v.is_string() || v.is_null()
        }))
        .validated_field("token", json!(null), Validator::predicate(|v| {
            v.is_string() || v.is_null()
        }))
        .validated_field("logged_in", json!(false), Validator::predicate(|v| v.is_boolean()))
        .build()
        .unwrap();
    let store = Store::builder()
        .schema(schema)
        .action("authenticate", |_, args| {
            let user_id = args["user_id"].clone();
            let token = args["token"].clone();
            let logged_in = user_id.is_string() && token.is_string();
            json!({ "user_id": user_id, "token": token, "logged_in": logged_in })
        })
        .action("sign_out", |_, _| {
            json!({ "user_id": null, "token": null, "logged_in": false })
        })
        .build()
        .unwrap();
    let states = state_log(&store);
    let errors = error_log(&store);

    store
        .dispatch("authenticate", json!({ "user_id": "u1", "token": "t1" }))
        .unwrap();
    {
        let log = states.borrow();
        let latest = log.last().unwrap();
        assert_eq!(latest["logged_in"], json!(true));
        assert_eq!(latest["user_id"], json!("u1"));
    }
    assert!(errors.borrow().last().unwrap().is_empty());

    store.dispatch("sign_out", json!(null)).unwrap();
    assert_eq!(states.borrow().last().unwrap()["logged_in"], json!(false));
}

#[test]
fn watcher_interest_isolates_event_streams() {
    let schema = Schema::builder()
        .validated_field("memes", json!(""), Validator::predicate(|v| v.is_string()))
        .build()
        .unwrap();
    let store = Store::builder().schema(schema).build().unwrap();

    // A watcher that never asks for errors never learns about them.
    let states = state_log(&store);
    store.update(json!({ "memes": 42 }));
    assert_eq!(states.borrow().len(), 1);
    assert!(store.errors().contains_key("memes"));
}
