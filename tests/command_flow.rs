//! End-to-end command flows against an in-memory store.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pulsebot::commands::{route_incoming, IncomingUser};
use pulsebot::config::Config;
use pulsebot::gateway::TextGateway;
use pulsebot::kv::MemoryKv;
use pulsebot::runtime::AppState;

#[derive(Default)]
struct CapturingGateway {
    sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl TextGateway for CapturingGateway {
    async fn send_text(&self, chat_id: &str, text: &str, _formatted: bool) -> Result<(), String> {
        self.sent
            .lock()
            .unwrap()
            .push((chat_id.to_string(), text.to_string()));
        Ok(())
    }
}

fn fixture(admin: Option<&str>) -> (Arc<MemoryKv>, AppState, CapturingGateway) {
    let mut config = Config::test_defaults();
    config.admin_id = admin.map(str::to_string);
    let kv = Arc::new(MemoryKv::new());
    let state = AppState::new(config, kv.clone());
    (kv, state, CapturingGateway::default())
}

fn person(id: &str, name: &str, handle: &str) -> IncomingUser {
    IncomingUser {
        id: id.to_string(),
        display_name: name.to_string(),
        handle: handle.to_string(),
        locale: "en".to_string(),
    }
}

#[tokio::test]
async fn test_new_user_journey() {
    let (_kv, state, gateway) = fixture(None);
    let alice = person("1", "Alice", "alice_w");

    let welcome = route_incoming(&state, &gateway, &alice, "/start").await;
    assert!(welcome.contains("Alice"));

    let ack = route_incoming(&state, &gateway, &alice, "my first message").await;
    assert!(ack.contains('#'));

    let profile = route_incoming(&state, &gateway, &alice, "/profile").await;
    assert!(profile.contains("@alice_w"));
    assert!(profile.contains("my first message"));

    let last = route_incoming(&state, &gateway, &alice, "/last").await;
    assert!(last.contains("my first message"));
}

#[tokio::test]
async fn test_history_is_newest_first_and_capped_to_five_in_replies() {
    let (_kv, state, gateway) = fixture(None);
    let user = person("1", "A", "a");
    for i in 1..=7 {
        route_incoming(&state, &gateway, &user, &format!("note {i}")).await;
    }
    let last = route_incoming(&state, &gateway, &user, "/last").await;
    assert!(last.contains("note 7"));
    assert!(last.contains("note 3"));
    assert!(!last.contains("note 2"));
    // newest listed first
    assert!(last.find("note 7").unwrap() < last.find("note 3").unwrap());
}

#[tokio::test]
async fn test_admin_oversees_users_and_broadcasts() {
    let (_kv, state, gateway) = fixture(Some("100"));
    let admin = person("100", "Root", "root");

    for (id, name, handle) in [("1", "Alice", "alice"), ("2", "Bob", "bob")] {
        route_incoming(&state, &gateway, &person(id, name, handle), "/start").await;
    }

    let found = route_incoming(&state, &gateway, &admin, "/search ali").await;
    assert!(found.contains("@alice"));
    assert!(!found.contains("@bob"));

    let panel = route_incoming(&state, &gateway, &admin, "/admin").await;
    assert!(panel.contains("/broadcast"));

    let report = route_incoming(&state, &gateway, &admin, "/broadcast hello everyone").await;
    assert!(report.contains("2/2"));

    let deliveries = gateway.sent.lock().unwrap().clone();
    assert_eq!(deliveries.len(), 2);
    assert!(deliveries.iter().all(|(_, text)| text.contains("hello everyone")));
    let mut ids: Vec<&str> = deliveries.iter().map(|(id, _)| id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["1", "2"]);
}

#[tokio::test]
async fn test_outsider_cannot_reach_admin_surface() {
    let (kv, state, gateway) = fixture(Some("100"));
    let outsider = person("1", "Mallory", "mallory");

    for cmd in ["/admin", "/search x", "/broadcast y"] {
        let reply = route_incoming(&state, &gateway, &outsider, cmd).await;
        assert!(reply.contains("administrator only"));
    }
    assert_eq!(kv.op_count(), 0);
    assert!(gateway.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_stats_reflect_activity() {
    let (_kv, state, gateway) = fixture(None);
    route_incoming(&state, &gateway, &person("1", "A", "a"), "hello").await;
    route_incoming(&state, &gateway, &person("2", "B", "b"), "hi").await;

    let stats = route_incoming(&state, &gateway, &person("1", "A", "a"), "/stats").await;
    assert!(stats.contains("Users: 2"));
    assert!(stats.contains("Messages today: 2"));
    assert!(stats.contains("Active today: 2"));
    assert!(stats.contains("Store: online"));
}
