use integration_tests::harness::events::{list_complete, route_event};
use integration_tests::harness::router::{TIMEOUT, test_config};
use integration_tests::harness::{
    TestRouter, admitted_condition, events_of_kind, eventually, init_test_tracing,
};
use pretty_assertions::assert_eq;
use routekeeper_core::backend::{STATE_FILE, alias_key};
use routekeeper_core::model::ConditionStatus;
use routekeeper_core::status::RouteLister;
use routekeeper_core::store::InMemoryRouteStore;
use std::sync::Arc;

const ROUTER: &str = "default";

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn admitted_route_is_served_and_marked() {
    // Arrange
    init_test_tracing();
    let store = Arc::new(InMemoryRouteStore::new());
    let mut router = TestRouter::start(store.clone(), test_config(ROUTER)).await;
    let state_file = router.runtime.config.router.state_dir.join(STATE_FILE);

    // Act
    router
        .send(&[
            list_complete(),
            route_event("Added", "shop", "web", "web.shop.test", 0),
        ])
        .await;
    router.settle(1).await;

    // Assert
    let condition = admitted_condition(&store, "shop", "web", ROUTER).unwrap();
    assert_eq!(condition.status, ConditionStatus::True);
    assert!(condition.last_transition_time.is_some());

    let route = store.get("shop", "web").unwrap();
    assert!(router.runtime.backend.aliases().contains_key(&alias_key(&route)));

    let backend = router.runtime.backend.clone();
    assert!(eventually(TIMEOUT, || backend.is_synced()).await);
    assert!(
        eventually(TIMEOUT, || std::fs::read_to_string(&state_file)
            .is_ok_and(|body| body.contains("web.shop.test")))
        .await
    );

    router.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn newer_route_for_claimed_host_is_rejected() {
    init_test_tracing();
    let store = Arc::new(InMemoryRouteStore::new());
    let mut router = TestRouter::start(store.clone(), test_config(ROUTER)).await;

    router
        .send(&[
            list_complete(),
            route_event("Added", "shop", "first", "app.shop.test", 0),
            route_event("Added", "shop", "second", "app.shop.test", 30),
        ])
        .await;
    router.settle(2).await;

    let first = admitted_condition(&store, "shop", "first", ROUTER).unwrap();
    let second = admitted_condition(&store, "shop", "second", ROUTER).unwrap();
    assert_eq!(first.status, ConditionStatus::True);
    assert_eq!(second.status, ConditionStatus::False);
    assert_eq!(second.reason, "HostAlreadyClaimed");

    let aliases = router.runtime.backend.aliases();
    assert!(aliases.contains_key("shop:first"));
    assert!(!aliases.contains_key("shop:second"));

    assert!(
        events_of_kind("route_rejected")
            .iter()
            .any(|e| e.field("route") == Some("shop/second")
                && e.field("reason") == Some("HostAlreadyClaimed"))
    );

    router.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn foreign_namespace_cannot_share_a_claimed_subdomain() {
    init_test_tracing();
    let store = Arc::new(InMemoryRouteStore::new());
    let mut router = TestRouter::start(store.clone(), test_config(ROUTER)).await;

    router
        .send(&[
            list_complete(),
            route_event("Added", "team-a", "www", "www.corp.test", 0),
            route_event("Added", "team-b", "api", "api.corp.test", 10),
            route_event("Added", "team-a", "docs", "docs.corp.test", 20),
        ])
        .await;
    router.settle(3).await;

    let foreign = admitted_condition(&store, "team-b", "api", ROUTER).unwrap();
    assert_eq!(foreign.status, ConditionStatus::False);
    assert_eq!(foreign.reason, "SubdomainAlreadyClaimed");

    let sibling = admitted_condition(&store, "team-a", "docs", ROUTER).unwrap();
    assert_eq!(sibling.status, ConditionStatus::True);

    router.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn denied_domain_is_not_admitted() {
    init_test_tracing();
    let store = Arc::new(InMemoryRouteStore::new());
    let mut config = test_config(ROUTER);
    config.admission.denied_domains = vec!["blocked.test".to_string()];
    let mut router = TestRouter::start(store.clone(), config).await;

    router
        .send(&[
            list_complete(),
            route_event("Added", "shop", "evil", "www.blocked.test", 0),
        ])
        .await;
    router.settle(1).await;

    let condition = admitted_condition(&store, "shop", "evil", ROUTER).unwrap();
    assert_eq!(condition.status, ConditionStatus::False);
    assert_eq!(condition.reason, "RouteNotAdmitted");
    assert!(router.runtime.backend.aliases().is_empty());

    router.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disabled_status_still_serves_routes() {
    // Arrange
    init_test_tracing();
    let store = Arc::new(InMemoryRouteStore::new());
    let mut config = test_config(ROUTER);
    config.status.enabled = false;
    let mut router = TestRouter::start(store.clone(), config).await;

    // Act
    router
        .send(&[
            list_complete(),
            route_event("Added", "shop", "quiet", "quiet.shop.test", 0),
        ])
        .await;
    router.settle(1).await;

    // Assert
    assert!(router.runtime.status.is_none());
    assert!(router.runtime.backend.aliases().contains_key("shop:quiet"));
    assert_eq!(admitted_condition(&store, "shop", "quiet", ROUTER), None);

    let stats = router.stop().await;
    assert_eq!(stats.events, 2);
    assert_eq!(stats.malformed, 0);
}
