use crate::clock::{Clock, FakeClock};
use crate::contention::*;
use crate::model::{RouteIngress, WildcardPolicy};
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;

// ---------------------------
// Helpers
// ---------------------------

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

fn tracker(clock: &FakeClock) -> SimpleContentionTracker {
    SimpleContentionTracker::new(
        ContentionParams {
            expires: Duration::from_secs(60),
            max_contentions: 5,
            message: "router is fighting with another writer".into(),
        },
        Arc::new(clock.clone()),
    )
}

fn ingress(host: &str) -> RouteIngress {
    RouteIngress {
        host: host.into(),
        router_name: "default".into(),
        ..Default::default()
    }
}

// ---------------------------
// Tests
// ---------------------------

#[test]
fn first_observation_is_a_candidate() {
    // Arrange
    let clock = FakeClock::new(start());
    let t = tracker(&clock);

    // Act
    t.changed("uid1", &ingress("a.test"));

    // Assert
    assert_eq!(t.state_of("uid1"), Some(ContentionState::Candidate));
    assert_eq!(t.contentions(), 0);
    assert!(!t.is_change_contended("uid1", clock.now(), None));
}

#[test]
fn unchanged_snapshot_is_not_contention() {
    let clock = FakeClock::new(start());
    let t = tracker(&clock);

    t.changed("uid1", &ingress("a.test"));

    // conditions are not part of the comparison
    let mut same = ingress("a.test");
    same.conditions
        .push(crate::model::RouteIngressCondition::rejected("Other", "x"));
    t.changed("uid1", &same);

    assert_eq!(t.state_of("uid1"), Some(ContentionState::Candidate));
    assert_eq!(t.contentions(), 0);
}

#[test]
fn divergent_snapshot_marks_contended() {
    let clock = FakeClock::new(start());
    let t = tracker(&clock);

    t.changed("uid1", &ingress("a.test"));
    t.changed("uid1", &ingress("b.test"));

    assert_eq!(t.state_of("uid1"), Some(ContentionState::Contended));
    assert_eq!(t.contentions(), 1);
    assert!(t.is_change_contended("uid1", start(), None));
}

#[test]
fn wildcard_policy_change_counts() {
    let clock = FakeClock::new(start());
    let t = tracker(&clock);

    t.changed("uid1", &ingress("a.test"));
    let mut wildcard = ingress("a.test");
    wildcard.wildcard_policy = WildcardPolicy::Subdomain;
    t.changed("uid1", &wildcard);

    assert_eq!(t.state_of("uid1"), Some(ContentionState::Contended));
}

#[test]
fn contended_entry_keeps_counting() {
    let clock = FakeClock::new(start());
    let t = tracker(&clock);

    t.changed("uid1", &ingress("a.test"));
    t.changed("uid1", &ingress("b.test"));
    t.changed("uid1", &ingress("a.test"));
    t.changed("uid1", &ingress("b.test"));

    assert_eq!(t.state_of("uid1"), Some(ContentionState::Contended));
    assert_eq!(t.contentions(), 3);
}

#[test]
fn clear_after_change_is_never_contended() {
    let clock = FakeClock::new(start());
    let t = tracker(&clock);
    t.changed("uid1", &ingress("a.test"));

    for host in ["b.test", "c.test", "d.test"] {
        t.changed("uid1", &ingress(host));
        t.clear("uid1", &ingress(host));
        assert!(
            !t.is_change_contended("uid1", clock.now(), Some(&ingress(host))),
            "contended right after clearing {host}"
        );
    }
}

#[test]
fn clear_of_unknown_id_does_not_track() {
    let clock = FakeClock::new(start());
    let t = tracker(&clock);

    t.clear("uid1", &ingress("a.test"));

    assert_eq!(t.state_of("uid1"), None);
    assert_eq!(t.tracked(), 0);
}

#[test]
fn circuit_breaker_rejects_every_id() {
    let clock = FakeClock::new(start());
    let t = tracker(&clock);

    // six distinct contended routes push the count over the limit of five
    for i in 0..6 {
        let id = format!("uid{i}");
        t.changed(&id, &ingress("a.test"));
        t.changed(&id, &ingress("b.test"));
    }
    assert_eq!(t.contentions(), 6);

    assert!(t.is_change_contended("never-seen", start(), None));

    // further changes are ignored while the breaker is open
    t.changed("late", &ingress("a.test"));
    assert_eq!(t.state_of("late"), None);

    // next flush recounts and the breaker stays open only while entries are live
    clock.advance(TimeDelta::seconds(61));
    t.flush();
    assert_eq!(t.contentions(), 0);
    assert!(!t.is_change_contended("never-seen", clock.now(), None));
}

#[test]
fn expired_contention_is_ignored_and_flushed() {
    let clock = FakeClock::new(start());
    let t = tracker(&clock);
    let at = start();

    t.changed("uid1", &ingress("a.test"));
    t.changed("uid1", &ingress("b.test"));
    assert!(t.is_change_contended("uid1", at, None));

    // at = now - expiry - 1s
    let now = at + TimeDelta::seconds(61);
    assert!(!t.is_change_contended("uid1", now, None));

    clock.set(at + TimeDelta::seconds(121));
    t.flush();
    assert_eq!(t.state_of("uid1"), None);
    assert_eq!(t.contentions(), 0);
}

#[test]
fn flush_keeps_fresh_contention() {
    let clock = FakeClock::new(start());
    let t = tracker(&clock);

    t.changed("uid1", &ingress("a.test"));
    t.changed("uid1", &ingress("b.test"));
    clock.advance(TimeDelta::seconds(30));

    let observed = t.flush();

    assert_eq!(observed, 1);
    assert_eq!(t.contentions(), 1);
    assert_eq!(t.state_of("uid1"), Some(ContentionState::Contended));
}

#[test]
fn candidates_live_for_three_intervals() {
    let clock = FakeClock::new(start());
    let t = tracker(&clock);
    t.changed("uid1", &ingress("a.test"));

    clock.advance(TimeDelta::seconds(179));
    t.flush();
    assert_eq!(t.state_of("uid1"), Some(ContentionState::Candidate));

    clock.advance(TimeDelta::seconds(2));
    t.flush();
    assert_eq!(t.state_of("uid1"), None);
}
