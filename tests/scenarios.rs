use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use consentify_engine::broadcast::BroadcastHub;
use consentify_engine::cookies::{set_cookie, CookieDocument, CookieDocumentHandle, DefaultCookieJar};
use consentify_engine::snapshot::encode;
use consentify_engine::{
    BrowserContext, Choices, ConsentConfig, ConsentConfigBuilder, ConsentState, Consentify, Snapshot,
    NECESSARY,
};

fn choices(pairs: &[(&str, bool)]) -> Choices {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

fn analytics_only() -> ConsentConfigBuilder {
    ConsentConfig::builder().categories(["analytics"]).secure(false)
}

fn counting(consent: &Consentify) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    // Kept subscribed for the whole test; dropping a subscription does not unsubscribe.
    let _ = consent.client().subscribe(move || {
        c.fetch_add(1, Ordering::SeqCst);
    });
    count
}

#[test]
fn decision_made_in_browser_is_visible_to_server() {
    let jar = Arc::new(DefaultCookieJar::new());
    let consent = Consentify::build(
        analytics_only(),
        BrowserContext::new(jar.clone() as CookieDocumentHandle),
    )
    .unwrap();

    consent.client().set(&choices(&[("analytics", true)]));
    let state = consent.client().get();
    assert_eq!(state.choices(), Some(&choices(&[(NECESSARY, true), ("analytics", true)])));

    let header = jar.cookie().unwrap();
    assert_eq!(consent.server().get(Some(header.as_str())), *state);
}

#[test]
fn server_set_cookie_is_picked_up_by_the_browser() {
    let jar = Arc::new(DefaultCookieJar::new());
    let server_side = Consentify::build(analytics_only(), BrowserContext::detached()).unwrap();
    jar.set_cookie(&server_side.server().set(&choices(&[("analytics", true)]), None))
        .unwrap();

    let browser = Consentify::build(analytics_only(), BrowserContext::new(jar as CookieDocumentHandle)).unwrap();
    assert!(browser.client().get_category("analytics"));
}

#[test]
fn necessary_cannot_be_switched_off() {
    let jar: CookieDocumentHandle = DefaultCookieJar::new().into();
    let consent = Consentify::build(analytics_only(), BrowserContext::new(jar)).unwrap();

    consent.client().set(&choices(&[(NECESSARY, false)]));
    assert_eq!(consent.client().get().choices().unwrap()[NECESSARY], true);
    assert!(consent.client().get_category(NECESSARY));
}

#[test]
fn adding_a_category_invalidates_prior_consent() {
    let jar = Arc::new(DefaultCookieJar::new());
    let v1 = Consentify::build(analytics_only(), BrowserContext::new(jar.clone() as CookieDocumentHandle)).unwrap();
    v1.client().set(&choices(&[("analytics", true)]));

    let v2 = Consentify::build(
        ConsentConfig::builder().categories(["analytics", "marketing"]).secure(false),
        BrowserContext::new(jar.clone() as CookieDocumentHandle),
    )
    .unwrap();
    assert_ne!(v1.policy_hash(), v2.policy_hash());
    assert_eq!(*v2.client().get(), ConsentState::Unset);

    let header = jar.cookie().unwrap();
    assert_eq!(v2.server().get(Some(header.as_str())), ConsentState::Unset);
}

#[test]
fn guard_fires_grant_then_revoke_once_each() {
    let jar: CookieDocumentHandle = DefaultCookieJar::new().into();
    let consent = Consentify::build(analytics_only(), BrowserContext::new(jar)).unwrap();
    let events = Arc::new(Mutex::new(Vec::new()));

    let (g, r) = (events.clone(), events.clone());
    let _guard = consent.client().guard_with_revoke(
        "analytics",
        move || g.lock().unwrap().push("grant"),
        move || r.lock().unwrap().push("revoke"),
    );

    consent.client().set(&choices(&[("analytics", true)]));
    consent.client().set(&choices(&[("analytics", false)]));
    consent.client().set(&choices(&[("analytics", true)]));

    assert_eq!(*events.lock().unwrap(), vec!["grant", "revoke"]);
}

#[test]
fn two_tabs_each_notify_exactly_once() {
    let jar = Arc::new(DefaultCookieJar::new());
    let hub = Arc::new(BroadcastHub::new());
    let context = BrowserContext::new(jar as CookieDocumentHandle).broadcast(hub);

    let a = Consentify::build(analytics_only(), context.clone()).unwrap();
    let b = Consentify::build(analytics_only(), context).unwrap();
    let count_a = counting(&a);
    let count_b = counting(&b);

    a.client().set(&choices(&[("analytics", true)]));
    a.client().pump_broadcasts();
    b.client().pump_broadcasts();

    assert_eq!(count_a.load(Ordering::SeqCst), 1);
    assert_eq!(count_b.load(Ordering::SeqCst), 1);
    assert!(b.client().get_category("analytics"));
}

#[test]
fn guard_in_other_tab_follows_broadcasts() {
    let jar = Arc::new(DefaultCookieJar::new());
    let hub = Arc::new(BroadcastHub::new());
    let context = BrowserContext::new(jar as CookieDocumentHandle).broadcast(hub);

    let a = Consentify::build(analytics_only(), context.clone()).unwrap();
    let b = Consentify::build(analytics_only(), context).unwrap();
    let grants = Arc::new(AtomicUsize::new(0));
    let g = grants.clone();
    let _guard = b.client().guard("analytics", move || {
        g.fetch_add(1, Ordering::SeqCst);
    });

    a.client().set(&choices(&[("analytics", true)]));
    assert_eq!(grants.load(Ordering::SeqCst), 0);
    b.client().pump_broadcasts();
    assert_eq!(grants.load(Ordering::SeqCst), 1);
}

#[test]
fn identical_set_is_a_single_write_and_notification() {
    let jar = Arc::new(DefaultCookieJar::new());
    let consent = Consentify::build(analytics_only(), BrowserContext::new(jar.clone() as CookieDocumentHandle)).unwrap();
    let count = counting(&consent);

    consent.client().set(&choices(&[("analytics", true)]));
    let written = jar.cookie().unwrap();
    consent.client().set(&choices(&[("analytics", true)]));

    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(jar.cookie().unwrap(), written);
}

#[test]
fn decision_older_than_max_age_is_unset() {
    let jar = Arc::new(DefaultCookieJar::new());
    let config = analytics_only().consent_max_age_days(30.0).build().unwrap();
    let consent = Consentify::new(config.clone(), BrowserContext::detached());

    let stale = Snapshot {
        policy: consent.policy_hash().to_string(),
        given_at: "2020-01-01T00:00:00.000Z".into(),
        choices: choices(&[(NECESSARY, true), ("analytics", true)]),
    };
    jar.set_cookie(&set_cookie(&config.cookie, &encode(&stale))).unwrap();

    let header = jar.cookie().unwrap();
    assert_eq!(consent.server().get(Some(header.as_str())), ConsentState::Unset);

    let browser = Consentify::new(config, BrowserContext::new(jar as CookieDocumentHandle));
    assert_eq!(*browser.client().get(), ConsentState::Unset);
}

#[test]
fn clear_from_one_tab_resets_the_other() {
    let jar = Arc::new(DefaultCookieJar::new());
    let hub = Arc::new(BroadcastHub::new());
    let context = BrowserContext::new(jar.clone() as CookieDocumentHandle).broadcast(hub);

    let a = Consentify::build(analytics_only(), context.clone()).unwrap();
    let b = Consentify::build(analytics_only(), context).unwrap();
    a.client().set(&choices(&[("analytics", true)]));
    b.client().pump_broadcasts();
    assert!(b.client().get_category("analytics"));

    a.client().clear();
    assert_eq!(b.client().pump_broadcasts(), 1);
    assert_eq!(*b.client().get(), ConsentState::Unset);
    assert_eq!(jar.cookie().unwrap(), "");
}

#[test]
fn pushed_signals_need_no_pump() {
    let jar = Arc::new(DefaultCookieJar::new());
    let hub = Arc::new(BroadcastHub::new());
    let context = BrowserContext::new(jar as CookieDocumentHandle)
        .broadcast(hub)
        .push_broadcasts();

    let a = Consentify::build(analytics_only(), context.clone()).unwrap();
    let b = Consentify::build(analytics_only(), context).unwrap();
    let grants = Arc::new(AtomicUsize::new(0));
    let g = grants.clone();
    b.client().guard("analytics", move || {
        g.fetch_add(1, Ordering::SeqCst);
    });

    a.client().set(&choices(&[("analytics", true)]));
    assert_eq!(grants.load(Ordering::SeqCst), 1);
    assert!(b.client().get_category("analytics"));
}
