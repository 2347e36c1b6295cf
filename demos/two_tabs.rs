use consentify_engine::{
    broadcast::BroadcastHub,
    cookies::{CookieDocument, CookieDocumentHandle, DefaultCookieJar},
    storage::{InMemoryLocalArea, StorageAreaHandle, StorageKind},
    BrowserContext, Choices, ConsentConfig, ConsentError, Consentify,
};

use std::sync::Arc;

fn main() -> Result<(), ConsentError> {
    env_logger::init();

    // Both tabs run the same policy. The local storage mirror is tried first and the
    // cookie is kept in step so a server can read the decision too.
    let builder = || {
        ConsentConfig::builder()
            .categories(["analytics", "marketing"])
            .consent_max_age_days(180.0)
            .storage([StorageKind::LocalStorage, StorageKind::Cookie])
            .secure(false)
    };

    // Same-origin tabs share the cookie jar, the local storage area and the broadcast
    // hub. Each tab opens its own endpoint on the hub, so a tab never hears itself.
    let jar = Arc::new(DefaultCookieJar::new());
    let local = Arc::new(InMemoryLocalArea::new());
    let hub = Arc::new(BroadcastHub::new());
    let context = BrowserContext::new(jar.clone() as CookieDocumentHandle)
        .local_storage(local as StorageAreaHandle)
        .broadcast(hub);

    let tab_a = Consentify::build(builder(), context.clone())?;
    let tab_b = Consentify::build(builder(), context)?;
    println!("policy hash: {}", tab_a.policy_hash());

    let _sub_a = tab_a.client().subscribe(|| println!("tab A: consent changed"));
    let b_client = tab_b.client().clone();
    let _sub_b = tab_b.client().subscribe(move || {
        println!("tab B: consent changed, analytics = {}", b_client.get_category("analytics"));
    });

    // Tab B loads the analytics script once the user agrees, and unloads it again on revoke.
    let guard = tab_b.client().guard_with_revoke(
        "analytics",
        || println!("tab B: loading analytics"),
        || println!("tab B: unloading analytics"),
    );

    // The user accepts analytics in tab A. Tab A's listener fires immediately, tab B
    // only catches up once it processes its pending broadcasts.
    tab_a
        .client()
        .set(&Choices::from([("analytics".to_string(), true)]));
    println!("tab B before pump: {:?}", tab_b.client().get());
    let handled = tab_b.client().pump_broadcasts();
    println!("tab B handled {handled} signal(s), guard is {:?}", guard.phase());

    // A repeated identical decision writes nothing and notifies nobody.
    tab_a
        .client()
        .set(&Choices::from([("analytics".to_string(), true)]));
    println!("tab B pending after no-op set: {}", tab_b.client().pump_broadcasts());

    // The server sees the cookie the browser would send with its next request.
    match jar.cookie() {
        Ok(header) => {
            let state = tab_a.server().get(Some(header.as_str()));
            println!("server sees analytics = {}", state.is_granted("analytics"));
        }
        Err(e) => eprintln!("cookie jar unreadable: {e}"),
    }

    // Revoking everything clears both backends; tab B's guard runs its revoke callback.
    tab_a.client().clear();
    tab_b.client().pump_broadcasts();
    println!("guard after clear: {:?}", guard.phase());

    Ok(())
}
