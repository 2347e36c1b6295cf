use std::fmt::Debug;

use crate::config::CookieConfig;
use crate::cookies::{expire_cookie, read_cookie, set_cookie, CookieDocumentHandle};
use crate::storage::area::StorageAreaHandle;
use crate::storage::StorageKind;

/// Key written and removed to check whether local storage actually works.
const PROBE_KEY: &str = "__consentify_probe__";

/// Reads and writes one raw value across the configured backends.
///
/// - **read**: backends in configured order, first non-empty value wins.
/// - **write**: the first *usable* backend receives the value; when that is not
///   the cookie and the cookie is configured too, the cookie gets the same value
///   so server-side reads stay correct.
/// - **clear**: every configured backend plus the cookie.
///
/// Backends that are missing from the runtime read as absent and ignore writes.
/// Backend errors are logged as warnings and otherwise swallowed.
#[derive(Clone)]
pub struct StorageAdapter {
    order: Vec<StorageKind>,
    cookie: CookieConfig,
    document: Option<CookieDocumentHandle>,
    local: Option<StorageAreaHandle>,
}

impl Debug for StorageAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageAdapter")
            .field("order", &self.order)
            .field("cookie", &self.cookie.name)
            .field("document", &self.document.is_some())
            .field("local", &self.local.is_some())
            .finish()
    }
}

impl StorageAdapter {
    pub fn new(
        order: Vec<StorageKind>,
        cookie: CookieConfig,
        document: Option<CookieDocumentHandle>,
        local: Option<StorageAreaHandle>,
    ) -> Self {
        let order = if order.is_empty() { vec![StorageKind::Cookie] } else { order };
        Self { order, cookie, document, local }
    }

    pub fn order(&self) -> &[StorageKind] {
        &self.order
    }

    /// Returns the first non-empty raw value in priority order.
    pub fn read(&self) -> Option<String> {
        self.order
            .iter()
            .find_map(|kind| self.read_kind(*kind).filter(|v| !v.is_empty()))
    }

    /// Writes `raw` to the first usable backend, mirroring into the cookie.
    pub fn write(&self, raw: &str) {
        let Some(primary) = self
            .order
            .iter()
            .copied()
            .find(|kind| self.is_usable(*kind) && self.write_kind(*kind, raw))
        else {
            log::warn!("consent storage: no usable backend in {:?}, value not stored", self.order);
            return;
        };

        if primary != StorageKind::Cookie && self.order.contains(&StorageKind::Cookie) {
            self.write_kind(StorageKind::Cookie, raw);
        }
    }

    /// Removes the value from every configured backend and from the cookie.
    pub fn clear(&self) {
        let mut kinds = self.order.clone();
        if !kinds.contains(&StorageKind::Cookie) {
            kinds.push(StorageKind::Cookie);
        }
        for kind in kinds {
            self.clear_kind(kind);
        }
    }

    fn is_usable(&self, kind: StorageKind) -> bool {
        match kind {
            StorageKind::Cookie => self.document.is_some(),
            StorageKind::LocalStorage => {
                let Some(area) = &self.local else {
                    return false;
                };
                match area
                    .set_item(PROBE_KEY, PROBE_KEY)
                    .and_then(|_| area.remove_item(PROBE_KEY))
                {
                    Ok(()) => true,
                    Err(e) => {
                        log::warn!("consent storage: localStorage unusable: {e}");
                        false
                    }
                }
            }
        }
    }

    fn read_kind(&self, kind: StorageKind) -> Option<String> {
        match kind {
            StorageKind::Cookie => {
                let document = self.document.as_ref()?;
                match document.cookie() {
                    Ok(header) => read_cookie(&header, &self.cookie.name),
                    Err(e) => {
                        log::warn!("consent storage: cookie read failed: {e}");
                        None
                    }
                }
            }
            StorageKind::LocalStorage => {
                let area = self.local.as_ref()?;
                match area.get_item(&self.cookie.name) {
                    Ok(value) => value,
                    Err(e) => {
                        log::warn!("consent storage: localStorage read failed: {e}");
                        None
                    }
                }
            }
        }
    }

    /// Returns `true` when the backend accepted the value.
    fn write_kind(&self, kind: StorageKind, raw: &str) -> bool {
        let result = match kind {
            StorageKind::Cookie => match &self.document {
                Some(document) => document.set_cookie(&set_cookie(&self.cookie, raw)),
                None => return false,
            },
            StorageKind::LocalStorage => match &self.local {
                Some(area) => area.set_item(&self.cookie.name, raw),
                None => return false,
            },
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                log::warn!("consent storage: {kind} write failed: {e}");
                false
            }
        }
    }

    fn clear_kind(&self, kind: StorageKind) {
        let result = match kind {
            StorageKind::Cookie => match &self.document {
                Some(document) => document.set_cookie(&expire_cookie(&self.cookie)),
                None => return,
            },
            StorageKind::LocalStorage => match &self.local {
                Some(area) => area.remove_item(&self.cookie.name),
                None => return,
            },
        };

        if let Err(e) = result {
            log::warn!("consent storage: {kind} clear failed: {e}");
        }
    }
}
