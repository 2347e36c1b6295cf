//! Cookie attribute contract.
//!
//! Wire format written by [`set_cookie`]:
//!
//! ```text
//! name=<value>; Path=<path>; Max-Age=<seconds>; SameSite=<Lax|Strict|None>[; Domain=<domain>][; Secure]
//! ```
//!
//! [`expire_cookie`] renders the same attributes with an empty value and `Max-Age=0`
//! so the user agent matches and deletes the stored cookie.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::CookieConfig;

/// `SameSite` cookie policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SameSite {
    #[default]
    Lax,
    Strict,
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SameSite::Lax => write!(f, "Lax"),
            SameSite::Strict => write!(f, "Strict"),
            SameSite::None => write!(f, "None"),
        }
    }
}

impl FromStr for SameSite {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let val = s.trim();
        if val.eq_ignore_ascii_case("lax") {
            Ok(SameSite::Lax)
        } else if val.eq_ignore_ascii_case("strict") {
            Ok(SameSite::Strict)
        } else if val.eq_ignore_ascii_case("none") {
            Ok(SameSite::None)
        } else {
            Err(format!("unknown SameSite value: {val}"))
        }
    }
}

/// Renders a cookie-setting string that stores `value`.
pub fn set_cookie(config: &CookieConfig, value: &str) -> String {
    render(config, value, config.max_age_sec)
}

/// Renders a cookie-setting string that deletes the cookie.
pub fn expire_cookie(config: &CookieConfig) -> String {
    render(config, "", 0)
}

fn render(config: &CookieConfig, value: &str, max_age: u64) -> String {
    let mut out = format!(
        "{}={}; Path={}; Max-Age={}; SameSite={}",
        config.name, value, config.path, max_age, config.same_site
    );
    if let Some(domain) = &config.domain {
        out.push_str("; Domain=");
        out.push_str(domain);
    }
    if config.effective_secure() {
        out.push_str("; Secure");
    }
    out
}

/// Finds the raw value of cookie `name` in a `Cookie` request header.
///
/// Pairs are `;`-separated `name=value`; whitespace around each pair is ignored
/// and the first match wins. The value is returned as-is (not percent-decoded).
pub fn read_cookie(header: &str, name: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (k, v) = pair.trim().split_once('=')?;
        (k.trim() == name).then(|| v.trim().to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> CookieConfig {
        CookieConfig {
            name: "consent".into(),
            max_age_sec: 3600,
            same_site: SameSite::Lax,
            secure: false,
            path: "/".into(),
            domain: None,
        }
    }

    #[test]
    fn renders_minimal_cookie() {
        assert_eq!(
            set_cookie(&cfg(), "abc"),
            "consent=abc; Path=/; Max-Age=3600; SameSite=Lax"
        );
    }

    #[test]
    fn renders_domain_and_secure() {
        let mut c = cfg();
        c.domain = Some("example.com".into());
        c.secure = true;
        c.same_site = SameSite::Strict;
        assert_eq!(
            set_cookie(&c, "v"),
            "consent=v; Path=/; Max-Age=3600; SameSite=Strict; Domain=example.com; Secure"
        );
    }

    #[test]
    fn same_site_none_forces_secure() {
        let mut c = cfg();
        c.same_site = SameSite::None;
        c.secure = false;
        assert!(set_cookie(&c, "v").ends_with("SameSite=None; Secure"));
        assert!(expire_cookie(&c).ends_with("SameSite=None; Secure"));
    }

    #[test]
    fn expire_uses_same_attributes_and_zero_max_age() {
        let mut c = cfg();
        c.path = "/app".into();
        c.domain = Some("example.com".into());
        assert_eq!(
            expire_cookie(&c),
            "consent=; Path=/app; Max-Age=0; SameSite=Lax; Domain=example.com"
        );
    }

    #[test]
    fn reads_named_cookie_from_header() {
        let header = "theme=dark; consent=%7B%7D ;other=1";
        assert_eq!(read_cookie(header, "consent").as_deref(), Some("%7B%7D"));
        assert_eq!(read_cookie(header, "other").as_deref(), Some("1"));
        assert_eq!(read_cookie(header, "missing"), None);
    }

    #[test]
    fn read_cookie_does_not_match_prefixes_and_keeps_equals_in_value() {
        let header = "consent_old=x; consent=a=b";
        assert_eq!(read_cookie(header, "consent").as_deref(), Some("a=b"));
        assert_eq!(read_cookie("", "consent"), None);
        assert_eq!(read_cookie("consent", "consent"), None);
    }

    #[test]
    fn same_site_parses_case_insensitively() {
        assert_eq!("lax".parse::<SameSite>(), Ok(SameSite::Lax));
        assert_eq!(" STRICT ".parse::<SameSite>(), Ok(SameSite::Strict));
        assert_eq!("None".parse::<SameSite>(), Ok(SameSite::None));
        assert!("sometimes".parse::<SameSite>().is_err());
        assert_eq!(SameSite::Strict.to_string(), "Strict");
    }
}
