//! A minimal cookie store keyed by request URI.
//!
//! Every read and write goes through one mutex. Each successful mutation
//! bumps a version published on a [`watch`] channel, so interested parties
//! can persist cookies when they change.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use tokio::sync::watch;
use url::Url;

use crate::date::parse_http_date;

/// Format used for `expires` when rendering stored cookies.
const EXPIRES_FORMAT: &str = "%a, %d-%b-%Y %H:%M:%S GMT";

/// Errors raised while storing cookies.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CookieError {
    #[error("cookie header has no name/value pair: {0:?}")]
    Malformed(String),

    #[error("cookie name is empty")]
    EmptyName,

    #[error("cookie domain {domain:?} does not match host {host:?}")]
    DomainMismatch { domain: String, host: String },

    #[error("URI has no host: {0}")]
    MissingHost(String),
}

/// One cookie as stored, tied to the URI it was set from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UriCookie {
    pub uri: Url,
    /// The cookie rendered as a `Set-Cookie` value.
    pub set_cookie: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct StoredCookie {
    name: String,
    value: String,
    domain: String,
    host_only: bool,
    path: String,
    expires: Option<DateTime<Utc>>,
    secure: bool,
    http_only: bool,
}

impl StoredCookie {
    fn parse(uri: &Url, header: &str, now: DateTime<Utc>) -> Result<Self, CookieError> {
        let host = uri
            .host_str()
            .ok_or_else(|| CookieError::MissingHost(uri.to_string()))?
            .to_ascii_lowercase();

        let mut parts = header.split(';');
        let pair = parts.next().unwrap_or_default();
        let (name, value) = pair
            .split_once('=')
            .ok_or_else(|| CookieError::Malformed(header.to_owned()))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(CookieError::EmptyName);
        }

        let mut cookie = StoredCookie {
            name: name.to_owned(),
            value: value.trim().to_owned(),
            domain: host.clone(),
            host_only: true,
            path: default_path(uri),
            expires: None,
            secure: false,
            http_only: false,
        };
        let mut max_age = None;

        for attribute in parts {
            let attribute = attribute.trim();
            let (key, value) = match attribute.split_once('=') {
                Some((key, value)) => (key.trim(), value.trim()),
                None => (attribute, ""),
            };
            match key.to_ascii_lowercase().as_str() {
                "domain" if !value.is_empty() => {
                    let domain = value.trim_start_matches('.').to_ascii_lowercase();
                    if host != domain && !host.ends_with(&format!(".{domain}")) {
                        return Err(CookieError::DomainMismatch { domain, host });
                    }
                    cookie.domain = domain;
                    cookie.host_only = false;
                }
                "path" if value.starts_with('/') => cookie.path = value.to_owned(),
                "expires" => cookie.expires = parse_expires(value),
                "max-age" => max_age = value.parse::<i64>().ok(),
                "secure" => cookie.secure = true,
                "httponly" => cookie.http_only = true,
                _ => {}
            }
        }

        // Max-Age takes precedence over Expires.
        if let Some(seconds) = max_age {
            cookie.expires = if seconds <= 0 {
                Some(now - Duration::seconds(1))
            } else {
                Duration::try_seconds(seconds).and_then(|age| now.checked_add_signed(age))
            };
        }
        Ok(cookie)
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|expires| expires <= now)
    }

    fn matches(&self, uri: &Url) -> bool {
        let Some(host) = uri.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        let domain_ok = if self.host_only {
            host == self.domain
        } else {
            host == self.domain || host.ends_with(&format!(".{}", self.domain))
        };
        let path = uri.path();
        let path_ok = path == self.path
            || (path.starts_with(&self.path)
                && (self.path.ends_with('/') || path[self.path.len()..].starts_with('/')));
        domain_ok && path_ok && (!self.secure || uri.scheme() == "https")
    }

    fn same_identity(&self, other: &StoredCookie) -> bool {
        self.name == other.name && self.domain == other.domain && self.path == other.path
    }

    fn to_set_cookie(&self) -> String {
        let mut header = format!("{}={}", self.name, self.value);
        if !self.host_only {
            header.push_str("; domain=");
            header.push_str(&self.domain);
        }
        header.push_str("; path=");
        header.push_str(&self.path);
        if let Some(expires) = self.expires {
            header.push_str("; expires=");
            header.push_str(&expires.format(EXPIRES_FORMAT).to_string());
        }
        if self.http_only {
            header.push_str("; HttpOnly");
        }
        if self.secure {
            header.push_str("; secure");
        }
        header
    }
}

fn default_path(uri: &Url) -> String {
    match uri.path().rsplit_once('/') {
        Some((directory, _)) if !directory.is_empty() => directory.to_owned(),
        _ => "/".to_owned(),
    }
}

fn parse_expires(value: &str) -> Option<DateTime<Utc>> {
    parse_http_date(value).or_else(|| {
        NaiveDateTime::parse_from_str(value, EXPIRES_FORMAT)
            .ok()
            .map(|naive| naive.and_utc())
    })
}

#[derive(Debug, Default)]
struct CookieMap {
    // URIs cookies were set from, in first-seen order.
    set_uris: Vec<Url>,
    cookies: Vec<StoredCookie>,
}

impl CookieMap {
    fn track(&mut self, uri: &Url) {
        if !self.set_uris.contains(uri) {
            self.set_uris.push(uri.clone());
        }
    }

    fn store(&mut self, cookie: StoredCookie, now: DateTime<Utc>) {
        self.cookies.retain(|existing| !existing.same_identity(&cookie));
        if !cookie.is_expired(now) {
            self.cookies.push(cookie);
        }
    }
}

/// Thread-safe URI to cookie mapping.
#[derive(Debug)]
pub struct CookieStore {
    inner: Mutex<CookieMap>,
    changed: watch::Sender<u64>,
}

impl Default for CookieStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CookieStore {
    /// Create an empty store.
    pub fn new() -> Self {
        let (changed, _) = watch::channel(0);
        Self {
            inner: Mutex::new(CookieMap::default()),
            changed,
        }
    }

    /// Create a store seeded from a previous [`cookies`](Self::cookies) snapshot.
    ///
    /// Entries that fail to parse are skipped.
    pub fn with_cookies<I>(cookies: I) -> Self
    where
        I: IntoIterator<Item = UriCookie>,
    {
        let store = Self::new();
        let now = Utc::now();
        {
            let mut map = store.lock();
            for UriCookie { uri, set_cookie } in cookies {
                match StoredCookie::parse(&uri, &set_cookie, now) {
                    Ok(cookie) => {
                        map.track(&uri);
                        map.store(cookie, now);
                    }
                    Err(e) => tracing::warn!(uri = %uri, error = %e, "skipping stored cookie"),
                }
            }
        }
        store
    }

    fn lock(&self) -> MutexGuard<'_, CookieMap> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Value for the `Cookie` request header, or `None` when nothing applies.
    pub fn cookie_header(&self, uri: &Url) -> Option<String> {
        let now = Utc::now();
        let map = self.lock();
        let header = map
            .cookies
            .iter()
            .filter(|cookie| !cookie.is_expired(now) && cookie.matches(uri))
            .map(|cookie| format!("{}={}", cookie.name, cookie.value))
            .collect::<Vec<_>>()
            .join("; ");
        (!header.is_empty()).then_some(header)
    }

    /// Store one `Set-Cookie` value received from `uri`.
    pub fn set_cookie(&self, uri: &Url, header: &str) -> Result<(), CookieError> {
        let now = Utc::now();
        let cookie = StoredCookie::parse(uri, header, now)?;
        {
            let mut map = self.lock();
            map.track(uri);
            map.store(cookie, now);
        }
        self.notify();
        Ok(())
    }

    /// Store every value in `headers`, stopping at the first failure.
    pub fn set_cookies<'a, I>(&self, uri: &Url, headers: I) -> Result<(), CookieError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let now = Utc::now();
        let parsed = headers
            .into_iter()
            .map(|header| StoredCookie::parse(uri, header, now))
            .collect::<Result<Vec<_>, _>>()?;
        if parsed.is_empty() {
            return Ok(());
        }
        {
            let mut map = self.lock();
            map.track(uri);
            for cookie in parsed {
                map.store(cookie, now);
            }
        }
        self.notify();
        Ok(())
    }

    /// Snapshot of every live cookie, paired with a URI it was set from.
    pub fn cookies(&self) -> Vec<UriCookie> {
        let now = Utc::now();
        let map = self.lock();
        let mut snapshot = Vec::new();
        let mut seen = HashSet::new();
        for uri in &map.set_uris {
            for (index, cookie) in map.cookies.iter().enumerate() {
                if cookie.is_expired(now) || !cookie.matches(uri) {
                    continue;
                }
                if seen.insert(index) {
                    snapshot.push(UriCookie {
                        uri: uri.clone(),
                        set_cookie: cookie.to_set_cookie(),
                    });
                }
            }
        }
        snapshot
    }

    /// Drop every stored cookie. Notifies only if anything was tracked.
    pub fn expire_cookies(&self) {
        let had_cookies = {
            let mut map = self.lock();
            let had_cookies = !map.set_uris.is_empty();
            map.cookies.clear();
            had_cookies
        };
        if had_cookies {
            self.notify();
        }
    }

    /// Receiver whose value changes whenever the store is mutated.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changed.subscribe()
    }

    fn notify(&self) {
        self.changed.send_modify(|version| *version += 1);
    }
}
