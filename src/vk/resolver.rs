//! Normalization of VK source references.
//!
//! Users paste anything: `durov`, `-1`, `https://vk.com/club1`,
//! `https://m.vk.com/wall-22822305_1234?own=1`. [`resolve`] reduces all of
//! them to a canonical id string: either a signed numeric owner id or a
//! screen name that still needs a `utils.resolveScreenName` round-trip.
//!
//! Patterns are tried in a fixed order and the first match wins:
//!
//! 1. `group<id>`            → `<id>` (sign kept)
//! 2. `id<digits>`           → `<digits>`
//! 3. `wall<id>`             → `<id>` (the wall owner of a post URL)
//! 4. `public<digits>` / `club<digits>` (optional `-`) → `-<digits>`
//! 5. `vk.com/<segment>`     → `<segment>` unless it is a reserved prefix
//! 6. last path segment that is not reserved, else the input unchanged
//!
//! Matching is case-insensitive and anchored at a path-segment boundary so
//! screen names such as `david123` are not mistaken for `id123`.

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;
use url::form_urlencoded;

use super::types::{ResolvedScreenName, SourceType};

/// Path prefixes that denote an id type rather than a screen name.
const RESERVED_PREFIXES: [&str; 5] = ["wall", "id", "club", "public", "group"];

/// Hosts accepted for URL-shaped identifiers.
const VK_HOSTS: [&str; 3] = ["vk.com", "vk.ru", "vkontakte.ru"];

struct Patterns {
    group: Regex,
    user: Regex,
    wall: Regex,
    community: Regex,
    vk_segment: Regex,
    screen_name: Regex,
}

static PATTERNS: OnceLock<Patterns> = OnceLock::new();

fn patterns() -> &'static Patterns {
    // The expressions are literals; a failure here is a programming error
    // caught by the unit tests on first use.
    PATTERNS.get_or_init(|| Patterns {
        group: Regex::new(r"(?i)(?:^|/)group(-?\d+)").expect("valid group pattern"),
        user: Regex::new(r"(?i)(?:^|/)id(\d+)").expect("valid id pattern"),
        wall: Regex::new(r"(?i)(?:^|/)wall(-?\d+)").expect("valid wall pattern"),
        community: Regex::new(r"(?i)(?:^|/)(?:public|club)-?(\d+)")
            .expect("valid community pattern"),
        vk_segment: Regex::new(r"(?i)(?:^|[/.])vk\.(?:com|ru)/([^/]+)")
            .expect("valid vk.com pattern"),
        screen_name: Regex::new(r"^[A-Za-z0-9_.]+$").expect("valid screen name pattern"),
    })
}

/// Returns true for sign-optional decimal ids (`"123"`, `"-123"`).
pub fn is_numeric_id(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Splits off `?query` and `#fragment`, returning `(path, query)`.
fn split_query(raw: &str) -> (&str, Option<&str>) {
    let without_fragment = raw.split('#').next().unwrap_or(raw);
    match without_fragment.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (without_fragment, None),
    }
}

fn is_reserved(segment: &str) -> bool {
    let lower = segment.to_ascii_lowercase();
    RESERVED_PREFIXES.iter().any(|prefix| {
        lower == *prefix
            || lower
                .strip_prefix(prefix)
                .and_then(|rest| rest.chars().next())
                .is_some_and(|c| c == '-' || c.is_ascii_digit())
    })
}

/// What the shape of a reference says about the source it names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdKind {
    User,
    Community,
    /// Screen names say nothing until VK resolves them.
    Unknown,
}

impl IdKind {
    /// Sign convention for plain numeric ids: negative walls are communities.
    fn from_sign(id: &str) -> Self {
        if !is_numeric_id(id) {
            IdKind::Unknown
        } else if id.starts_with('-') {
            IdKind::Community
        } else {
            IdKind::User
        }
    }
}

/// Normalizes any VK reference into a canonical id string.
///
/// Never fails: input that matches no pattern is returned trimmed but
/// otherwise unchanged. See the module docs for the pattern order.
pub fn resolve(raw: &str) -> String {
    resolve_with_kind(raw).0
}

fn resolve_with_kind(raw: &str) -> (String, IdKind) {
    let trimmed = raw.trim();
    if is_numeric_id(trimmed) {
        return (trimmed.to_string(), IdKind::from_sign(trimmed));
    }

    let (path, _query) = split_query(trimmed);
    let path = path.trim_end_matches('/');
    let p = patterns();

    if let Some(caps) = p.group.captures(path) {
        return (caps[1].to_string(), IdKind::Community);
    }
    if let Some(caps) = p.user.captures(path) {
        return (caps[1].to_string(), IdKind::User);
    }
    if let Some(caps) = p.wall.captures(path) {
        let owner = caps[1].to_string();
        let kind = IdKind::from_sign(&owner);
        return (owner, kind);
    }
    if let Some(caps) = p.community.captures(path) {
        return (format!("-{}", &caps[1]), IdKind::Community);
    }
    if let Some(caps) = p.vk_segment.captures(path) {
        let segment = &caps[1];
        if !is_reserved(segment) {
            return (segment.to_string(), IdKind::Unknown);
        }
    }

    let fallback = match path.rsplit('/').find(|s| !s.is_empty()) {
        Some(segment) if !is_reserved(segment) => segment.to_string(),
        _ => trimmed.to_string(),
    };
    let kind = IdKind::from_sign(&fallback);
    (fallback, kind)
}

/// Returns the `wall.get` filter implied by the reference's query string.
///
/// `own=1` on a pasted URL means "posts by the wall owner only", which VK
/// expresses as `filter=owner`. All other query parameters are ignored.
pub fn wall_filter(raw: &str) -> Option<&'static str> {
    let (_, query) = split_query(raw.trim());
    let query = query?;
    form_urlencoded::parse(query.as_bytes())
        .any(|(key, value)| key == "own" && value == "1")
        .then_some("owner")
}

// ============================================================================
// Validation (interactive flows only)
// ============================================================================

/// Why a raw reference was rejected by [`validate_identifier`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("VK identifier is empty")]
    Empty,
    #[error("'{0}' is not a VK address")]
    ForeignHost(String),
    #[error("'{0}' is not a valid VK id or screen name")]
    Malformed(String),
}

fn host_of(raw: &str) -> Option<String> {
    let after_scheme = match raw.split_once("://") {
        Some((_, rest)) => rest,
        None if raw.contains('/') => raw,
        None => return None,
    };
    let host = after_scheme.split(['/', '?', '#']).next().unwrap_or("");
    let host = host.to_ascii_lowercase();
    let host = host
        .strip_prefix("www.")
        .or_else(|| host.strip_prefix("m."))
        .unwrap_or(&host)
        .to_string();
    Some(host)
}

/// Resolves `raw` and checks that the result can be sent to the VK API.
///
/// Used by the add/edit/import flows to reject garbage before it is stored.
/// Feed rendering never calls this; it degrades instead of failing.
pub fn validate_identifier(raw: &str) -> Result<String, IdentifierError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(IdentifierError::Empty);
    }

    if let Some(host) = host_of(trimmed) {
        if !VK_HOSTS.contains(&host.as_str()) {
            return Err(IdentifierError::ForeignHost(host));
        }
    }

    let resolved = resolve(trimmed);
    if is_numeric_id(&resolved) {
        if resolved.trim_start_matches('-').bytes().all(|b| b == b'0') {
            return Err(IdentifierError::Malformed(resolved));
        }
        return Ok(resolved);
    }

    if resolved.len() <= 64 && patterns().screen_name.is_match(&resolved) {
        Ok(resolved)
    } else {
        Err(IdentifierError::Malformed(trimmed.to_string()))
    }
}

// ============================================================================
// Typed resolution
// ============================================================================

/// Transient `(source_type, canonical_id)` pair. Never persisted or cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub source_type: SourceType,
    pub canonical_id: String,
}

impl ResolvedSource {
    /// Normalizes a stored `(source_type, source_id)` without any API call.
    ///
    /// The type the reference itself implies wins over the configured one:
    /// `id1`, `wall1_45` and positive numbers are users, while `group555`,
    /// `club1`, `public1` and negative numbers are communities. A community
    /// keeps the configured `group`/`page` distinction. Only screen names
    /// fall back to the configured type until VK resolves them.
    pub fn from_configured(source_type: SourceType, raw: &str) -> Self {
        let (canonical_id, kind) = resolve_with_kind(raw);
        let resolved_type = match kind {
            IdKind::User => SourceType::User,
            IdKind::Community if source_type.is_community() => source_type,
            IdKind::Community => SourceType::Group,
            IdKind::Unknown => source_type,
        };
        if resolved_type != source_type {
            tracing::debug!(
                configured = %source_type,
                resolved = %resolved_type,
                id = %canonical_id,
                "Identifier overrides configured source type"
            );
        }
        Self {
            source_type: resolved_type,
            canonical_id,
        }
    }

    /// Screen names need `utils.resolveScreenName` to learn their type/id.
    pub fn needs_remote_resolution(&self) -> bool {
        !is_numeric_id(&self.canonical_id)
    }

    /// Refines type and id from a `utils.resolveScreenName` answer.
    ///
    /// Communities come back with a non-negative `object_id` and are negated
    /// to match the `wall.get` owner convention. Other object types
    /// (applications, ...) leave the source untouched.
    pub fn apply_screen_name(&mut self, resolved: &ResolvedScreenName) {
        match resolved.kind.as_str() {
            "user" => {
                self.source_type = SourceType::User;
                self.canonical_id = resolved.object_id.abs().to_string();
            }
            "group" | "page" => {
                self.source_type = if resolved.kind == "page" {
                    SourceType::Page
                } else {
                    SourceType::Group
                };
                self.canonical_id = format!("-{}", resolved.object_id.abs());
            }
            other => {
                tracing::debug!(
                    kind = %other,
                    id = %self.canonical_id,
                    "Screen name resolved to unsupported object type, keeping original"
                );
            }
        }
    }

    /// Owner reference for `wall.get`.
    ///
    /// Community ids stored without a sign are negated; screen names pass
    /// through and are sent as `domain` by the client.
    pub fn wall_owner(&self) -> String {
        if self.source_type.is_community()
            && is_numeric_id(&self.canonical_id)
            && !self.canonical_id.starts_with('-')
        {
            format!("-{}", self.canonical_id)
        } else {
            self.canonical_id.clone()
        }
    }

    /// Absolute numeric id when the canonical id is numeric.
    pub fn numeric_abs(&self) -> Option<i64> {
        if !is_numeric_id(&self.canonical_id) {
            return None;
        }
        self.canonical_id.parse::<i64>().ok().map(i64::abs)
    }
}
