use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of VK source backing a feed.
///
/// Stored as lowercase text (`user`, `group`, `page`) in the database and
/// accepted in that form from the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    User,
    Group,
    Page,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::User => "user",
            SourceType::Group => "group",
            SourceType::Page => "page",
        }
    }

    /// Communities (groups and pages) are addressed by negative owner ids.
    pub fn is_community(self) -> bool {
        matches!(self, SourceType::Group | SourceType::Page)
    }

    /// Capitalized label used in fallback titles ("VK Group -1").
    pub fn label(self) -> &'static str {
        match self {
            SourceType::User => "User",
            SourceType::Group => "Group",
            SourceType::Page => "Page",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSourceType(pub String);

impl fmt::Display for UnknownSourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown source type '{}' (expected user, group or page)",
            self.0
        )
    }
}

impl std::error::Error for UnknownSourceType {}

impl FromStr for SourceType {
    type Err = UnknownSourceType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(SourceType::User),
            "group" => Ok(SourceType::Group),
            "page" => Ok(SourceType::Page),
            other => Err(UnknownSourceType(other.to_string())),
        }
    }
}

impl TryFrom<String> for SourceType {
    type Error = UnknownSourceType;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

// ============================================================================
// Wall posts
// ============================================================================

/// `wall.get` response payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WallResponse {
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub items: Vec<WallPost>,
}

/// One post as returned by `wall.get`.
///
/// Only the fields the feed needs are modelled; everything else VK sends is
/// ignored by serde.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WallPost {
    pub id: Option<i64>,
    pub owner_id: Option<i64>,
    #[serde(default)]
    pub from_id: Option<i64>,
    /// UNIX timestamp (UTC).
    #[serde(default)]
    pub date: i64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub signer_id: Option<i64>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// A post attachment. VK tags each one with `type` and puts the payload
/// under a key of the same name, so every known payload is an optional
/// field and unknown types simply leave all of them empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(rename = "type")]
    pub kind: String,
    pub photo: Option<Photo>,
    pub link: Option<Link>,
    pub video: Option<Video>,
    pub doc: Option<Doc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    #[serde(default)]
    pub sizes: Vec<PhotoSize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhotoSize {
    pub url: Option<String>,
    #[serde(default)]
    pub width: i64,
    #[serde(default)]
    pub height: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub url: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub id: Option<i64>,
    pub owner_id: Option<i64>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Doc {
    pub url: Option<String>,
    pub title: Option<String>,
}

// ============================================================================
// Source lookups
// ============================================================================

/// `users.get` item.
#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub screen_name: Option<String>,
    pub photo_100: Option<String>,
}

/// `groups.getById` item.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupInfo {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    pub screen_name: Option<String>,
    #[serde(default)]
    pub description: String,
    pub photo_100: Option<String>,
}

/// `groups.getById` answers with a bare array up to API 5.194 and with an
/// object wrapping `groups` afterwards; accept both.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum GroupsResponse {
    List(Vec<GroupInfo>),
    Wrapped { groups: Vec<GroupInfo> },
}

impl GroupsResponse {
    pub(crate) fn into_vec(self) -> Vec<GroupInfo> {
        match self {
            GroupsResponse::List(groups) | GroupsResponse::Wrapped { groups } => groups,
        }
    }
}

/// `utils.resolveScreenName` payload. VK returns an empty array (not an
/// object) for names it does not know; the client maps that to `None`.
#[derive(Debug, Clone, Deserialize)]
pub struct ResolvedScreenName {
    #[serde(rename = "type")]
    pub kind: String,
    pub object_id: i64,
}
