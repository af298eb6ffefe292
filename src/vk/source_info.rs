//! Display metadata for a VK source.
//!
//! Lookups are total: every failure path ends in a synthesized fallback so
//! that metadata can never block a feed render.

use super::client::VkClient;
use super::resolver::ResolvedSource;
use super::types::SourceType;

/// Title/link/description/image describing a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMetadata {
    pub title: String,
    pub link: String,
    pub description: String,
    pub image: Option<String>,
}

impl SourceMetadata {
    /// Placeholder used whenever VK cannot describe the source.
    pub fn fallback(source: &ResolvedSource) -> Self {
        let id = &source.canonical_id;
        let link = match source.numeric_abs() {
            Some(n) if source.source_type.is_community() => format!("https://vk.com/club{}", n),
            Some(n) => format!("https://vk.com/id{}", n),
            None => format!("https://vk.com/{}", id),
        };
        Self {
            title: format!("VK {} {}", source.source_type.label(), id),
            link,
            description: format!("Content from VK {} {}", source.source_type.as_str(), id),
            image: None,
        }
    }
}

/// Resolved source together with its metadata.
///
/// The feed pipeline needs both: the refined owner id for `wall.get` and
/// the metadata for the channel header.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub source: ResolvedSource,
    pub metadata: SourceMetadata,
}

/// Describes a stored `(source_type, source_id)` pair.
pub async fn get_source_info(
    client: &VkClient,
    source_type: SourceType,
    source_id: &str,
) -> SourceMetadata {
    lookup_source(client, source_type, source_id).await.metadata
}

/// Resolves and describes a source. Never fails.
pub async fn lookup_source(
    client: &VkClient,
    source_type: SourceType,
    source_id: &str,
) -> SourceInfo {
    let mut source = ResolvedSource::from_configured(source_type, source_id);

    if source.needs_remote_resolution() {
        match client.resolve_screen_name(&source.canonical_id).await {
            Ok(Some(resolved)) => source.apply_screen_name(&resolved),
            Ok(None) => {
                tracing::debug!(screen_name = %source.canonical_id, "Screen name not known to VK");
            }
            Err(e) => {
                tracing::warn!(
                    screen_name = %source.canonical_id,
                    error = %e,
                    "Screen name resolution failed, keeping configured source"
                );
            }
        }
    }

    let metadata = match fetch_metadata(client, &source).await {
        Some(metadata) => metadata,
        None => SourceMetadata::fallback(&source),
    };

    SourceInfo { source, metadata }
}

async fn fetch_metadata(client: &VkClient, source: &ResolvedSource) -> Option<SourceMetadata> {
    // Lookup methods take unsigned ids or screen names.
    let lookup_id = source
        .numeric_abs()
        .map(|n| n.to_string())
        .unwrap_or_else(|| source.canonical_id.clone());

    if source.source_type.is_community() {
        let groups = match client.get_group_info(&lookup_id).await {
            Ok(groups) => groups,
            Err(e) => {
                tracing::warn!(source_id = %lookup_id, error = %e, "Community lookup failed");
                return None;
            }
        };
        let group = groups.into_iter().next()?;
        let link = match group.screen_name.as_deref().filter(|s| !s.is_empty()) {
            Some(screen_name) => format!("https://vk.com/{}", screen_name),
            None => format!("https://vk.com/club{}", group.id.abs()),
        };
        Some(SourceMetadata {
            title: group.name,
            link,
            description: group.description,
            image: group.photo_100,
        })
    } else {
        let users = match client.get_user_info(&lookup_id).await {
            Ok(users) => users,
            Err(e) => {
                tracing::warn!(source_id = %lookup_id, error = %e, "User lookup failed");
                return None;
            }
        };
        let user = users.into_iter().next()?;
        let name = format!("{} {}", user.first_name, user.last_name)
            .trim()
            .to_string();
        Some(SourceMetadata {
            description: format!("VK user profile for {}", name),
            title: name,
            link: format!("https://vk.com/id{}", user.id),
            image: user.photo_100,
        })
    }
}
