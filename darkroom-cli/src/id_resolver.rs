//! ID resolver module
//!
//! Resolves UUID prefixes to full project UUIDs by querying the API,
//! so users can type short, unambiguous prefixes instead of full UUIDs.

use anyhow::{Context, Result, anyhow};
use darkroom_client::DarkroomClient;
use uuid::Uuid;

use crate::types::IdOrPrefix;

/// Resolve a project ID or prefix to a full UUID
///
/// If the input is already a full UUID, returns it immediately.
/// Otherwise, fetches all projects and finds the one matching the prefix.
///
/// # Errors
/// Returns an error if:
/// - No project matches the prefix
/// - Multiple projects match the prefix (ambiguous)
/// - API call fails
pub async fn resolve_project_id(client: &DarkroomClient, id_or_prefix: &IdOrPrefix) -> Result<Uuid> {
    if let Some(uuid) = id_or_prefix.as_uuid() {
        return Ok(uuid);
    }

    let prefix = id_or_prefix.as_str().to_lowercase();

    let projects = client
        .list_projects()
        .await
        .context("Failed to fetch projects for ID resolution")?;

    let ids: Vec<Uuid> = projects.iter().map(|p| p.id).collect();
    match_prefix(&prefix, &ids)
}

fn match_prefix(prefix: &str, ids: &[Uuid]) -> Result<Uuid> {
    let matches: Vec<&Uuid> = ids
        .iter()
        .filter(|id| id.to_string().starts_with(prefix))
        .collect();

    match matches.as_slice() {
        [] => Err(anyhow!("No project found with ID starting with '{}'", prefix)),
        [id] => Ok(**id),
        _ => {
            let ids: Vec<String> = matches.iter().map(|id| id.to_string()).collect();
            Err(anyhow!(
                "Ambiguous prefix '{}' matches multiple projects: {}",
                prefix,
                ids.join(", ")
            ))
        }
    }
}
