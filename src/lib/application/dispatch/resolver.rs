use crate::application::backend::JobBackend;
use crate::domain::CanonicalError;
use crate::domain::records::job_ids;
use tracing::debug;

/// Expands a possibly shortened job identifier to the full one.
///
/// Full-form UUIDs are passed through untouched. Anything shorter is matched
/// against a fresh job listing; nothing is cached between calls.
pub async fn resolve_job_id(
    backend: &dyn JobBackend,
    supplied: &str,
) -> Result<String, CanonicalError> {
    let supplied = supplied.trim();
    if supplied.is_empty() {
        return Err(CanonicalError::validation("job identifier must not be empty"));
    }
    if is_full_uuid(supplied) {
        return Ok(supplied.to_string());
    }

    let listing = backend.list_jobs().await?;
    let known = job_ids(&listing.data);
    let resolved = match_prefix(supplied, &known)?;
    if resolved != supplied {
        debug!(prefix = supplied, job_uuid = %resolved, "Resolved job identifier prefix");
    }
    Ok(resolved)
}

/// Exact match wins; otherwise exactly one identifier must start with `supplied`.
pub fn match_prefix(supplied: &str, known: &[String]) -> Result<String, CanonicalError> {
    if known.iter().any(|id| id == supplied) {
        return Ok(supplied.to_string());
    }

    let mut candidates: Vec<String> = known
        .iter()
        .filter(|id| id.starts_with(supplied))
        .cloned()
        .collect();
    candidates.sort();
    candidates.dedup();

    match candidates.len() {
        0 => Err(CanonicalError::not_found(format!(
            "no job matches identifier '{supplied}'"
        ))),
        1 => Ok(candidates.remove(0)),
        _ => Err(CanonicalError::ambiguous(supplied, &candidates)),
    }
}

/// 8-4-4-4-12 hexadecimal groups.
fn is_full_uuid(candidate: &str) -> bool {
    const GROUPS: [usize; 5] = [8, 4, 4, 4, 12];
    let parts: Vec<&str> = candidate.split('-').collect();
    parts.len() == GROUPS.len()
        && parts
            .iter()
            .zip(GROUPS)
            .all(|(part, len)| part.len() == len && part.chars().all(|c| c.is_ascii_hexdigit()))
}
