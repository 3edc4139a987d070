//! Locations in the remote tree.
//!
//! Group records live under `groups/{group}`, their members under
//! `groups/{group}/members/{member}` and every user's group index under
//! `users/{user}/groups/{group}`. Group images share the `groups/{group}`
//! key in the blob namespace.

use thiserror::Error;

pub const GROUPS: &str = "groups";

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum PathError {
    #[error("path `{0}` contains an empty segment")]
    EmptySegment(String),

    #[error("path `{0}` contains a forbidden character")]
    ForbiddenCharacter(String),

    #[error("path `{ancestor}` overlaps `{descendant}` in the same update")]
    Overlap { ancestor: String, descendant: String },
}

pub fn group(group_id: &str) -> String {
    format!("{GROUPS}/{group_id}")
}

pub fn group_members(group_id: &str) -> String {
    format!("{GROUPS}/{group_id}/members")
}

pub fn group_member(group_id: &str, member_id: &str) -> String {
    format!("{GROUPS}/{group_id}/members/{member_id}")
}

pub fn user_groups(user_id: &str) -> String {
    format!("users/{user_id}/groups")
}

pub fn user_group(user_id: &str, group_id: &str) -> String {
    format!("users/{user_id}/groups/{group_id}")
}

pub fn user_score(user_id: &str) -> String {
    format!("users/{user_id}/score")
}

pub fn notifications(user_id: &str) -> String {
    format!("notifications/{user_id}")
}

pub fn group_image(group_id: &str) -> String {
    group(group_id)
}

pub fn child(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}/{key}")
    }
}

/// Trims surrounding slashes and validates every segment. The empty path is the root.
pub fn normalize(path: &str) -> Result<String, PathError> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Ok(String::new());
    }
    for segment in trimmed.split('/') {
        if segment.is_empty() {
            return Err(PathError::EmptySegment(path.to_string()));
        }
        if segment.contains(|c: char| matches!(c, '.' | '#' | '$' | '[' | ']')) {
            return Err(PathError::ForbiddenCharacter(path.to_string()));
        }
    }
    Ok(trimmed.to_string())
}

pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// True when `ancestor` is `path` itself or one of its parents.
pub fn is_ancestor(ancestor: &str, path: &str) -> bool {
    ancestor.is_empty()
        || ancestor == path
        || (path.starts_with(ancestor) && path.as_bytes().get(ancestor.len()) == Some(&b'/'))
}

/// Paths written by one update must be disjoint subtrees.
pub fn check_disjoint<'a>(paths: impl IntoIterator<Item = &'a str>) -> Result<(), PathError> {
    let paths: Vec<&str> = paths.into_iter().collect();
    for (i, a) in paths.iter().enumerate() {
        for b in &paths[i + 1..] {
            let (ancestor, descendant) = if a.len() <= b.len() { (a, b) } else { (b, a) };
            if is_ancestor(ancestor, descendant) {
                return Err(PathError::Overlap {
                    ancestor: ancestor.to_string(),
                    descendant: descendant.to_string(),
                });
            }
        }
    }
    Ok(())
}
