//! Input validation and normalization shared by client and server.

use crate::error::CoreError;
use crate::project::{Link, NewProject, Project};

/// Error text used whenever a create/update arrives without a name.
pub const NAME_REQUIRED: &str = "Project name is required";

/// Prefix `https://` onto a url that has no `http://` or `https://` scheme.
pub fn normalize_url(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.is_empty() || trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

pub fn validate_name(name: &str) -> Result<(), CoreError> {
    if name.trim().is_empty() {
        return Err(CoreError::Validation(NAME_REQUIRED.into()));
    }
    Ok(())
}

/// Every link needs both a name and a url.
pub fn validate_links(links: &[Link]) -> Result<(), CoreError> {
    for (index, link) in links.iter().enumerate() {
        if link.name.trim().is_empty() || link.url.trim().is_empty() {
            return Err(CoreError::Validation(format!(
                "Link {} must have both a name and a url",
                index + 1
            )));
        }
    }
    Ok(())
}

/// Normalize links in place: trim names and add missing url schemes.
pub fn normalize_links(links: &mut [Link]) {
    for link in links.iter_mut() {
        *link = Link::new(&link.name, &link.url);
    }
}

fn normalize_notes(notes: &mut Option<String>) {
    if notes.as_deref().is_some_and(|n| n.trim().is_empty()) {
        *notes = None;
    }
}

/// Validate and normalize user input for a new project.
pub fn prepare_new_project(mut input: NewProject) -> Result<NewProject, CoreError> {
    validate_name(&input.name)?;
    input.name = input.name.trim().to_string();
    normalize_links(&mut input.links);
    validate_links(&input.links)?;
    normalize_notes(&mut input.notes);
    Ok(input)
}

/// Validate and normalize an edited project before it replaces the stored one.
pub fn prepare_project(mut project: Project) -> Result<Project, CoreError> {
    validate_name(&project.name)?;
    project.name = project.name.trim().to_string();
    normalize_links(&mut project.links);
    validate_links(&project.links)?;
    normalize_notes(&mut project.notes);
    Ok(project)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn url_normalization() {
        assert_eq!(normalize_url("example.com"), "https://example.com");
        assert_eq!(normalize_url("  http://a.io "), "http://a.io");
        assert_eq!(normalize_url("https://b.io/x"), "https://b.io/x");
        assert_eq!(normalize_url("   "), "");
    }

    #[test]
    fn blank_name_is_rejected() {
        assert_matches!(validate_name("   "), Err(CoreError::Validation(msg)) if msg == NAME_REQUIRED);
        assert!(validate_name("Layer0").is_ok());
    }

    #[test]
    fn link_without_url_is_rejected() {
        let links = vec![Link {
            name: "Discord".into(),
            url: String::new(),
        }];
        assert_matches!(validate_links(&links), Err(CoreError::Validation(_)));
    }

    #[test]
    fn prepare_new_project_normalizes() {
        let input = NewProject {
            name: "  Berachain ".into(),
            notes: Some("   ".into()),
            links: vec![Link {
                name: " Faucet ".into(),
                url: "faucet.example".into(),
            }],
            types: Default::default(),
        };
        let prepared = prepare_new_project(input).unwrap();
        assert_eq!(prepared.name, "Berachain");
        assert_eq!(prepared.notes, None);
        assert_eq!(prepared.links[0].name, "Faucet");
        assert_eq!(prepared.links[0].url, "https://faucet.example");
    }
}
