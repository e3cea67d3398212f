//! Policy documents that declare or retract tenant scaffolding in the vault.

use std::fmt::Write;

use super::id::clean_path;

/// Branch name the vault uses for an empty root policy path.
pub const ROOT_BRANCH: &str = "root";

/// How a policy document is applied to a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyMode {
    /// Add records to the branch (POST).
    Post,
    /// Add or delete records in the branch (PATCH).
    Patch,
}

impl PolicyMode {
    pub fn method(&self) -> reqwest::Method {
        match self {
            PolicyMode::Post => reqwest::Method::POST,
            PolicyMode::Patch => reqwest::Method::PATCH,
        }
    }
}

/// A policy document loaded into a branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Policy {
    /// Declare a child policy holding the given variables.
    Declare { id: String, variables: Vec<String> },
    /// Delete a child policy and everything below it.
    Delete { id: String },
}

impl Policy {
    pub fn declare<I, S>(id: impl Into<String>, variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Policy::Declare {
            id: id.into(),
            variables: variables.into_iter().map(Into::into).collect(),
        }
    }

    pub fn delete(id: impl Into<String>) -> Self {
        Policy::Delete { id: id.into() }
    }

    /// Id of the child policy this document touches.
    pub fn id(&self) -> &str {
        match self {
            Policy::Declare { id, .. } | Policy::Delete { id } => id,
        }
    }

    /// The YAML body sent to the vault.
    pub fn render(&self) -> String {
        let mut out = String::new();
        match self {
            Policy::Declare { id, variables } => {
                let _ = write!(out, "\n- !policy\n  id: {}\n  body:\n", id);
                for variable in variables {
                    let _ = writeln!(out, "  - !variable {}", variable);
                }
            }
            Policy::Delete { id } => {
                let _ = write!(out, "\n- !delete\n  record: !policy {}\n", id);
            }
        }
        out
    }
}

/// Branch below `root` addressed by `parts`, normalized.
pub fn branch(root: &str, parts: &[&str]) -> String {
    let mut all = Vec::with_capacity(parts.len() + 1);
    all.push(root);
    all.extend_from_slice(parts);
    clean_path(&all)
}

/// Name of the branch as the vault API expects it.
pub fn branch_name(branch: &str) -> &str {
    if branch.is_empty() {
        ROOT_BRANCH
    } else {
        branch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_environment_policy() {
        let policy = Policy::declare("test-env", ["zones"]);
        assert_eq!(
            policy.render(),
            "\n- !policy\n  id: test-env\n  body:\n  - !variable zones\n"
        );
    }

    #[test]
    fn test_render_team_policy() {
        let policy = Policy::declare("test-team", ["clientSecret", "teamToken"]);
        assert_eq!(
            policy.render(),
            "\n- !policy\n  id: test-team\n  body:\n  - !variable clientSecret\n  - !variable teamToken\n"
        );
    }

    #[test]
    fn test_render_delete_policy() {
        let policy = Policy::delete("test-app");
        assert_eq!(policy.render(), "\n- !delete\n  record: !policy test-app\n");
        assert_eq!(policy.id(), "test-app");
    }

    #[test]
    fn test_branch() {
        assert_eq!(branch("controlplane", &[]), "controlplane");
        assert_eq!(branch("controlplane", &["dev"]), "controlplane/dev");
        assert_eq!(branch("/controlplane/", &["dev", "team-x"]), "controlplane/dev/team-x");
        assert_eq!(branch("", &["dev"]), "dev");
        assert_eq!(branch_name(&branch("", &[])), "root");
    }
}
