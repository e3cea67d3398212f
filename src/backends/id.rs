use std::fmt;
use std::str::FromStr;

use super::error::BackendError;

/// Separator between the segments of a canonical secret id.
pub const SEPARATOR: &str = ":";

/// Location of exactly one secret.
///
/// The canonical form is `env:team:app:path:change_token`. The first four
/// segments address the storage location; the change token only marks the
/// value that was current when the id was handed out.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecretId {
    env: String,
    team: String,
    app: String,
    path: String,
    change_token: String,
}

impl SecretId {
    pub fn new(
        env: impl Into<String>,
        team: impl Into<String>,
        app: impl Into<String>,
        path: impl Into<String>,
        change_token: impl Into<String>,
    ) -> Self {
        Self {
            env: env.into(),
            team: team.into(),
            app: app.into(),
            path: path.into(),
            change_token: change_token.into(),
        }
    }

    /// Parse the canonical five-segment form.
    pub fn parse(raw: &str) -> Result<Self, BackendError> {
        let parts: Vec<&str> = raw.split(SEPARATOR).collect();
        let [env, team, app, path, change_token] = parts.as_slice() else {
            return Err(BackendError::invalid_secret_id(raw));
        };

        if env.is_empty() || ![env, team, app].iter().all(|s| is_valid_segment(s)) {
            return Err(BackendError::invalid_secret_id(raw));
        }
        // An application cannot exist without a team
        if !app.is_empty() && team.is_empty() {
            return Err(BackendError::invalid_secret_id(raw));
        }
        // The variable name must map to exactly one vault variable
        let name = variable_name(path);
        if name.is_empty() || name.trim() != name {
            return Err(BackendError::invalid_secret_id(raw));
        }

        Ok(Self::new(*env, *team, *app, *path, *change_token))
    }

    pub fn env(&self) -> &str {
        &self.env
    }

    pub fn team(&self) -> &str {
        &self.team
    }

    pub fn app(&self) -> &str {
        &self.app
    }

    /// Full logical path, including any sub-path.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn change_token(&self) -> &str {
        &self.change_token
    }

    /// First path segment: the name of the stored variable.
    pub fn variable_name(&self) -> &str {
        variable_name(&self.path)
    }

    /// Everything after the first path segment, if anything.
    pub fn sub_path(&self) -> Option<&str> {
        sub_path(&self.path)
    }

    /// Key of the storage location, ignoring the change token.
    pub fn location(&self) -> String {
        [
            self.env.as_str(),
            self.team.as_str(),
            self.app.as_str(),
            self.path.as_str(),
        ]
        .join(SEPARATOR)
    }

    /// Key of the stored variable, shared by all of its sub-paths.
    pub fn variable_key(&self) -> String {
        [
            self.env.as_str(),
            self.team.as_str(),
            self.app.as_str(),
            self.variable_name(),
        ]
        .join(SEPARATOR)
    }

    /// Whether both ids address the same storage location.
    pub fn same_location(&self, other: &SecretId) -> bool {
        self.env == other.env
            && self.team == other.team
            && self.app == other.app
            && self.path == other.path
    }

    /// Vault path of the stored variable below `root`.
    pub fn variable_id(&self, root: &str) -> String {
        let variable = self.variable_name();
        if self.team.is_empty() {
            return clean_path(&[root, self.env.as_str(), variable]);
        }
        clean_path(&[
            root,
            self.env.as_str(),
            self.team.as_str(),
            self.app.as_str(),
            variable,
        ])
    }

    /// Sibling id at the same location carrying a new change token.
    pub fn copy_with_change_token(&self, change_token: impl Into<String>) -> Self {
        Self {
            change_token: change_token.into(),
            ..self.clone()
        }
    }

    /// Id of the whole variable this id points into.
    pub fn variable(&self) -> Self {
        Self {
            path: self.variable_name().to_string(),
            ..self.clone()
        }
    }
}

impl fmt::Display for SecretId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}",
            self.env, self.team, self.app, self.path, self.change_token
        )
    }
}

impl FromStr for SecretId {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Whether `segment` can stand as the env, team or app of an id.
///
/// Empty is allowed here; each level decides whether it may be empty.
pub fn is_valid_segment(segment: &str) -> bool {
    !segment.contains(SEPARATOR) && !segment.contains('/') && segment.trim() == segment
}

/// First segment of a `/`-delimited secret path.
pub fn variable_name(path: &str) -> &str {
    path.split_once('/').map_or(path, |(name, _)| name)
}

/// Remainder of a secret path after its first segment.
pub fn sub_path(path: &str) -> Option<&str> {
    path.split_once('/')
        .map(|(_, rest)| rest)
        .filter(|rest| !rest.is_empty())
}

/// Join path parts with `/`, dropping empty segments and surrounding whitespace.
pub fn clean_path(parts: &[&str]) -> String {
    parts
        .iter()
        .flat_map(|part| part.trim().split('/'))
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}
