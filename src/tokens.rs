//! Placeholder substitution in parameter trees.
//!
//! Exported scene packages cannot know where they will be unpacked, nor which
//! machine will load them. Paths are therefore written with a base-path marker
//! and per-user values with an identity marker; both are rewritten here
//! before the parameters reach the host.

use serde_json::Value;

use crate::document::ParameterTree;

/// Marker replaced with the description's base directory
pub const PATH_TOKEN: &str = "<REPLACE|ME>";

/// Marker replaced with the caller identity
pub const IDENTITY_TOKEN: &str = "<machine-token>";

/// Substitution values plus the markers they replace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSet {
    path_marker: String,
    identity_marker: String,
    base_dir: String,
    identity: String,
}

impl TokenSet {
    /// Create a token set using the default markers
    pub fn new(base_dir: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            path_marker: PATH_TOKEN.to_string(),
            identity_marker: IDENTITY_TOKEN.to_string(),
            base_dir: base_dir.into(),
            identity: identity.into(),
        }
    }

    /// Override the markers (configured through `EngineConfig`)
    pub fn with_markers(
        mut self,
        path_marker: impl Into<String>,
        identity_marker: impl Into<String>,
    ) -> Self {
        self.path_marker = path_marker.into();
        self.identity_marker = identity_marker.into();
        self
    }

    pub fn base_dir(&self) -> &str {
        &self.base_dir
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Rewrite every string in `tree`, recursing into nested objects.
    ///
    /// Arrays, numbers, booleans and nulls are left untouched.
    pub fn substitute(&self, tree: &mut ParameterTree) {
        for value in tree.values_mut() {
            match value {
                Value::String(text) => {
                    if let Some(replaced) = self.substitute_str(text) {
                        *text = replaced;
                    }
                }
                Value::Object(child) => self.substitute(child),
                _ => {}
            }
        }
    }

    /// Returns the rewritten string, or `None` if no marker occurs in `text`.
    ///
    /// Replacement is repeated until no marker made of original text is
    /// left, so removing one marker can expose another assembled from the
    /// text around it. Bytes written by a replacement are never matched
    /// again, which bounds the work by the length of `text`.
    pub fn substitute_str(&self, text: &str) -> Option<String> {
        let has_path = !self.path_marker.is_empty() && text.contains(&self.path_marker);
        let has_identity = !self.identity_marker.is_empty() && text.contains(&self.identity_marker);
        if !has_path && !has_identity {
            return None;
        }

        let mut out = text.to_string();
        // true for bytes that came from `text`
        let mut original = vec![true; out.len()];
        while let Some((at, marker, value)) = self.next_marker(&out, &original) {
            out.replace_range(at..at + marker.len(), value);
            original.splice(at..at + marker.len(), std::iter::repeat_n(false, value.len()));
        }
        Some(out)
    }

    /// Earliest marker made only of original bytes, with its replacement value
    fn next_marker<'a>(
        &'a self,
        text: &str,
        original: &[bool],
    ) -> Option<(usize, &'a str, &'a str)> {
        let markers = [
            (self.path_marker.as_str(), self.base_dir.as_str()),
            (self.identity_marker.as_str(), self.identity.as_str()),
        ];
        text.char_indices().find_map(|(at, _)| {
            markers
                .iter()
                .filter(|(marker, _)| !marker.is_empty())
                .find(|(marker, _)| {
                    text[at..].starts_with(marker)
                        && original[at..at + marker.len()].iter().all(|&kept| kept)
                })
                .map(|&(marker, value)| (at, marker, value))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree(value: Value) -> ParameterTree {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_replaces_every_occurrence() {
        let tokens = TokenSet::new("/data", "abc123");
        let mut params = tree(json!({
            "url": "<REPLACE|ME>/a.html?from=<REPLACE|ME>/b&id=<machine-token>"
        }));
        tokens.substitute(&mut params);

        let url = params["url"].as_str().unwrap();
        assert_eq!(url, "/data/a.html?from=/data/b&id=abc123");
        assert!(!url.contains(PATH_TOKEN));
        assert!(!url.contains(IDENTITY_TOKEN));
    }

    #[test]
    fn test_recurses_into_nested_objects() {
        let tokens = TokenSet::new("/themes/neon", "user-1");
        let mut params = tree(json!({
            "outer": { "inner": { "file": "<REPLACE|ME>/data/bg.png" } }
        }));
        tokens.substitute(&mut params);
        assert_eq!(params["outer"]["inner"]["file"], json!("/themes/neon/data/bg.png"));
    }

    #[test]
    fn test_other_value_kinds_are_untouched() {
        let tokens = TokenSet::new("/data", "abc123");
        let original = tree(json!({
            "count": 3,
            "flag": true,
            "list": ["<REPLACE|ME>/x"],
            "none": null
        }));
        let mut params = original.clone();
        tokens.substitute(&mut params);
        assert_eq!(params, original);
    }

    #[test]
    fn test_absent_tokens_are_noop() {
        let tokens = TokenSet::new("/data", "abc123");
        assert_eq!(tokens.substitute_str("plain text"), None);
    }

    #[test]
    fn test_replacement_is_not_rescanned() {
        let tokens = TokenSet::new("<REPLACE|ME>", "id");
        assert_eq!(
            tokens.substitute_str("<REPLACE|ME>/x").as_deref(),
            Some("<REPLACE|ME>/x")
        );
    }

    #[test]
    fn test_marker_exposed_by_replacement_is_replaced() {
        let tokens = TokenSet::new("", "abc123");
        assert_eq!(
            tokens
                .substitute_str("<REPLACE<REPLACE|ME>|ME>/logo.png")
                .as_deref(),
            Some("/logo.png")
        );

        let tokens = TokenSet::new("/pkg", "abc123");
        assert_eq!(
            tokens
                .substitute_str("<machine<machine-token>-token>")
                .as_deref(),
            Some("<machineabc123-token>")
        );
        assert_eq!(
            TokenSet::new("", "")
                .substitute_str("<machine<machine-token>-token>/<REPLACE|<REPLACE|ME>ME>")
                .as_deref(),
            Some("/")
        );
    }

    #[test]
    fn test_identity_inside_base_dir_is_not_expanded() {
        let tokens = TokenSet::new("/home/<machine-token>", "abc123");
        assert_eq!(
            tokens
                .substitute_str("<REPLACE|ME>/a?id=<machine-token>")
                .as_deref(),
            Some("/home/<machine-token>/a?id=abc123")
        );
    }

    #[test]
    fn test_custom_markers() {
        let tokens = TokenSet::new("/opt", "me").with_markers("%BASE%", "%WHO%");
        assert_eq!(
            tokens.substitute_str("%BASE%/f?u=%WHO%").as_deref(),
            Some("/opt/f?u=me")
        );
        assert_eq!(tokens.substitute_str("<REPLACE|ME>"), None);
    }

    #[test]
    fn test_empty_marker_is_ignored() {
        let tokens = TokenSet::new("/opt", "me").with_markers("", IDENTITY_TOKEN);
        assert_eq!(tokens.substitute_str("abc"), None);
    }
}
