use std::str::FromStr;

use crate::error::{ArchiveError, ArchiveResult};

/// Longest accepted dotted name. Generous for real module trees while
/// keeping index entries bounded.
const MAX_NAME_LEN: usize = 255;

/// A validated dotted module name, e.g. `pkg.sub.leaf`.
///
/// Archive records, name lists, and the module registry are all keyed by
/// these. Each dot-separated component must start with a letter or
/// underscore and continue with letters, digits, or underscores.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleName(String);

impl ModuleName {
    pub fn parse(text: &str) -> ArchiveResult<Self> {
        if text.is_empty() {
            return Err(invalid(text, "empty name"));
        }
        if text.len() > MAX_NAME_LEN {
            return Err(invalid(text, "name too long"));
        }
        for component in text.split('.') {
            let mut chars = component.chars();
            match chars.next() {
                None => return Err(invalid(text, "empty component")),
                Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
                Some(_) => {
                    return Err(invalid(text, "component must start with a letter or underscore"))
                }
            }
            if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(invalid(
                    text,
                    "component may only contain letters, digits, and underscores",
                ));
            }
        }
        Ok(Self(text.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    pub fn is_top_level(&self) -> bool {
        !self.0.contains('.')
    }

    /// The component after the last dot.
    pub fn last_component(&self) -> &str {
        match self.0.rsplit_once('.') {
            Some((_, last)) => last,
            None => &self.0,
        }
    }

    /// The enclosing package, if any.
    pub fn parent(&self) -> Option<ModuleName> {
        self.0.rsplit_once('.').map(|(parent, _)| ModuleName(parent.to_string()))
    }

    /// All proper ancestors, outermost first: `a.b.c` yields `a`, `a.b`.
    pub fn ancestry(&self) -> Vec<ModuleName> {
        let mut out = Vec::new();
        for (i, b) in self.0.bytes().enumerate() {
            if b == b'.' {
                out.push(ModuleName(self.0[..i].to_string()));
            }
        }
        out
    }
}

fn invalid(text: &str, reason: &str) -> ArchiveError {
    ArchiveError::InvalidName { text: text.to_string(), reason: reason.to_string() }
}

impl FromStr for ModuleName {
    type Err = ArchiveError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Self::parse(text)
    }
}

impl std::fmt::Display for ModuleName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ModuleName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_reasonable_names() {
        for ok in ["a", "_private", "encodings", "pkg.sub", "a1.b2._c3", "x.y.z.w"] {
            assert!(ModuleName::parse(ok).is_ok(), "{ok} should parse");
        }
    }

    #[test]
    fn rejects_malformed_names() {
        for bad in ["", ".", "a.", ".a", "a..b", "1a", "a.1b", "a-b", "a b", "a/b", "a.b!"] {
            assert!(ModuleName::parse(bad).is_err(), "{bad} should fail");
        }
    }

    #[test]
    fn rejects_oversized_names() {
        let long = "a".repeat(MAX_NAME_LEN + 1);
        assert!(ModuleName::parse(&long).is_err());
    }

    #[test]
    fn parent_and_ancestry() {
        let leaf = ModuleName::parse("a.b.c").unwrap();
        assert_eq!(leaf.parent().unwrap().as_str(), "a.b");
        assert_eq!(
            leaf.ancestry().iter().map(ModuleName::as_str).collect::<Vec<_>>(),
            vec!["a", "a.b"]
        );
        assert_eq!(leaf.last_component(), "c");
        assert!(!leaf.is_top_level());

        let top = ModuleName::parse("solo").unwrap();
        assert!(top.parent().is_none());
        assert!(top.ancestry().is_empty());
        assert!(top.is_top_level());
        assert_eq!(top.last_component(), "solo");
    }
}
