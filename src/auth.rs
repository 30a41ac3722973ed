use std::fmt;

use serde::{Deserialize, Serialize};

/// GitLab personal access token.
///
/// Kept out of `Debug` output so configurations can be logged safely.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Token {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(***)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_the_secret() {
        let token = Token::from("glpat-secret");
        assert_eq!(format!("{token:?}"), "Token(***)");
        assert_eq!(token.as_str(), "glpat-secret");
    }

    #[test]
    fn whitespace_only_token_is_blank() {
        assert!(Token::from("  ").is_blank());
        assert!(!Token::from("f00b4r").is_blank());
    }
}
