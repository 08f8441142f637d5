//! Token verification for ranked play

use std::collections::HashSet;

/// Decides whether a session's token grants ranked access.
pub trait Authenticator: Send + Sync {
    fn verify(&self, token: &str) -> bool;
}

/// Rejects every token; ranked play is closed.
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyAll;

impl Authenticator for DenyAll {
    fn verify(&self, _token: &str) -> bool {
        false
    }
}

/// Accepts a fixed set of tokens (configured at startup).
#[derive(Debug, Default, Clone)]
pub struct StaticTokens {
    tokens: HashSet<String>,
}

impl StaticTokens {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens
                .into_iter()
                .map(Into::into)
                .filter(|t: &String| !t.is_empty())
                .collect(),
        }
    }
}

impl Authenticator for StaticTokens {
    fn verify(&self, token: &str) -> bool {
        self.tokens.contains(token)
    }
}
