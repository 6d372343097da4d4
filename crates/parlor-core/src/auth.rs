//! Moderation authorization.
//!
//! There is no role system: a single configured display name is the
//! administrator. The check sits behind a trait so a deployment can swap in
//! something stronger without touching the router.

/// Decides whether a display name may issue moderation commands.
pub trait Authorizer: Send + Sync {
    fn is_admin(&self, display_name: &str) -> bool;
}

/// One hardcoded administrator name, compared exactly.
#[derive(Debug, Clone)]
pub struct StaticAdmin {
    name: String,
}

impl StaticAdmin {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Authorizer for StaticAdmin {
    fn is_admin(&self, display_name: &str) -> bool {
        display_name == self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_configured_name_is_admin() {
        let auth = StaticAdmin::new("admin");
        assert_eq!(auth.name(), "admin");
        assert!(auth.is_admin("admin"));
        assert!(!auth.is_admin("Admin"));
        assert!(!auth.is_admin("admin "));
        assert!(!auth.is_admin("mallory"));
    }
}
