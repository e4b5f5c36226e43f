//! AuthoritySlot: allow/deny by caller origin.

use std::sync::Arc;

use crate::error::BlockError;
use crate::rules::AuthorityRule;
use crate::rules::AuthorityStrategy;

pub fn check(rules: &[Arc<AuthorityRule>], origin: &str) -> Result<(), BlockError> {
    for rule in rules {
        let matches = rule.tokens().any(|t| t == origin);
        let blocked = match rule.strategy {
            AuthorityStrategy::White => !matches,
            AuthorityStrategy::Black => matches,
        };
        if blocked {
            return Err(BlockError::Authority { rule: rule.clone() });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::AuthorityRule;

    #[test]
    fn whitelist_rejects_unknown_origin() {
        let rule = Arc::new(AuthorityRule {
            resource: "res".into(),
            strategy: AuthorityStrategy::White,
            limit_app: "alpha, beta".into(),
        });
        assert!(check(&[rule.clone()], "alpha").is_ok());
        assert!(check(&[rule], "gamma").is_err());
    }

    #[test]
    fn blacklist_rejects_listed_origin() {
        let rule = Arc::new(AuthorityRule {
            resource: "res".into(),
            strategy: AuthorityStrategy::Black,
            limit_app: "gamma".into(),
        });
        assert!(check(&[rule.clone()], "alpha").is_ok());
        assert!(check(&[rule], "gamma").is_err());
    }
}
