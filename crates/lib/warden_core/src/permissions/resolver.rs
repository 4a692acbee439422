//! Field access resolution over a permissions map.
//!
//! [`resolve`] is a pure function of its inputs, so callers may memoize it
//! per `(type, field, privileges, map id)`.

use std::collections::HashSet;

use crate::config::PermissionsConfig;
use crate::models::permissions::{DefaultAccess, PermissionsMapEntries};

pub const WILDCARD: &str = "*";
pub const AUTHORIZED: &str = "authorized";

/// Paths answered by schema introspection.
const INTROSPECTION_PATHS: [&str; 3] = ["Query.__schema", "Query.__type", "Query.__Directive"];

/// Policy knobs that apply to every field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    pub require_authorization: bool,
    pub enable_introspection: bool,
    pub default_access: DefaultAccess,
}

impl From<&PermissionsConfig> for ResolveOptions {
    fn from(config: &PermissionsConfig) -> Self {
        Self {
            require_authorization: config.require_authorization,
            enable_introspection: config.enable_introspection,
            default_access: config.default_access,
        }
    }
}

/// Decide whether a caller holding `privileges` may access
/// `type_name.field_name`.
///
/// `require_privileges` are extra privileges the field always demands on top
/// of its map entries. Every grant entry must be satisfied, not just one.
pub fn resolve(
    map: &PermissionsMapEntries,
    privileges: &HashSet<String>,
    type_name: &str,
    field_name: &str,
    require_privileges: &[String],
    options: &ResolveOptions,
) -> bool {
    let path = format!("{type_name}.{field_name}");
    let wildcard = map.get(&format!("{type_name}.{WILDCARD}"));
    let exact = map.get(&path);

    let mut grant: Vec<String> = wildcard
        .into_iter()
        .chain(exact)
        .flat_map(|r| r.grant.iter().cloned())
        .chain(require_privileges.iter().cloned())
        .collect();
    let mut restrict: Vec<String> = wildcard
        .into_iter()
        .chain(exact)
        .flat_map(|r| r.restrict.iter().cloned())
        .collect();

    if options.require_authorization {
        grant.push(AUTHORIZED.to_string());
    }

    if INTROSPECTION_PATHS.contains(&path.as_str()) {
        if options.enable_introspection {
            grant = vec![WILDCARD.to_string()];
            restrict = Vec::new();
        } else {
            grant = Vec::new();
            restrict = vec![WILDCARD.to_string()];
        }
    }

    collapse_wildcard(&mut grant);
    collapse_wildcard(&mut restrict);

    let holds_wildcard = privileges.contains(WILDCARD);
    let need_to_restrict = restrict
        .iter()
        .any(|r| r == WILDCARD || privileges.contains(r));

    let need_to_grant = if grant.is_empty() {
        options.default_access == DefaultAccess::Grant
    } else {
        grant
            .iter()
            .all(|g| g == WILDCARD || holds_wildcard || privileges.contains(g))
    };

    let mut allowed = need_to_grant && !need_to_restrict;

    // Under restrict-by-default, "authorized" alone does not open a field.
    if options.default_access == DefaultAccess::Restrict
        && allowed
        && grant.iter().all(|g| g == AUTHORIZED)
    {
        allowed = false;
    }

    allowed
}

fn collapse_wildcard(list: &mut Vec<String>) {
    if list.iter().any(|p| p == WILDCARD) {
        *list = vec![WILDCARD.to_string()];
    }
}
