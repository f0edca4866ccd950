//! Capability gate consumed before any override mutation. The decision
//! logic itself lives outside this core; here it is a trait seam with the
//! allow-all implementation a local sidecar ships with.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

pub trait Authorizer {
    fn authorize(&self, actor: &str, permission: &str) -> Decision;
}

/// Local-sidecar trust model: the process speaks to one trusted caller.
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn authorize(&self, _actor: &str, _permission: &str) -> Decision {
        Decision::Allow
    }
}

/// Fixed (actor, permission) grant list; everything else is denied.
#[cfg(test)]
pub struct StaticGrants(pub Vec<(String, String)>);

#[cfg(test)]
impl Authorizer for StaticGrants {
    fn authorize(&self, actor: &str, permission: &str) -> Decision {
        if self
            .0
            .iter()
            .any(|(a, p)| a == actor && p == permission)
        {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }
}
