//! Admission policies for host registration.

use std::collections::BTreeSet;

use crate::types::Implementation;

pub trait SecurityPolicy: Send + Sync {
    fn allow(&self, client: &Implementation) -> bool;
}

impl<F> SecurityPolicy for F
where
    F: Fn(&Implementation) -> bool + Send + Sync,
{
    fn allow(&self, client: &Implementation) -> bool {
        self(client)
    }
}

pub struct AllowAllPolicy;

impl SecurityPolicy for AllowAllPolicy {
    fn allow(&self, _client: &Implementation) -> bool {
        true
    }
}

/// Admits clients whose name is on the list.
pub struct AllowListPolicy {
    names: BTreeSet<String>,
}

impl AllowListPolicy {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl SecurityPolicy for AllowListPolicy {
    fn allow(&self, client: &Implementation) -> bool {
        self.names.contains(&client.name)
    }
}
