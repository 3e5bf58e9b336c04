//! Pure decision rule: given policy, cache and a fresh registry observation
//! for one repository, decide whether to deploy and what tag to deploy.
//!
//! Deliberately free of I/O so the rule is testable from literal inputs.

use crate::tags::{latest_release_tag, tag_to_number};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    pub pinned_tag: String,
    pub auto_deploy: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheState {
    pub tags: Vec<String>,
    pub digest: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub registry_tags: Vec<String>,
    pub current_digest: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub should_deploy: bool,
    pub tag_to_deploy: Option<String>,
}

impl Verdict {
    fn no_deploy() -> Self {
        Self { should_deploy: false, tag_to_deploy: None }
    }

    fn deploy(tag: String) -> Self {
        Self { should_deploy: true, tag_to_deploy: Some(tag) }
    }
}

/// `EffectivePinnedTag`: the explicit pin if set, else the latest release
/// tag observed in `tags`.
pub fn effective_pinned_tag(pinned_tag: &str, tags: &[String]) -> Option<String> {
    if !pinned_tag.is_empty() {
        return Some(pinned_tag.to_string());
    }
    latest_release_tag(tags).ok().map(str::to_string)
}

fn new_release_available(cache: &CacheState, observed: &Observation) -> Option<String> {
    if observed.registry_tags.is_empty() {
        return None;
    }
    if observed.registry_tags == cache.tags {
        return None;
    }
    let newest = latest_release_tag(&observed.registry_tags).ok()?;
    let previous_newest = latest_release_tag(&cache.tags).ok()?;
    if tag_to_number(newest) > tag_to_number(previous_newest) {
        Some(newest.to_string())
    } else {
        None
    }
}

/// Applies the four-step rule from the decision engine.
pub fn decide(policy: &Policy, cache: &CacheState, observed: &Observation) -> Verdict {
    if !policy.auto_deploy {
        return Verdict::no_deploy();
    }

    let digest_changed = cache.digest != observed.current_digest;
    let new_release = new_release_available(cache, observed);

    if policy.pinned_tag.is_empty() {
        if let Some(tag) = new_release {
            return Verdict::deploy(tag);
        }
    }

    if digest_changed {
        if let Some(tag) = effective_pinned_tag(&policy.pinned_tag, &cache.tags) {
            return Verdict::deploy(tag);
        }
    }

    Verdict::no_deploy()
}
