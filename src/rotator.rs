//! Profile rotator: picks which catalogue profile a request should use,
//! either pinned (direct `X-IDENTIFIER` lookup) or rotated (`auto-rotate` /
//! `random`), with optional per-session stickiness.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::profiles::{Catalogue, Profile};

/// Request identifiers that are treated as an explicit rotation request
/// rather than a concrete catalogue id.
pub const ROTATE_KEYWORDS: &[&str] = &["auto-rotate", "random"];

/// Hard-coded fallbacks used when rotation is off and `enabled_profile_ids`
/// can't supply an answer.
const HARD_FALLBACK_PRIMARY: &str = "chrome138";
const HARD_FALLBACK_SECONDARY: &str = "chrome";

pub fn is_rotate_keyword(identifier: &str) -> bool {
    ROTATE_KEYWORDS.contains(&identifier)
}

/// Mutable rotation policy.
#[derive(Debug, Clone)]
pub struct RotationConfig {
    pub enabled_profile_ids: Vec<String>,
    pub rotation_enabled: bool,
    pub session_sticky: bool,
}

impl Default for RotationConfig {
    fn default() -> Self {
        // Out of the box: rotation off (the default `X-IDENTIFIER: chrome`
        // is resolved directly against the catalogue without touching the
        // rotator at all), sticky-by-default once an operator turns rotation
        // on, seeded with every known profile.
        Self {
            enabled_profile_ids: Catalogue::new().list(),
            rotation_enabled: false,
            session_sticky: true,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RotatorStats {
    pub sticky_entries: usize,
    pub enabled_profiles: usize,
    pub rotation_enabled: bool,
    pub session_sticky: bool,
}

struct RotatorState {
    config: RotationConfig,
    sticky_map: HashMap<String, String>,
}

pub struct Rotator {
    catalogue: Catalogue,
    state: RwLock<RotatorState>,
}

impl Rotator {
    pub fn new(catalogue: Catalogue) -> Self {
        Self::with_config(catalogue, RotationConfig::default())
    }

    pub fn with_config(catalogue: Catalogue, config: RotationConfig) -> Self {
        Self {
            catalogue,
            state: RwLock::new(RotatorState {
                config,
                sticky_map: HashMap::new(),
            }),
        }
    }

    /// The hot-path operation: resolve a profile for a (possibly empty)
    /// session id under the current rotation policy. Always returns a
    /// profile — per the spec, the only true failure mode (an empty
    /// catalogue) degrades through two hard-coded fallback ids before
    /// giving up, which would indicate a programmer error at startup.
    pub fn resolve(&self, session_id: &str) -> Option<(&'static Profile, String)> {
        let mut state = self.state.write();

        if !state.config.rotation_enabled {
            if let Some(first_id) = state.config.enabled_profile_ids.first().cloned() {
                if let Some(p) = self.catalogue.get(&first_id) {
                    return Some((p, first_id));
                }
            }
            return self.hard_fallback();
        }

        if state.config.session_sticky && !session_id.is_empty() {
            if let Some(sticky_id) = state.sticky_map.get(session_id).cloned() {
                if let Some(p) = self.catalogue.get(&sticky_id) {
                    return Some((p, sticky_id));
                }
                // Stale mapping: the profile was removed from the catalogue
                // view (or never existed); purge and fall through to a
                // fresh draw.
                state.sticky_map.remove(session_id);
            }
        }

        if state.config.enabled_profile_ids.is_empty() {
            // Rotation is on but nothing is enabled to rotate through; the
            // same hard fallback as the rotation-off path applies.
            return self.hard_fallback();
        }

        let idx = random_index(state.config.enabled_profile_ids.len());
        let chosen_id = state.config.enabled_profile_ids[idx].clone();
        let profile = match self.catalogue.get(&chosen_id) {
            Some(p) => p,
            None => return self.hard_fallback(),
        };

        if state.config.session_sticky && !session_id.is_empty() {
            state
                .sticky_map
                .insert(session_id.to_string(), chosen_id.clone());
        }

        Some((profile, chosen_id))
    }

    /// The last-resort fallback shared by every branch of [`Rotator::resolve`]:
    /// try `chrome138`, then `chrome`. Only fails if the catalogue itself is
    /// empty, which would indicate a programmer error at startup.
    fn hard_fallback(&self) -> Option<(&'static Profile, String)> {
        if let Some(p) = self.catalogue.get(HARD_FALLBACK_PRIMARY) {
            return Some((p, HARD_FALLBACK_PRIMARY.to_string()));
        }
        self.catalogue
            .get(HARD_FALLBACK_SECONDARY)
            .map(|p| (p, HARD_FALLBACK_SECONDARY.to_string()))
    }

    /// Resolve an `X-IDENTIFIER` value: a concrete id is looked up directly
    /// against the catalogue (the rotator is never consulted); `auto-rotate`
    /// / `random` dispatch to [`Rotator::resolve`] even if rotation is
    /// globally disabled.
    pub fn resolve_identifier(
        &self,
        identifier: &str,
        session_id: &str,
    ) -> Option<(&'static Profile, String)> {
        if is_rotate_keyword(identifier) {
            return self.resolve(session_id);
        }
        self.catalogue
            .get(identifier)
            .map(|p| (p, identifier.to_string()))
    }

    pub fn get_config(&self) -> RotationConfig {
        self.state.read().config.clone()
    }

    pub fn update_config(&self, new_config: RotationConfig) {
        let mut state = self.state.write();
        let sticky_was_on = state.config.session_sticky;
        state.config = new_config;
        if sticky_was_on && !state.config.session_sticky {
            state.sticky_map.clear();
        }
    }

    pub fn set_rotation_enabled(&self, enabled: bool) {
        self.state.write().config.rotation_enabled = enabled;
    }

    pub fn add_enabled_profile(&self, id: &str) {
        let mut state = self.state.write();
        if !state.config.enabled_profile_ids.iter().any(|e| e == id) {
            state.config.enabled_profile_ids.push(id.to_string());
        }
    }

    pub fn remove_enabled_profile(&self, id: &str) {
        let mut state = self.state.write();
        state.config.enabled_profile_ids.retain(|e| e != id);
        state.sticky_map.retain(|_, v| v != id);
    }

    pub fn clear_sticky_mappings(&self) {
        self.state.write().sticky_map.clear();
    }

    pub fn stats(&self) -> RotatorStats {
        let state = self.state.read();
        RotatorStats {
            sticky_entries: state.sticky_map.len(),
            enabled_profiles: state.config.enabled_profile_ids.len(),
            rotation_enabled: state.config.rotation_enabled,
            session_sticky: state.config.session_sticky,
        }
    }
}

/// Draw a uniform index in `[0, len)` using the OS's cryptographic RNG,
/// falling back to index 0 if the syscall fails (spec §4.2 step 3).
fn random_index(len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let mut buf = [0u8; 8];
    match getrandom::getrandom(&mut buf) {
        Ok(()) => (u64::from_le_bytes(buf) % len as u64) as usize,
        Err(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn rotator_with(ids: &[&str], rotation_enabled: bool, session_sticky: bool) -> Rotator {
        Rotator::with_config(
            Catalogue::new(),
            RotationConfig {
                enabled_profile_ids: ids.iter().map(|s| s.to_string()).collect(),
                rotation_enabled,
                session_sticky,
            },
        )
    }

    #[test]
    fn rotation_off_always_returns_first_enabled() {
        let rotator = rotator_with(&["firefox", "chrome", "edge"], false, true);
        for sid in ["", "a", "b", "c"] {
            let (_, id) = rotator.resolve(sid).unwrap();
            assert_eq!(id, "firefox");
        }
    }

    #[test]
    fn rotation_off_empty_enabled_falls_back_to_chrome138() {
        let rotator = rotator_with(&[], false, true);
        let (_, id) = rotator.resolve("anything").unwrap();
        assert_eq!(id, "chrome138");
    }

    #[test]
    fn sticky_rotation_pins_per_session() {
        let rotator = rotator_with(&["chrome", "firefox", "edge", "safari"], true, true);
        let (_, first) = rotator.resolve("session-1").unwrap();
        for _ in 0..9 {
            let (_, next) = rotator.resolve("session-1").unwrap();
            assert_eq!(next, first);
        }
    }

    #[test]
    fn sticky_rotation_is_independent_across_sessions() {
        let rotator = rotator_with(
            &["chrome", "firefox", "edge", "safari", "chrome120", "okhttp"],
            true,
            true,
        );
        let mut distribution: HashMap<String, u32> = HashMap::new();
        for i in 0..600 {
            let sid = format!("sess-{i}");
            let (_, id) = rotator.resolve(&sid).unwrap();
            *distribution.entry(id).or_insert(0) += 1;
        }
        // every enabled profile should have been chosen at least once over
        // enough independent sessions
        assert!(distribution.len() >= 4, "distribution too narrow: {distribution:?}");
    }

    #[test]
    fn auto_rotate_keyword_forces_dispatch_even_when_disabled() {
        let rotator = rotator_with(&["edge"], false, true);
        let (_, id) = rotator.resolve_identifier("auto-rotate", "s1").unwrap();
        assert_eq!(id, "edge");
    }

    #[test]
    fn concrete_identifier_bypasses_rotator_entirely() {
        let rotator = rotator_with(&["edge"], true, true);
        // even with rotation enabled and a different enabled set, a concrete
        // id is resolved directly against the catalogue
        let (_, id) = rotator.resolve_identifier("firefox", "s1").unwrap();
        assert_eq!(id, "firefox");
    }

    #[test]
    fn unknown_concrete_identifier_is_none() {
        let rotator = rotator_with(&["chrome"], true, true);
        assert!(rotator.resolve_identifier("nope", "s1").is_none());
    }

    #[test]
    fn turning_off_sticky_clears_map() {
        let rotator = rotator_with(&["chrome", "firefox"], true, true);
        rotator.resolve("s1");
        assert_eq!(rotator.stats().sticky_entries, 1);

        let mut cfg = rotator.get_config();
        cfg.session_sticky = false;
        rotator.update_config(cfg);
        assert_eq!(rotator.stats().sticky_entries, 0);
    }

    #[test]
    fn removing_profile_purges_its_sticky_entries() {
        let rotator = rotator_with(&["chrome", "firefox"], true, true);
        let (_, chosen) = rotator.resolve("s1").unwrap();
        assert_eq!(rotator.stats().sticky_entries, 1);
        rotator.remove_enabled_profile(&chosen);
        assert_eq!(rotator.stats().sticky_entries, 0);
    }

    #[test]
    fn rotation_on_with_no_enabled_profiles_falls_back_to_chrome138() {
        let rotator = rotator_with(&[], true, true);
        let (_, id) = rotator.resolve("fresh-session").unwrap();
        assert_eq!(id, "chrome138");
    }

    #[test]
    fn draining_enabled_profiles_while_rotation_is_on_falls_back_instead_of_erroring() {
        let rotator = rotator_with(&["edge"], true, true);
        let (_, chosen) = rotator.resolve("s1").unwrap();
        rotator.remove_enabled_profile(&chosen);
        let (_, id) = rotator.resolve("s2").unwrap();
        assert_eq!(id, "chrome138");
    }

    #[test]
    fn stale_sticky_mapping_is_purged_and_reresolved() {
        let rotator = rotator_with(&["chrome"], true, true);

        // Plant a sticky mapping pointing at an id absent from the
        // catalogue entirely, simulating a stale entry left behind by a
        // config change that predates this process's catalogue.
        rotator
            .state
            .write()
            .sticky_map
            .insert("s1".to_string(), "long-removed-profile".to_string());
        assert_eq!(rotator.stats().sticky_entries, 1);

        let (_, resolved) = rotator.resolve("s1").unwrap();
        assert_eq!(resolved, "chrome");
        // the stale entry was purged and replaced with a fresh draw
        assert_eq!(
            rotator.state.read().sticky_map.get("s1").cloned(),
            Some("chrome".to_string())
        );
    }
}
