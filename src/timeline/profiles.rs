use dashmap::DashMap;
use nostr_sdk::prelude::*;

use crate::collaborators::ProfileDirectory;
use crate::types::Profile;

#[derive(Debug, Clone, PartialEq, Eq)]
enum ProfileSlot {
    Loading,
    Loaded(Option<Profile>),
}

/// Per-timeline cache so each author is looked up at most once.
#[derive(Debug, Default)]
pub struct ProfileCache {
    slots: DashMap<PublicKey, ProfileSlot>,
}

impl ProfileCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the lookup for `pubkey`. Returns `true` when the caller should fetch it.
    pub fn request(&self, pubkey: &PublicKey) -> bool {
        let mut claimed = false;
        self.slots.entry(*pubkey).or_insert_with(|| {
            claimed = true;
            ProfileSlot::Loading
        });
        claimed
    }

    pub fn store(&self, pubkey: PublicKey, profile: Option<Profile>) {
        self.slots.insert(pubkey, ProfileSlot::Loaded(profile));
    }

    /// The profile if it has loaded and exists.
    pub fn get(&self, pubkey: &PublicKey) -> Option<Profile> {
        match self.slots.get(pubkey).as_deref() {
            Some(ProfileSlot::Loaded(profile)) => profile.clone(),
            _ => None,
        }
    }

    pub fn is_loading(&self, pubkey: &PublicKey) -> bool {
        matches!(self.slots.get(pubkey).as_deref(), Some(ProfileSlot::Loading))
    }

    pub fn clear(&self) {
        self.slots.clear();
    }

    /// Best-effort lookup; absence is reported as `None`, never as an error.
    pub async fn fetch(directory: &dyn ProfileDirectory, pubkey: &PublicKey) -> Option<Profile> {
        let profile = directory.lookup_profile(pubkey).await;
        if profile.is_none() {
            tracing::debug!(
                target: "relaychat::timeline::profiles::fetch",
                "No profile found for {}",
                pubkey.to_hex()
            );
        }
        profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_claims_once() {
        let cache = ProfileCache::new();
        let pubkey = Keys::generate().public_key();

        assert!(cache.request(&pubkey));
        assert!(!cache.request(&pubkey));
        assert!(cache.is_loading(&pubkey));
        assert!(cache.get(&pubkey).is_none());
    }

    #[test]
    fn test_store_and_get() {
        let cache = ProfileCache::new();
        let pubkey = Keys::generate().public_key();
        let profile = Profile {
            name: Some("alice".to_string()),
            ..Default::default()
        };

        cache.request(&pubkey);
        cache.store(pubkey, Some(profile.clone()));
        assert!(!cache.is_loading(&pubkey));
        assert_eq!(cache.get(&pubkey), Some(profile));
        assert!(!cache.request(&pubkey));
    }

    #[test]
    fn test_missing_profile_is_cached_too() {
        let cache = ProfileCache::new();
        let pubkey = Keys::generate().public_key();
        cache.store(pubkey, None);

        assert!(cache.get(&pubkey).is_none());
        assert!(!cache.request(&pubkey));

        cache.clear();
        assert!(cache.request(&pubkey));
    }
}
