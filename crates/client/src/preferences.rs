//! Display preferences and cookie consent.
//!
//! A signed-in identity keeps theme and sound on its profile row; an
//! anonymous client keeps them in the local store.

use idyll_core::preferences::{CookieConsent, Theme};
use idyll_db::models::user::User;

use crate::local::{keys, LocalStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preferences {
    pub theme: Theme,
    pub sound_enabled: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            theme: Theme::default(),
            sound_enabled: true,
        }
    }
}

impl Preferences {
    /// Profile values win; otherwise the local fallback; otherwise defaults.
    pub fn resolve(user: Option<&User>, local: &LocalStore) -> Self {
        if let Some(user) = user {
            return Self {
                theme: user.theme,
                sound_enabled: user.sound_enabled,
            };
        }
        let defaults = Self::default();
        Self {
            theme: local
                .get(keys::THEME)
                .and_then(|raw| Theme::parse(&raw))
                .unwrap_or(defaults.theme),
            sound_enabled: local
                .get(keys::SOUND_ENABLED)
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(defaults.sound_enabled),
        }
    }

    pub fn store_local(&self, local: &LocalStore) {
        local.set(keys::THEME, self.theme.as_str());
        local.set(keys::SOUND_ENABLED, self.sound_enabled.to_string());
    }
}

pub fn cookie_consent(local: &LocalStore) -> Option<CookieConsent> {
    local
        .get(keys::COOKIE_CONSENT)
        .and_then(|raw| CookieConsent::parse(&raw))
}

pub fn set_cookie_consent(local: &LocalStore, consent: CookieConsent) {
    local.set(keys::COOKIE_CONSENT, consent.as_str());
}
