use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    /// Still resolving, e.g. while a stored session is being restored.
    Unknown,
    Authenticated,
    Unauthenticated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    /// Sign-in / sign-up.
    Entry,
    /// The protected chat view.
    Chat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    ToEntry,
    ToChat,
}

/// Decides what may be shown for a given auth status and emits at most one
/// navigation per status transition.
#[derive(Debug)]
pub struct SessionGate {
    screen: Screen,
    last_seen: Option<AuthStatus>,
}

impl SessionGate {
    pub fn new(screen: Screen) -> Self {
        Self {
            screen,
            last_seen: None,
        }
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    /// Whether protected content may render right now.
    pub fn admits(&self) -> bool {
        self.screen == Screen::Chat && self.last_seen == Some(AuthStatus::Authenticated)
    }

    pub fn observe(&mut self, status: AuthStatus) -> Option<Navigation> {
        if self.last_seen == Some(status) {
            return None;
        }
        self.last_seen = Some(status);

        let navigation = match (status, self.screen) {
            (AuthStatus::Unknown, _) => None,
            (AuthStatus::Unauthenticated, Screen::Chat) => Some(Navigation::ToEntry),
            (AuthStatus::Authenticated, Screen::Entry) => Some(Navigation::ToChat),
            _ => None,
        };
        if let Some(nav) = navigation {
            debug!("session gate: {status:?} on {:?} -> {nav:?}", self.screen);
            self.screen = match nav {
                Navigation::ToEntry => Screen::Entry,
                Navigation::ToChat => Screen::Chat,
            };
        }
        navigation
    }
}
