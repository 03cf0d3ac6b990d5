use serde::{Deserialize, Serialize};

use crate::models::{Author, Scope};

/// Resolved viewer context passed explicitly into every store.
///
/// The surrounding application resolves the signed-in user and their housing
/// authority once (sign-in plus authority picker) and hands the result here;
/// nothing in the chat core looks either up ambiently. Anonymous visitors
/// can read public channels, so the viewer is optional — every write path
/// rejects before any network call when it is absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    viewer: Option<Author>,
    scope: Scope,
}

impl Session {
    pub fn authenticated(viewer: Author, scope: Scope) -> Self {
        Self {
            viewer: Some(viewer),
            scope,
        }
    }

    pub fn anonymous(scope: Scope) -> Self {
        Self {
            viewer: None,
            scope,
        }
    }

    pub fn viewer(&self) -> Option<&Author> {
        self.viewer.as_ref()
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }
}
