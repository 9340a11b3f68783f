//! Central authorization gate.
//!
//! Credential issuance and validation live in the identity provider; the
//! core only asks two yes/no questions: is there a valid credential, and
//! does it carry the manager role. Every mutating operation funnels
//! through here so the answers are uniform.

use crate::error::{Error, Result};
use crate::model::{Profile, Role};

/// A validated bearer identity, as handed over by the identity boundary.
#[derive(Debug, Clone)]
pub struct Credential {
    pub user: Profile,
}

impl Credential {
    pub fn new(user: Profile) -> Self {
        Self { user }
    }
}

/// Require any valid credential. Read paths (analytics) use this.
pub fn require_user(credential: Option<&Credential>) -> Result<&Profile> {
    credential.map(|c| &c.user).ok_or(Error::Unauthorized)
}

/// Require a credential carrying the manager role. All mutations use this.
pub fn require_manager(credential: Option<&Credential>) -> Result<&Profile> {
    let user = require_user(credential)?;
    if user.role != Role::Manager {
        return Err(Error::Forbidden("manager"));
    }
    Ok(user)
}
