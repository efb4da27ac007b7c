//! Operator credentials for remote sessions
//!
//! Credentials arrive from the environment and leave only through the
//! stdin script payload. The password wrapper redacts itself in `Debug`
//! output and zeroes its buffer on drop, so neither logs nor freed
//! memory carry the secret.

use crate::utils::CredentialError;
use std::fmt;

/// Account name used to authenticate remote sessions.
///
/// Accepts the usual Windows spellings: `user`, `.\user`, `DOMAIN\user`,
/// and the UPN form `user@domain.com`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Username(String);

impl Username {
    pub fn new(username: impl Into<String>) -> Result<Self, CredentialError> {
        let username = username.into();

        if username.is_empty() {
            return Err(CredentialError::InvalidUsername(
                "Username cannot be empty".to_string(),
            ));
        }

        if username.len() > 256 {
            return Err(CredentialError::InvalidUsername(
                "Username exceeds maximum length (256)".to_string(),
            ));
        }

        Ok(Username(username))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Password wrapper that zeroes its buffer on drop.
///
/// Deliberately has no `Display` impl; `Debug` prints only the length.
/// `as_str` exists solely for building the stdin script payload.
pub struct SecureString(String);

impl SecureString {
    pub fn new(password: impl Into<String>) -> Self {
        SecureString(password.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Clone for SecureString {
    fn clone(&self) -> Self {
        SecureString(self.0.clone())
    }
}

impl Drop for SecureString {
    fn drop(&mut self) {
        // SAFETY: the String is owned and dropped immediately after; the
        // volatile writes keep the zeroing from being optimized away.
        unsafe {
            for byte in self.0.as_bytes_mut() {
                std::ptr::write_volatile(byte, 0);
            }
        }
    }
}

impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecureString(*** {} bytes ***)", self.0.len())
    }
}

/// Username/password pair for session authentication.
#[derive(Clone, Debug)]
pub struct Credentials {
    username: Username,
    password: SecureString,
}

impl Credentials {
    pub fn new(username: Username, password: SecureString) -> Self {
        Credentials { username, password }
    }

    pub fn username(&self) -> &Username {
        &self.username
    }

    pub fn password(&self) -> &SecureString {
        &self.password
    }
}
