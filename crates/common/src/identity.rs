//! Unique test identities

use rand::RngCore;

/// Local-part prefix of generated emails
pub const EMAIL_PREFIX: &str = "user_";

/// Domain used by [`unique_email`]
pub const DEFAULT_EMAIL_DOMAIN: &str = "example.com";

/// Password given to every generated user
pub const DEFAULT_PASSWORD: &str = "P@ssw0rd!";

/// Display name given to every generated user
pub const DEFAULT_NAME: &str = "Test User";

/// Random bytes per email: 6 bytes = 48 bits, 12 hex characters
const TOKEN_BYTES: usize = 6;

/// Generate a fresh email such as `user_ab12cd34ef56@example.com`
pub fn unique_email() -> String {
    unique_email_at(DEFAULT_EMAIL_DOMAIN)
}

/// Generate a fresh email under the given domain
pub fn unique_email_at(domain: &str) -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{}{}@{}", EMAIL_PREFIX, hex::encode(bytes), domain)
}
