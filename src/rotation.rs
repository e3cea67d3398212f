use std::sync::OnceLock;

use hmac::digest::Key;
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;

/// Keyword that asks a backend to replace a secret with a generated value.
pub const ROTATE_KEYWORD: &str = "rotate";

/// Default length of generated secrets.
pub const DEFAULT_SECRET_LENGTH: usize = 32;

const CHANGE_TOKEN_LEN: usize = 16;

type HmacSha256 = Hmac<Sha256>;

/// Generate a random secret
pub fn generate_secret(length: usize) -> String {
    const CHARSET: &[u8] =
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*";
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// MAC keyed with a random per-process key.
fn token_mac() -> HmacSha256 {
    static MAC: OnceLock<HmacSha256> = OnceLock::new();
    MAC.get_or_init(|| {
        let mut key = Key::<HmacSha256>::default();
        rand::thread_rng().fill(key.as_mut_slice());
        <HmacSha256 as Mac>::new(&key)
    })
    .clone()
}

/// Derive the change token recorded in a secret id for `value`.
///
/// Equal values yield equal tokens within a process, so rewriting an
/// unchanged value hands out the same id. The key never leaves the process,
/// so a token held by a caller cannot be used to test guesses of the value.
pub fn change_token(value: &str) -> String {
    let mut mac = token_mac();
    mac.update(value.as_bytes());
    let mut token = hex::encode(mac.finalize().into_bytes());
    token.truncate(CHANGE_TOKEN_LEN);
    token
}
