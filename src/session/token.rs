use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;

const TOKEN_BYTES: usize = 32;
/// Encoded length of a token: 32 bytes in unpadded base64.
const TOKEN_LEN: usize = 43;

/// Generate a new unguessable, cookie-safe session token.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Whether a presented token could have been issued by [`generate_token`].
///
/// Anything else is treated as "no session" without touching the store.
pub fn is_well_formed(token: &str) -> bool {
    token.len() == TOKEN_LEN
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}
