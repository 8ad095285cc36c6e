use sha2::{Digest, Sha256};

/// Computes the change-detection fingerprint of raw feed content.
///
/// The fingerprint is the first eight bytes (big-endian) of the SHA-256 digest
/// of the content's UTF-8 bytes. It is stable across runs and platforms, which
/// `std::hash` does not guarantee. It is not a security boundary: a collision
/// only means one update is missed.
///
/// # Examples
///
/// ```
/// use feedcast::feed::fingerprint;
///
/// assert_eq!(fingerprint("hello"), fingerprint("hello"));
/// assert_ne!(fingerprint("hello"), fingerprint("hello!"));
/// ```
pub fn fingerprint(content: &str) -> u64 {
    let digest = Sha256::digest(content.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}
