//! Decrypted text cache port
//!
//! Encrypted note segments (`en-crypt`) are decrypted outside this library;
//! the converter only consults this cache to decide whether to render an
//! editable decrypted block, and to re-encrypt a block the user edited.
//! Key management and ciphers stay with the collaborator.

/// A cached decryption result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedTextEntry {
    pub decrypted_text: String,
    /// Whether the user asked to keep this decryption for the session
    pub remember_for_session: bool,
}

pub trait IDecryptedTextCache: Send + Sync {
    /// Looks up the decrypted form of `encrypted_text`, if the user has
    /// decrypted it before
    fn find_decrypted_text(&self, encrypted_text: &str) -> Option<DecryptedTextEntry>;

    /// Records that the decrypted text for `encrypted_text` changed;
    /// returns the fresh ciphertext to embed in place of the old one
    fn modify_decrypted_text(
        &self,
        encrypted_text: &str,
        new_decrypted_text: &str,
    ) -> Option<String>;
}
