use ed25519_dalek::{Signer, SigningKey};
use std::fmt;
use std::path::Path;
use tracing::warn;

use crate::error::BotError;

/// One signing identity. The secret never leaves this struct: it is excluded
/// from `Debug` output and there is no serialization impl.
#[derive(Clone)]
pub struct AccountCredential {
    pub address: String,
    signing_key: SigningKey,
}

impl AccountCredential {
    /// Parse a single credential line: a hex-encoded 32-byte ed25519 secret,
    /// with or without a `0x` prefix.
    pub fn from_secret_hex(line: &str) -> Result<Self, BotError> {
        let raw = line.strip_prefix("0x").unwrap_or(line);
        let bytes = hex::decode(raw)
            .map_err(|e| BotError::Credential(format!("invalid hex: {}", e)))?;
        let secret: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            BotError::Credential(format!("expected a 32-byte secret, got {} bytes", bytes.len()))
        })?;
        let signing_key = SigningKey::from_bytes(&secret);
        let address = format!("0x{}", hex::encode(signing_key.verifying_key().to_bytes()));
        Ok(Self {
            address,
            signing_key,
        })
    }

    /// Sign a message and return the signature as hex.
    pub fn sign_hex(&self, message: &[u8]) -> String {
        hex::encode(self.signing_key.sign(message).to_bytes())
    }
}

impl fmt::Debug for AccountCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountCredential")
            .field("address", &self.address)
            .field("signing_key", &"<redacted>")
            .finish()
    }
}

/// All usable credentials from the key file, in file order.
#[derive(Debug, Clone)]
pub struct CredentialSet {
    accounts: Vec<AccountCredential>,
    /// Malformed lines dropped during parsing.
    pub dropped: usize,
}

impl CredentialSet {
    pub fn load(path: &Path) -> Result<Self, BotError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            BotError::Config(format!(
                "cannot read credential file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Ok(Self::parse(&text))
    }

    /// Each line is validated independently; a bad line is dropped with a
    /// warning, never fatal to the batch.
    pub fn parse(text: &str) -> Self {
        let mut accounts = Vec::new();
        let mut dropped = 0;
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match AccountCredential::from_secret_hex(line) {
                Ok(cred) => accounts.push(cred),
                Err(e) => {
                    dropped += 1;
                    warn!("Credential line {} dropped: {}", lineno + 1, e);
                }
            }
        }
        Self { accounts, dropped }
    }

    pub fn get(&self, index: usize) -> Option<&AccountCredential> {
        self.accounts.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AccountCredential> {
        self.accounts.iter()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

/// Shorten an address for display: `0x1234...abcd`.
pub fn short_address(address: &str) -> String {
    if address.len() > 13 {
        format!("{}...{}", &address[..6], &address[address.len() - 4..])
    } else {
        address.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret_line(byte: u8) -> String {
        hex::encode([byte; 32])
    }

    #[test]
    fn parses_valid_lines_and_skips_noise() {
        let text = format!(
            "# keys\n\n{}\n  0x{}  \n",
            secret_line(1),
            secret_line(2)
        );
        let set = CredentialSet::parse(&text);
        assert_eq!(set.len(), 2);
        assert_eq!(set.dropped, 0);
        assert!(set.get(0).unwrap().address.starts_with("0x"));
    }

    #[test]
    fn one_malformed_line_is_dropped_not_fatal() {
        let text = format!("{}\nnot-a-key\n{}\n", secret_line(1), secret_line(2));
        let set = CredentialSet::parse(&text);
        assert_eq!(set.len(), 2);
        assert_eq!(set.dropped, 1);
    }

    #[test]
    fn address_is_deterministic_and_lowercase() {
        let a = AccountCredential::from_secret_hex(&secret_line(7)).unwrap();
        let b = AccountCredential::from_secret_hex(&format!("0x{}", secret_line(7))).unwrap();
        assert_eq!(a.address, b.address);
        assert_eq!(a.address, a.address.to_ascii_lowercase());
    }

    #[test]
    fn wrong_length_secret_is_rejected() {
        assert!(AccountCredential::from_secret_hex("0xdeadbeef").is_err());
    }

    #[test]
    fn debug_never_prints_the_secret() {
        let cred = AccountCredential::from_secret_hex(&secret_line(9)).unwrap();
        let dump = format!("{:?}", cred);
        assert!(dump.contains("<redacted>"));
        assert!(!dump.contains(&secret_line(9)));
    }

    #[test]
    fn short_address_truncates() {
        let cred = AccountCredential::from_secret_hex(&secret_line(3)).unwrap();
        let short = short_address(&cred.address);
        assert!(short.len() < cred.address.len());
        assert!(short.contains("..."));
    }
}
