// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// Maximum length, in bytes, of the opaque credential payload an RPC
/// transport hands over at connection time.
pub const MAX_AUTH_BYTES: usize = 400;

/// Identity credential presented by a connecting client.
///
/// Equality is defined by `flavour` and byte-equal `data`, matching the
/// dedup key [`crate::client::ClientRegistry::get`] scans the table with.
#[derive(Clone, Debug)]
pub struct ClientAuthData {
    flavour: i32,
    data: Vec<u8>,
}

impl ClientAuthData {
    /// Builds a credential, truncating `data` is never performed here:
    /// callers that exceed [`MAX_AUTH_BYTES`] get `None` back, matching the
    /// original's "malformed credential" handling at the transport layer.
    #[must_use]
    pub fn new(flavour: i32, data: Vec<u8>) -> Option<Self> {
        if data.len() > MAX_AUTH_BYTES {
            return None;
        }
        Some(Self { flavour, data })
    }

    #[must_use]
    pub fn flavour(&self) -> i32 {
        self.flavour
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl PartialEq for ClientAuthData {
    fn eq(&self, other: &Self) -> bool {
        self.flavour == other.flavour && self.data == other.data
    }
}

impl Eq for ClientAuthData {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_oversized_payload() {
        let data = vec![0u8; MAX_AUTH_BYTES + 1];
        assert!(ClientAuthData::new(1, data).is_none());
    }

    #[test]
    fn equality_is_flavour_and_byte_exact() {
        let a = ClientAuthData::new(1, vec![1, 2, 3]).expect("valid");
        let b = ClientAuthData::new(1, vec![1, 2, 3]).expect("valid");
        let c = ClientAuthData::new(2, vec![1, 2, 3]).expect("valid");
        let d = ClientAuthData::new(1, vec![1, 2, 4]).expect("valid");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }
}
