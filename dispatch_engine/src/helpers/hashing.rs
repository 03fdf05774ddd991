use blake2::{Blake2b512, Digest};
use serde::Serialize;

/// Hashes a request body for storage alongside its idempotency record. The hash identifies the original payload in
/// the ledger; it is not currently compared on replay.
pub fn request_hash<T: Serialize>(request: &T) -> String {
    let bytes = serde_json::to_vec(request).unwrap_or_default();
    let mut hasher = Blake2b512::new();
    hasher.update(&bytes);
    let digest = hasher.finalize();
    to_hex(&digest)
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut acc, b| {
        use std::fmt::Write;
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Serialize)]
    struct Req<'a> {
        customer: &'a str,
        porters: i64,
    }

    #[test]
    fn hash_is_stable_and_payload_sensitive() {
        let a = request_hash(&Req { customer: "alice", porters: 2 });
        let b = request_hash(&Req { customer: "alice", porters: 2 });
        let c = request_hash(&Req { customer: "alice", porters: 3 });
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 128);
    }
}
