//! Canonical record signature
//!
//! `MD5(k1=v1&k2=v2&...&key=<secret>)`, upper-case hex. Keys are sorted
//! byte-lexicographically; `sign`, empty and structured fields are skipped.
//! The algorithm is fixed by the gateway and must not change.

use crate::Record;
use md5::{Digest, Md5};

/// Sign a record with the merchant secret
pub fn sign(record: &Record, secret: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(record.to_url_params().as_bytes());
    hasher.update(b"&key=");
    hasher.update(secret.as_bytes());
    hex::encode_upper(hasher.finalize())
}

/// Verify the record's `sign` field against a freshly computed signature.
///
/// A record without a scalar `sign` never verifies.
pub fn verify(record: &Record, secret: &str) -> bool {
    match record.sign() {
        Some(received) => constant_time_eq(received.as_bytes(), sign(record, secret).as_bytes()),
        None => false,
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "192006250b4c09247ec02edce69f6a2d";

    fn sample() -> Record {
        [
            ("appid", "wxd930ea5d5a258f4f"),
            ("mch_id", "10000100"),
            ("device_info", "1000"),
            ("body", "test"),
            ("nonce_str", "ibuaiVcKdpRxkhJA"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_known_signature() {
        assert_eq!(sign(&sample(), KEY), "9A0A8659F005D6984697E2CA0A9CF3B7");
    }

    #[test]
    fn test_ignores_sign_and_empty_fields() {
        let mut record = sample();
        record.set("sign", "WHATEVER");
        record.set("attach", "");
        assert_eq!(sign(&record, KEY), "9A0A8659F005D6984697E2CA0A9CF3B7");
    }

    #[test]
    fn test_verify() {
        let mut record = sample();
        assert!(!verify(&record, KEY));

        record.set_sign(KEY);
        assert!(verify(&record, KEY));
        assert!(!verify(&record, "another-secret"));

        record.set("body", "tampered");
        assert!(!verify(&record, KEY));
    }

    #[test]
    fn test_lowercase_signature_rejected() {
        let mut record = sample();
        let signature = record.make_sign(KEY).to_lowercase();
        record.set("sign", signature);
        assert!(!verify(&record, KEY));
    }
}
