use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Verify a processor settlement signature: HMAC-SHA256 over
/// `order_id|payment_id`, hex-encoded. The comparison goes through
/// `Mac::verify_slice`, which is constant-time, and every failure path
/// (bad hex, key setup) rejects.
pub fn verify_signature(
    secret: &str,
    order_id: &str,
    payment_id: &str,
    supplied_hex: &str,
) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(order_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());

    let Ok(supplied) = hex::decode(supplied_hex) else {
        return false;
    };
    mac.verify_slice(&supplied).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex::ToHex;

    fn sign(secret: &str, order_id: &str, payment_id: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("key");
        mac.update(format!("{order_id}|{payment_id}").as_bytes());
        mac.finalize().into_bytes().encode_hex::<String>()
    }

    #[test]
    fn matching_signature_is_accepted() {
        let sig = sign("secret", "order_abc", "pay_123");
        assert!(verify_signature("secret", "order_abc", "pay_123", &sig));
    }

    #[test]
    fn any_single_field_mutation_rejects() {
        let sig = sign("secret", "order_abc", "pay_123");
        assert!(!verify_signature("secret", "order_abd", "pay_123", &sig));
        assert!(!verify_signature("secret", "order_abc", "pay_124", &sig));

        let mut mutated = sig.clone();
        let last = mutated.pop().expect("non-empty");
        mutated.push(if last == '0' { '1' } else { '0' });
        assert!(!verify_signature("secret", "order_abc", "pay_123", &mutated));
    }

    #[test]
    fn wrong_secret_rejects() {
        let sig = sign("secret", "order_abc", "pay_123");
        assert!(!verify_signature("other", "order_abc", "pay_123", &sig));
    }

    #[test]
    fn malformed_inputs_fail_closed() {
        assert!(!verify_signature("secret", "order_abc", "pay_123", ""));
        assert!(!verify_signature("secret", "order_abc", "pay_123", "zz-not-hex"));
        assert!(!verify_signature(
            "secret",
            "order_abc",
            "pay_123",
            &"0".repeat(64)
        ));
    }

    #[test]
    fn delimiter_is_part_of_the_signed_payload() {
        // "ab|c" and "a|bc" must not collide.
        let sig = sign("secret", "ab", "c");
        assert!(!verify_signature("secret", "a", "bc", &sig));
    }
}
