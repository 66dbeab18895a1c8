use md5::{Digest, Md5};

/// URL-encodes the way PHP's `urlencode` does, which is what the gateway
/// signs against: spaces become `+`, only `A-Z a-z 0-9 - _ .` stay literal.
pub fn php_urlencode(value: &str) -> String {
    urlencoding::encode(value)
        .replace("%20", "+")
        .replace('~', "%7E")
}

/// Joins `key=value` pairs in order, values exactly as received. This is
/// the string an ITN is signed over.
pub fn param_string<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, php_urlencode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Checkout variant: values are trimmed and empty ones are left out.
pub fn checkout_param_string<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    param_string(
        pairs
            .into_iter()
            .map(|(k, v)| (k, v.trim()))
            .filter(|(_, v)| !v.is_empty()),
    )
}

pub fn md5_hex(input: &str) -> String {
    format!("{:x}", Md5::digest(input.as_bytes()))
}

/// Signs an already-built parameter string, appending the passphrase when set.
pub fn sign(param_string: &str, passphrase: Option<&str>) -> String {
    match passphrase {
        Some(p) if !p.is_empty() => md5_hex(&format!(
            "{}&passphrase={}",
            param_string,
            php_urlencode(p.trim())
        )),
        _ => md5_hex(param_string),
    }
}

/// Constant-time comparison of two hex signatures.
pub fn signatures_match(expected: &str, given: &str) -> bool {
    let a = expected.as_bytes();
    let b = given.trim().to_ascii_lowercase();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_like_php() {
        assert_eq!(php_urlencode("Gold package (monthly)"), "Gold+package+%28monthly%29");
        assert_eq!(php_urlencode("a~b"), "a%7Eb");
        assert_eq!(php_urlencode("x@y.co.za"), "x%40y.co.za");
        assert_eq!(php_urlencode("https://a.b/c"), "https%3A%2F%2Fa.b%2Fc");
    }

    #[test]
    fn md5_matches_reference_digests() {
        assert_eq!(md5_hex(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(md5_hex("abc"), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn checkout_string_skips_empty_values() {
        let pairs = [("merchant_id", "10000100"), ("name_first", " "), ("amount", "200.00 ")];
        assert_eq!(checkout_param_string(pairs), "merchant_id=10000100&amount=200.00");
        assert_eq!(
            param_string(pairs),
            "merchant_id=10000100&name_first=+&amount=200.00+"
        );
    }

    #[test]
    fn passphrase_is_appended_before_hashing() {
        let params = "merchant_id=10000100&amount=200.00";
        assert_eq!(
            sign(params, Some("my pass")),
            md5_hex("merchant_id=10000100&amount=200.00&passphrase=my+pass")
        );
        assert_eq!(sign(params, None), md5_hex(params));
        assert_eq!(sign(params, Some("")), md5_hex(params));
    }

    #[test]
    fn signature_comparison_ignores_case() {
        let sig = md5_hex("abc");
        assert!(signatures_match(&sig, &sig.to_uppercase()));
        assert!(!signatures_match(&sig, "900150983cd24fb0d6963f7d28e17f7"));
    }
}
