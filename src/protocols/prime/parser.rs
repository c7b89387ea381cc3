//! Prime query parser and response encoding.

use serde::Deserialize;
use serde_json::{json, Number};

/// Largest integer a JSON double represents exactly (2^53 - 1).
pub const MAX_SAFE_INTEGER: u64 = (1 << 53) - 1;

/// Reply to a malformed request.
pub const MALFORMED_RESPONSE: &[u8] = b"{}\n";

#[derive(Debug, Deserialize)]
struct Request {
    method: String,
    number: Number,
}

/// Parse one request line. Returns the queried number, or `None` if the
/// request is malformed.
pub fn parse(line: &[u8]) -> Option<Number> {
    let request: Request = serde_json::from_slice(line).ok()?;
    (request.method == "isPrime").then_some(request.number)
}

/// Whether a JSON number is a prime integer.
///
/// Integral floats count as integers. Magnitudes beyond `MAX_SAFE_INTEGER`
/// are never reported prime.
pub fn number_is_prime(number: &Number) -> bool {
    if let Some(n) = number.as_u64() {
        return n <= MAX_SAFE_INTEGER && is_prime(n);
    }
    if number.as_i64().is_some() {
        return false;
    }
    match number.as_f64() {
        Some(f) if f.is_finite() && f.fract() == 0.0 && f >= 2.0 => {
            f <= MAX_SAFE_INTEGER as f64 && is_prime(f as u64)
        }
        _ => false,
    }
}

/// Trial division over 6k +/- 1.
pub fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    if n % 2 == 0 {
        return n == 2;
    }
    if n % 3 == 0 {
        return n == 3;
    }

    let mut i = 5;
    while i <= n / i {
        if n % i == 0 || n % (i + 2) == 0 {
            return false;
        }
        i += 6;
    }
    true
}

/// Encode a well-formed response line.
pub fn response(prime: bool) -> Vec<u8> {
    let mut line = json!({ "method": "isPrime", "prime": prime })
        .to_string()
        .into_bytes();
    line.push(b'\n');
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(line: &str) -> Option<bool> {
        parse(line.as_bytes()).map(|n| number_is_prime(&n))
    }

    #[test]
    fn test_is_prime() {
        let primes: Vec<u64> = (0..50).filter(|&n| is_prime(n)).collect();
        assert_eq!(
            primes,
            vec![2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47]
        );
        assert!(is_prime(7919));
        assert!(!is_prime(7917));
        assert!(is_prime(MAX_SAFE_INTEGER - 110)); // 2^53 - 111
        assert!(!is_prime(u64::MAX));
    }

    #[test]
    fn test_parse_valid() {
        assert_eq!(query(r#"{"method":"isPrime","number":7}"#), Some(true));
        assert_eq!(query(r#"{"method":"isPrime","number":8}"#), Some(false));
        assert_eq!(
            query(r#"{"number":13,"method":"isPrime","extra":[1,2]}"#),
            Some(true)
        );
    }

    #[test]
    fn test_parse_non_integers() {
        assert_eq!(query(r#"{"method":"isPrime","number":7.0}"#), Some(true));
        assert_eq!(query(r#"{"method":"isPrime","number":7.5}"#), Some(false));
        assert_eq!(query(r#"{"method":"isPrime","number":-7}"#), Some(false));
        assert_eq!(query(r#"{"method":"isPrime","number":1e300}"#), Some(false));
        assert_eq!(
            query(r#"{"method":"isPrime","number":18446744073709551557}"#),
            Some(false)
        );
    }

    #[test]
    fn test_parse_malformed() {
        assert_eq!(query(""), None);
        assert_eq!(query("{"), None);
        assert_eq!(query("[]"), None);
        assert_eq!(query(r#"{"method":"isPrime"}"#), None);
        assert_eq!(query(r#"{"method":"isPrime","number":"7"}"#), None);
        assert_eq!(query(r#"{"method":"isPrime","number":null}"#), None);
        assert_eq!(query(r#"{"method":"isComposite","number":7}"#), None);
        assert_eq!(query(r#"{"method":7,"number":7}"#), None);
    }

    #[test]
    fn test_response() {
        assert_eq!(response(true), b"{\"method\":\"isPrime\",\"prime\":true}\n");
        assert_eq!(response(false), b"{\"method\":\"isPrime\",\"prime\":false}\n");
    }
}
