use rand::Rng;

/// Length of the human-facing order number.
pub const ORDER_NUMBER_LEN: usize = 5;

/// Alphabet for order numbers. 0/O, 1/I and similar lookalikes are excluded so the code survives being read over
/// the phone.
const ORDER_NUMBER_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Generates a fresh opaque order reference: 32 hex characters (128 bits), safe to expose in customer URLs and
/// webhook correlation without being guessable.
pub fn new_order_ref() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 16] = rng.gen();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Generates a candidate order number. Uniqueness is not guaranteed here; the store checks for collisions and asks
/// for a new candidate when one occurs.
pub fn new_order_number() -> String {
    let mut rng = rand::thread_rng();
    (0..ORDER_NUMBER_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..ORDER_NUMBER_ALPHABET.len());
            ORDER_NUMBER_ALPHABET[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn order_refs_are_32_hex_chars() {
        let r = new_order_ref();
        assert_eq!(r.len(), 32);
        assert!(r.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn order_numbers_use_the_unambiguous_alphabet() {
        for _ in 0..100 {
            let n = new_order_number();
            assert_eq!(n.len(), ORDER_NUMBER_LEN);
            assert!(n.bytes().all(|b| ORDER_NUMBER_ALPHABET.contains(&b)), "unexpected character in {n}");
        }
    }
}
