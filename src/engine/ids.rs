//! Human-readable identifiers that double as idempotency keys for collaborator calls.

use chrono::{DateTime, Utc};
use rand::Rng;

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

pub fn order_number() -> String {
    order_number_at(Utc::now(), &mut rand::thread_rng())
}

pub fn transaction_ref() -> String {
    transaction_ref_at(Utc::now(), &mut rand::thread_rng())
}

pub fn order_number_at<R: Rng>(now: DateTime<Utc>, rng: &mut R) -> String {
    let millis = now.timestamp_millis().max(0) as u64;
    format!("ORD-{}-{}", to_base36(millis), random_base36(rng, 5)).to_uppercase()
}

pub fn transaction_ref_at<R: Rng>(now: DateTime<Utc>, rng: &mut R) -> String {
    format!(
        "TXN-{}-{}",
        now.timestamp_millis(),
        random_base36(rng, 7)
    )
    .to_uppercase()
}

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }

    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

fn random_base36<R: Rng>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::{order_number, order_number_at, to_base36, transaction_ref_at};

    #[test]
    fn base36_matches_known_values() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(1_700_000_000_000), "loyw3v28");
    }

    #[test]
    fn order_number_layout() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let number = order_number_at(now, &mut rng);

        let parts: Vec<&str> = number.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "ORD");
        assert_eq!(parts[1], "LOYW3V28");
        assert_eq!(parts[2].len(), 5);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn transaction_ref_layout() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let reference = transaction_ref_at(now, &mut rng);

        assert!(reference.starts_with("TXN-1700000000000-"));
        assert_eq!(reference.len(), "TXN-1700000000000-".len() + 7);
        assert_eq!(reference, reference.to_uppercase());
    }

    #[test]
    fn consecutive_order_numbers_differ() {
        assert_ne!(order_number(), order_number());
    }
}
