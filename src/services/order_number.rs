use chrono::{NaiveDate, Utc};
use rand::Rng;

const SUFFIX_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const SUFFIX_LEN: usize = 4;

/// Human-facing order numbers of the form `PREFIX-YYYYMMDD-XXXX`.
///
/// The suffix is four random base36 characters, so numbers are only unique
/// with high probability. The store rejects taken numbers and the assembler
/// hands it several candidates.
#[derive(Debug, Clone)]
pub struct OrderNumberGenerator {
    prefix: String,
}

impl OrderNumberGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn generate_for(&self, date: NaiveDate) -> String {
        let mut rng = rand::rng();
        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| char::from(SUFFIX_ALPHABET[rng.random_range(0..SUFFIX_ALPHABET.len())]))
            .collect();

        format!("{}-{}-{suffix}", self.prefix, date.format("%Y%m%d"))
    }

    /// `count` distinct candidates for today's date.
    pub fn candidates(&self, count: usize) -> Vec<String> {
        let today = Utc::now().date_naive();
        let mut candidates: Vec<String> = Vec::with_capacity(count);

        while candidates.len() < count {
            let candidate = self.generate_for(today);
            if !candidates.contains(&candidate) {
                candidates.push(candidate);
            }
        }
        candidates
    }
}
