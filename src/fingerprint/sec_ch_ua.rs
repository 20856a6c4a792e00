//! Sec-CH-UA GREASE brand generator (spec §4.A).
//!
//! On construction, picks two metacharacters from `( ) : ; = ? _`, a GREASE
//! version (24 w.p. 0.80, else 99), and a random permutation of
//! {GREASE, Chromium, "Google Chrome"}. All three choices are frozen for the
//! generator's lifetime so a given HolyTLS instance looks self-consistent
//! across requests, while two different instances look different from each
//! other.

use rand::Rng;

const GREASE_METACHARS: &[char] = &['(', ')', ':', ';', '=', '?', '_'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Brand {
    Grease,
    Chromium,
    GoogleChrome,
}

/// A stable, per-instance Sec-CH-UA value generator.
#[derive(Debug, Clone)]
pub struct SecChUaGenerator {
    grease_brand: String,
    grease_version: u16,
    brand_order: [Brand; 3],
    chrome_major: u16,
}

impl SecChUaGenerator {
    /// Builds a new generator, making all its random choices up front.
    pub fn new(chrome_major: u16) -> Self {
        Self::with_rng(chrome_major, &mut rand::thread_rng())
    }

    fn with_rng(chrome_major: u16, rng: &mut impl Rng) -> Self {
        let mut chars = [' '; 2];
        for slot in chars.iter_mut() {
            *slot = GREASE_METACHARS[rng.gen_range(0..GREASE_METACHARS.len())];
        }
        let grease_brand = format!("Not{}A{}Brand", chars[0], chars[1]);

        let grease_version = if rng.gen_bool(0.80) { 24 } else { 99 };

        let mut brand_order = [Brand::Grease, Brand::Chromium, Brand::GoogleChrome];
        // Fisher-Yates over the fixed 3-element array.
        for i in (1..brand_order.len()).rev() {
            let j = rng.gen_range(0..=i);
            brand_order.swap(i, j);
        }

        Self {
            grease_brand,
            grease_version,
            brand_order,
            chrome_major,
        }
    }

    fn brand_entry(&self, brand: Brand) -> (String, u16) {
        match brand {
            Brand::Grease => (self.grease_brand.clone(), self.grease_version),
            Brand::Chromium => ("Chromium".to_string(), self.chrome_major),
            Brand::GoogleChrome => ("Google Chrome".to_string(), self.chrome_major),
        }
    }

    /// Renders the `Sec-CH-UA` header value, e.g.
    /// `"Not?A_Brand";v="24", "Chromium";v="143", "Google Chrome";v="143"`.
    pub fn header_value(&self) -> String {
        self.brand_order
            .iter()
            .map(|b| {
                let (name, version) = self.brand_entry(*b);
                format!("\"{name}\";v=\"{version}\"")
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Renders `Sec-CH-UA-Full-Version-List`, same brand order but full
    /// dotted version strings (only sent if the peer requested it via
    /// Accept-CH, per spec §4.A item 3).
    pub fn full_version_list(&self, full_version: &str) -> String {
        self.brand_order
            .iter()
            .map(|b| match b {
                Brand::Grease => format!("\"{}\";v=\"{}.0.0.0\"", self.grease_brand, self.grease_version),
                Brand::Chromium => format!("\"Chromium\";v=\"{full_version}\""),
                Brand::GoogleChrome => format!("\"Google Chrome\";v=\"{full_version}\""),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn is_stable_across_repeated_calls() {
        let gen = SecChUaGenerator::new(143);
        assert_eq!(gen.header_value(), gen.header_value());
    }

    #[test]
    fn grease_brand_uses_only_allowed_metacharacters() {
        let mut rng = StdRng::seed_from_u64(42);
        let gen = SecChUaGenerator::with_rng(143, &mut rng);
        for c in gen.grease_brand.chars() {
            assert!(c.is_alphanumeric() || GREASE_METACHARS.contains(&c));
        }
        assert!(gen.grease_brand.starts_with("Not") && gen.grease_brand.ends_with("Brand"));
    }

    #[test]
    fn grease_version_is_24_or_99() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let gen = SecChUaGenerator::with_rng(143, &mut rng);
            assert!(gen.grease_version == 24 || gen.grease_version == 99);
        }
    }

    #[test]
    fn brand_order_is_a_permutation_of_three_distinct_brands() {
        let mut rng = StdRng::seed_from_u64(1);
        let gen = SecChUaGenerator::with_rng(143, &mut rng);
        let value = gen.header_value();
        assert!(value.contains("Chromium"));
        assert!(value.contains("Google Chrome"));
        assert_eq!(value.split(", ").count(), 3);
    }

    #[test]
    fn two_generators_can_differ() {
        let mut rng = StdRng::seed_from_u64(99);
        let a = SecChUaGenerator::with_rng(143, &mut rng);
        let b = SecChUaGenerator::with_rng(143, &mut rng);
        // Not a hard guarantee for any two seeds, but over many draws some
        // pair must differ; this checks the generator isn't hardcoded.
        let mut any_diff = a.header_value() != b.header_value();
        let mut rng2 = StdRng::seed_from_u64(100);
        for _ in 0..20 {
            let x = SecChUaGenerator::with_rng(143, &mut rng2);
            let y = SecChUaGenerator::with_rng(143, &mut rng2);
            any_diff |= x.header_value() != y.header_value();
        }
        assert!(any_diff);
    }
}
