use std::fmt::{self, Display, Formatter};
use std::time::Duration;

/// A hash rate that prints itself with a metric prefix.
#[derive(Debug, Clone, Copy)]
pub struct HashRate {
    pub hashes: u64,
    pub elapsed: Duration,
}

impl HashRate {
    pub fn per_second(&self) -> f64 {
        self.hashes as f64 / self.elapsed.as_secs_f64()
    }
}

impl Display for HashRate {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        const UNITS: [&str; 5] = ["", "k", "M", "G", "T"];

        let mut rate = self.per_second();
        let mut unit = 0;
        while rate >= 1000.0 && unit < UNITS.len() - 1 {
            rate /= 1000.0;
            unit += 1;
        }

        write!(
            f,
            "{:.*} {}h/s",
            f.precision().unwrap_or(2),
            rate,
            UNITS[unit]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rate(hashes: u64) -> HashRate {
        HashRate {
            hashes,
            elapsed: Duration::from_secs(1),
        }
    }

    #[test]
    fn hash_rate_formatting() {
        assert_eq!(rate(999).to_string(), "999.00 h/s");
        assert_eq!(rate(1_000).to_string(), "1.00 kh/s");
        assert_eq!(format!("{:.1}", rate(500_000_000_000)), "500.0 Gh/s");
    }

    #[test]
    fn hash_rate_saturates_at_the_largest_unit() {
        assert_eq!(format!("{:.0}", rate(2_000_000_000_000_000)), "2000 Th/s");
    }
}
