/*!
    Timestamp and time base types.
*/

use std::time::Duration;

/**
    A rational number, used for time bases and frame rates.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /**
        Returns the value as a float, or 0.0 for a zero denominator.
    */
    pub fn to_f64(self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            self.num as f64 / self.den as f64
        }
    }

    /**
        Returns `den / num`.
    */
    pub const fn invert(self) -> Self {
        Self {
            num: self.den,
            den: self.num,
        }
    }

    /**
        Returns true if both terms are positive.
    */
    pub const fn is_valid(self) -> bool {
        self.num > 0 && self.den > 0
    }

    /**
        Rescale a timestamp from one time base to another, rounding to the
        nearest tick (half away from zero).
    */
    pub fn rescale(ts: i64, from: Rational, to: Rational) -> i64 {
        if from == to {
            return ts;
        }

        let num = ts as i128 * from.num as i128 * to.den as i128;
        let den = from.den as i128 * to.num as i128;
        if den == 0 {
            return ts;
        }

        let magnitude = (num.abs() + den.abs() / 2) / den.abs();
        if (num < 0) != (den < 0) {
            -magnitude as i64
        } else {
            magnitude as i64
        }
    }
}

impl std::fmt::Display for Rational {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/**
    A presentation or decode timestamp in time base ticks.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pts(pub i64);

impl Pts {
    /**
        Convert to wall-clock time. Negative timestamps clamp to zero.
    */
    pub fn to_duration(self, time_base: Rational) -> Duration {
        if self.0 <= 0 || !time_base.is_valid() {
            return Duration::ZERO;
        }
        let micros = Rational::rescale(self.0, time_base, Rational::new(1, 1_000_000));
        Duration::from_micros(micros as u64)
    }

    /**
        Convert from wall-clock time.
    */
    pub fn from_duration(duration: Duration, time_base: Rational) -> Self {
        let micros = duration.as_micros().min(i64::MAX as u128) as i64;
        Self(Rational::rescale(micros, Rational::new(1, 1_000_000), time_base))
    }
}
