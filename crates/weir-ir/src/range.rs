//! Interval sets over ordered primitive values.
//!
//! An extent scan ranges over the values a pattern may take; filters like
//! `x < 3` carve that down to an interval set. Interval sets are never
//! enumerable by themselves (an `int` interval still holds astronomically
//! many values), so their role is to intersect with finite generators and
//! to witness emptiness; see the grounding pass.

use std::cmp::Ordering;

use weir_core::Value;

/// How big a generator's extent is. The grounding pass always prefers the
/// smaller side of this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Cardinality {
    Empty,
    Singleton,
    Finite,
    Infinite,
}

/// One end of an interval.
#[derive(Debug, Clone, PartialEq)]
pub enum Bound {
    Unbounded,
    Inclusive(Value),
    Exclusive(Value),
}

/// A contiguous interval, possibly unbounded on either end.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRange {
    pub lower: Bound,
    pub upper: Bound,
}

impl ValueRange {
    pub fn full() -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    pub fn point(value: Value) -> Self {
        Self {
            lower: Bound::Inclusive(value.clone()),
            upper: Bound::Inclusive(value),
        }
    }

    pub fn is_point(&self) -> Option<&Value> {
        match (&self.lower, &self.upper) {
            (Bound::Inclusive(a), Bound::Inclusive(b)) if a == b => Some(a),
            _ => None,
        }
    }

    pub fn contains(&self, value: &Value) -> bool {
        let above_lower = match &self.lower {
            Bound::Unbounded => true,
            Bound::Inclusive(v) => value >= v,
            Bound::Exclusive(v) => value > v,
        };
        let below_upper = match &self.upper {
            Bound::Unbounded => true,
            Bound::Inclusive(v) => value <= v,
            Bound::Exclusive(v) => value < v,
        };
        above_lower && below_upper
    }

    pub fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Bound::Unbounded, _) | (_, Bound::Unbounded) => false,
            (Bound::Inclusive(a), Bound::Inclusive(b)) => a > b,
            (Bound::Inclusive(a), Bound::Exclusive(b))
            | (Bound::Exclusive(a), Bound::Inclusive(b))
            | (Bound::Exclusive(a), Bound::Exclusive(b)) => a >= b,
        }
    }

    pub fn intersect(&self, other: &ValueRange) -> ValueRange {
        ValueRange {
            lower: tighter_lower(&self.lower, &other.lower),
            upper: tighter_upper(&self.upper, &other.upper),
        }
    }
}

fn tighter_lower(a: &Bound, b: &Bound) -> Bound {
    match (a, b) {
        (Bound::Unbounded, other) | (other, Bound::Unbounded) => other.clone(),
        (Bound::Inclusive(x), Bound::Inclusive(y)) => {
            Bound::Inclusive(if x >= y { x.clone() } else { y.clone() })
        }
        (Bound::Exclusive(x), Bound::Exclusive(y)) => {
            Bound::Exclusive(if x >= y { x.clone() } else { y.clone() })
        }
        (Bound::Inclusive(x), Bound::Exclusive(y)) => match x.cmp(y) {
            Ordering::Greater => Bound::Inclusive(x.clone()),
            _ => Bound::Exclusive(y.clone()),
        },
        (Bound::Exclusive(x), Bound::Inclusive(y)) => match y.cmp(x) {
            Ordering::Greater => Bound::Inclusive(y.clone()),
            _ => Bound::Exclusive(x.clone()),
        },
    }
}

fn tighter_upper(a: &Bound, b: &Bound) -> Bound {
    match (a, b) {
        (Bound::Unbounded, other) | (other, Bound::Unbounded) => other.clone(),
        (Bound::Inclusive(x), Bound::Inclusive(y)) => {
            Bound::Inclusive(if x <= y { x.clone() } else { y.clone() })
        }
        (Bound::Exclusive(x), Bound::Exclusive(y)) => {
            Bound::Exclusive(if x <= y { x.clone() } else { y.clone() })
        }
        (Bound::Inclusive(x), Bound::Exclusive(y)) => match x.cmp(y) {
            Ordering::Less => Bound::Inclusive(x.clone()),
            _ => Bound::Exclusive(y.clone()),
        },
        (Bound::Exclusive(x), Bound::Inclusive(y)) => match y.cmp(x) {
            Ordering::Less => Bound::Inclusive(y.clone()),
            _ => Bound::Exclusive(x.clone()),
        },
    }
}

/// A union of intervals. Kept simple: ranges may overlap after a union, and
/// [`RangeSet::may_overlap`] reports when a generator built from the set
/// needs a `distinct` wrapper.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeSet {
    ranges: Vec<ValueRange>,
}

impl RangeSet {
    pub fn full() -> Self {
        Self {
            ranges: vec![ValueRange::full()],
        }
    }

    pub fn empty() -> Self {
        Self { ranges: Vec::new() }
    }

    pub fn singleton(value: Value) -> Self {
        Self {
            ranges: vec![ValueRange::point(value)],
        }
    }

    pub fn less_than(value: Value) -> Self {
        Self {
            ranges: vec![ValueRange {
                lower: Bound::Unbounded,
                upper: Bound::Exclusive(value),
            }],
        }
    }

    pub fn at_most(value: Value) -> Self {
        Self {
            ranges: vec![ValueRange {
                lower: Bound::Unbounded,
                upper: Bound::Inclusive(value),
            }],
        }
    }

    pub fn greater_than(value: Value) -> Self {
        Self {
            ranges: vec![ValueRange {
                lower: Bound::Exclusive(value),
                upper: Bound::Unbounded,
            }],
        }
    }

    pub fn at_least(value: Value) -> Self {
        Self {
            ranges: vec![ValueRange {
                lower: Bound::Inclusive(value),
                upper: Bound::Unbounded,
            }],
        }
    }

    pub fn not_equal(value: Value) -> Self {
        Self {
            ranges: vec![
                ValueRange {
                    lower: Bound::Unbounded,
                    upper: Bound::Exclusive(value.clone()),
                },
                ValueRange {
                    lower: Bound::Exclusive(value),
                    upper: Bound::Unbounded,
                },
            ],
        }
    }

    pub fn ranges(&self) -> &[ValueRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.iter().all(|r| r.is_empty())
    }

    pub fn is_full(&self) -> bool {
        self.ranges.iter().any(|r| r == &ValueRange::full())
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.ranges.iter().any(|r| r.contains(value))
    }

    pub fn intersect(&self, other: &RangeSet) -> RangeSet {
        let mut ranges = Vec::new();
        for a in &self.ranges {
            for b in &other.ranges {
                let r = a.intersect(b);
                if !r.is_empty() {
                    ranges.push(r);
                }
            }
        }
        RangeSet { ranges }
    }

    pub fn union(&self, other: &RangeSet) -> RangeSet {
        let mut ranges = self.ranges.clone();
        for r in &other.ranges {
            if !ranges.contains(r) {
                ranges.push(r.clone());
            }
        }
        RangeSet { ranges }
    }

    /// Whether distinct point ranges could repeat a value; a generator
    /// enumerated from such a set needs deduplication.
    pub fn may_overlap(&self) -> bool {
        for (i, a) in self.ranges.iter().enumerate() {
            for b in &self.ranges[i + 1..] {
                if let Some(p) = a.is_point() {
                    if b.contains(p) {
                        return true;
                    }
                } else if let Some(p) = b.is_point() {
                    if a.contains(p) {
                        return true;
                    }
                } else {
                    // Two non-point ranges: assume the worst.
                    return true;
                }
            }
        }
        false
    }

    /// Interval sets are enumerable only when every range is a point.
    pub fn cardinality(&self) -> Cardinality {
        let live: Vec<_> = self.ranges.iter().filter(|r| !r.is_empty()).collect();
        if live.is_empty() {
            return Cardinality::Empty;
        }
        if live.iter().all(|r| r.is_point().is_some()) {
            if live.len() == 1 {
                Cardinality::Singleton
            } else {
                Cardinality::Finite
            }
        } else {
            Cardinality::Infinite
        }
    }

    /// The point values, when the whole set is enumerable.
    pub fn points(&self) -> Option<Vec<Value>> {
        let mut out = Vec::new();
        for r in &self.ranges {
            if r.is_empty() {
                continue;
            }
            out.push(r.is_point()?.clone());
        }
        Some(out)
    }
}
