//! DATM scoring: default filling, overall score and letter grade.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_DIMENSION, GRADE_A_FLOOR, GRADE_B_FLOOR, GRADE_C_FLOOR, OVERALL_DECIMALS,
};

/// A complete four-dimensional quality score. Values are conventionally in
/// [0, 1] but are never clamped.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Datm {
    pub truth: f64,
    pub goodness: f64,
    pub beauty: f64,
    pub intelligence: f64,
}

/// A caller-supplied score where any dimension may be missing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialDatm {
    pub truth: Option<f64>,
    pub goodness: Option<f64>,
    pub beauty: Option<f64>,
    pub intelligence: Option<f64>,
}

/// How a supplied score of exactly zero is treated when filling defaults.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroScore {
    /// A zero is a real score and is stored as 0.0.
    #[default]
    Preserve,
    /// A zero is indistinguishable from "missing" and becomes 0.5.
    Legacy,
}

impl ZeroScore {
    fn resolve(self, value: Option<f64>) -> f64 {
        match value {
            None => DEFAULT_DIMENSION,
            Some(v) if v.is_nan() => DEFAULT_DIMENSION,
            Some(v) if v == 0.0 && self == ZeroScore::Legacy => DEFAULT_DIMENSION,
            Some(v) => v,
        }
    }
}

impl PartialDatm {
    /// Fill every missing dimension with the default. Supplied values are
    /// kept verbatim, out-of-range ones included.
    pub fn apply_defaults(&self, policy: ZeroScore) -> Datm {
        Datm {
            truth: policy.resolve(self.truth),
            goodness: policy.resolve(self.goodness),
            beauty: policy.resolve(self.beauty),
            intelligence: policy.resolve(self.intelligence),
        }
    }
}

impl From<Datm> for PartialDatm {
    fn from(datm: Datm) -> Self {
        Self {
            truth: Some(datm.truth),
            goodness: Some(datm.goodness),
            beauty: Some(datm.beauty),
            intelligence: Some(datm.intelligence),
        }
    }
}

impl Default for Datm {
    fn default() -> Self {
        PartialDatm::default().apply_defaults(ZeroScore::Preserve)
    }
}

impl Datm {
    pub fn new(truth: f64, goodness: f64, beauty: f64, intelligence: f64) -> Self {
        Self {
            truth,
            goodness,
            beauty,
            intelligence,
        }
    }

    pub fn dimensions(&self) -> [f64; 4] {
        [self.truth, self.goodness, self.beauty, self.intelligence]
    }

    /// Arithmetic mean of the four dimensions.
    pub fn overall(&self) -> f64 {
        self.dimensions().iter().sum::<f64>() / 4.0
    }

    pub fn grade(&self) -> Grade {
        grade(self.overall())
    }

    /// True when every dimension individually reaches `floor`.
    /// This is not a threshold on the mean.
    pub fn meets_floor(&self, floor: f64) -> bool {
        self.dimensions().iter().all(|&d| d >= floor)
    }
}

/// Letter bucket derived from the overall score.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
        };
        f.write_str(letter)
    }
}

/// Map an overall score to a grade; first threshold reached wins.
/// Out-of-range inputs fall into the nearest bucket.
pub fn grade(overall: f64) -> Grade {
    if overall >= GRADE_A_FLOOR {
        Grade::A
    } else if overall >= GRADE_B_FLOOR {
        Grade::B
    } else if overall >= GRADE_C_FLOOR {
        Grade::C
    } else {
        Grade::D
    }
}

/// Result of scoring a partial DATM without persisting anything.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatmReport {
    pub datm: Datm,
    /// Mean rounded for display. The grade is taken from the exact mean.
    pub overall: f64,
    pub grade: Grade,
}

impl DatmReport {
    pub fn compute(partial: &PartialDatm, policy: ZeroScore) -> Self {
        let datm = partial.apply_defaults(policy);
        let exact = datm.overall();
        Self {
            datm,
            overall: round_to(exact, OVERALL_DECIMALS),
            grade: grade(exact),
        }
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
