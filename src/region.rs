use crate::error::DataError;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

pub const DEFAULT_WINDOW: i64 = 100_000;
pub const DEFAULT_OVERLAP: i64 = 300;

/// Half-open interval `[start, end)` on a contig.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Region {
    pub contig: String,
    pub start: i64,
    pub end: i64,
}

impl Region {
    pub fn new(contig: impl Into<String>, start: i64, end: i64) -> Self {
        Self {
            contig: contig.into(),
            start,
            end,
        }
    }

    pub fn len(&self) -> i64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Region string in 1-based inclusive coordinates, `contig:start+1-end`.
    pub fn to_region_string(&self) -> String {
        format!("{}:{}-{}", self.contig, self.start + 1, self.end)
    }

    /// Parses a 1-based inclusive region string such as `chr1:1,001-2,000`.
    pub fn parse(region: &str) -> Result<Self, DataError> {
        static REGION_RE: OnceLock<Regex> = OnceLock::new();
        let re = REGION_RE.get_or_init(|| {
            Regex::new(r"^(.+):([0-9,]+)-([0-9,]+)$").expect("valid region regex")
        });

        let caps = re.captures(region.trim()).ok_or_else(|| {
            DataError::Configuration(format!(
                "Region format should be `contig:start-end`, got '{}'",
                region
            ))
        })?;

        let parse_coord = |s: &str| -> Result<i64, DataError> {
            s.replace(',', "").parse::<i64>().map_err(|_| {
                DataError::Configuration(format!("Invalid coordinate '{}' in '{}'", s, region))
            })
        };
        let start = parse_coord(&caps[2])?;
        let end = parse_coord(&caps[3])?;

        if start < 1 || start > end {
            return Err(DataError::Configuration(format!(
                "Invalid region bounds in '{}'",
                region
            )));
        }

        Ok(Region::new(&caps[1], start - 1, end))
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.contig, self.start, self.end)
    }
}

/// Window size and overlap used to tile a contig.
#[derive(Debug, Clone, Copy)]
pub struct PlannerConfig {
    pub window: i64,
    pub overlap: i64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig {
            window: DEFAULT_WINDOW,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

/// Iterator over the overlapping regions of one contig.
pub struct RegionPlan {
    contig: String,
    length: i64,
    window: i64,
    overlap: i64,
    next_start: Option<i64>,
}

impl Iterator for RegionPlan {
    type Item = Region;

    fn next(&mut self) -> Option<Region> {
        let start = self.next_start?;
        let end = start + self.window;

        self.next_start = if end >= self.length {
            None
        } else {
            Some(end - self.overlap)
        };

        Some(Region::new(self.contig.clone(), start, end.min(self.length)))
    }
}

/// Tiles `[0, length)` with windows of `config.window` bases, each starting
/// `config.overlap` bases before the previous one ended.
pub fn plan(contig: &str, length: i64, config: PlannerConfig) -> Result<RegionPlan, DataError> {
    if config.window <= 0 || config.overlap < 0 || config.overlap >= config.window {
        return Err(DataError::Configuration(format!(
            "Window ({}) must be positive and larger than the overlap ({})",
            config.window, config.overlap
        )));
    }

    Ok(RegionPlan {
        contig: contig.to_string(),
        length,
        window: config.window,
        overlap: config.overlap,
        next_start: (length > 0).then_some(0),
    })
}
