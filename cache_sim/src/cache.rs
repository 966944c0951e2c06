use std::fmt;

use serde::Serialize;
use thiserror::Error;

pub const KIB: u64 = 1024u64;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("cache size must be > 0")]
    ZeroCapacity,
    #[error("block size must be > 0")]
    ZeroBlockSize,
    #[error("cache size of {capacity_kb} KiB does not fit in a 64-bit byte count")]
    CapacityOverflow { capacity_kb: u64 },
    #[error("cache size ({capacity_bytes} bytes) must be divisible by block size ({block_size} bytes)")]
    CapacityNotMultipleOfBlock { capacity_bytes: u64, block_size: u64 },
    #[error("associativity {associativity} must divide total number of lines ({num_lines})")]
    LinesNotMultipleOfAssociativity { num_lines: u64, associativity: u64 },
    #[error("cannot allocate storage for {num_lines} lines")]
    TooManyLines { num_lines: u64 },
}

/// shape of the cache. immutable once built.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Geometry {
    capacity_bytes: u64,
    block_size: u64,
    associativity: usize,
    num_sets: usize,
}

impl Geometry {
    /// `associativity == 0` requests a fully associative cache (one set).
    pub fn new(
        capacity_kb: u64,
        block_size: u64,
        associativity: u64,
    ) -> Result<Self, ConfigurationError> {
        if capacity_kb == 0 {
            return Err(ConfigurationError::ZeroCapacity);
        }
        if block_size == 0 {
            return Err(ConfigurationError::ZeroBlockSize);
        }
        let capacity_bytes = capacity_kb
            .checked_mul(KIB)
            .ok_or(ConfigurationError::CapacityOverflow { capacity_kb })?;
        if capacity_bytes % block_size != 0 {
            return Err(ConfigurationError::CapacityNotMultipleOfBlock {
                capacity_bytes,
                block_size,
            });
        }
        let num_lines = capacity_bytes / block_size;
        let associativity = if associativity == 0 {
            num_lines
        } else {
            associativity
        };
        if num_lines % associativity != 0 {
            return Err(ConfigurationError::LinesNotMultipleOfAssociativity {
                num_lines,
                associativity,
            });
        }
        let num_sets = num_lines / associativity;
        let (Ok(_), Ok(associativity), Ok(num_sets)) = (
            usize::try_from(num_lines),
            usize::try_from(associativity),
            usize::try_from(num_sets),
        ) else {
            return Err(ConfigurationError::TooManyLines { num_lines });
        };
        Ok(Self {
            capacity_bytes,
            block_size,
            associativity,
            num_sets,
        })
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes
    }
    pub fn capacity_kb(&self) -> u64 {
        self.capacity_bytes / KIB
    }
    pub fn block_size(&self) -> u64 {
        self.block_size
    }
    /// ways per set, after resolving fully associative requests.
    pub fn associativity(&self) -> usize {
        self.associativity
    }
    pub fn num_sets(&self) -> usize {
        self.num_sets
    }
    pub fn num_lines(&self) -> usize {
        self.num_sets * self.associativity
    }
    pub fn is_fully_associative(&self) -> bool {
        self.num_sets == 1
    }

    /// splits a byte address into `(set_index, tag)`.
    pub fn decompose(&self, addr: u64) -> (usize, u64) {
        let block_addr = addr / self.block_size;
        let num_sets = self.num_sets as u64;
        // num_sets fits in usize, so does anything modulo it
        let index = (block_addr % num_sets) as usize;
        let tag = block_addr / num_sets;
        (index, tag)
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} KiB, {} B blocks, {}-way, {} sets",
            self.capacity_kb(),
            self.block_size,
            self.associativity,
            self.num_sets
        )
    }
}

#[derive(Default, Clone, Copy, Debug)]
struct Line {
    valid: bool,
    tag: u64,
    last_used: u64,
}

impl Line {
    fn holds(&self, tag: u64) -> bool {
        self.valid && self.tag == tag
    }
    fn fill(&mut self, tag: u64, now: u64) {
        self.valid = true;
        self.tag = tag;
        self.last_used = now;
    }
}

/// view over the `associativity` lines of one set.
struct Set<'a> {
    lines: &'a mut [Line],
}

impl Set<'_> {
    fn lookup(&mut self, tag: u64) -> Option<&mut Line> {
        self.lines.iter_mut().find(|l| l.holds(tag))
    }

    /// picks the line to overwrite: first invalid line, else the least recently used.
    /// `min_by_key` keeps the lowest index among equal `last_used`.
    fn victim(&mut self) -> (&mut Line, Fill) {
        let index = match self.lines.iter().position(|l| !l.valid) {
            Some(i) => i,
            None => self
                .lines
                .iter()
                .enumerate()
                .min_by_key(|(_, l)| l.last_used)
                .map(|(i, _)| i)
                .unwrap_or_default(),
        };
        let line = &mut self.lines[index];
        let fill = if line.valid {
            Fill::Evict { tag: line.tag }
        } else {
            Fill::Cold
        };
        (line, fill)
    }
}

/// how a miss was resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fill {
    /// an invalid line received the block
    Cold,
    /// a valid line holding `tag` was replaced
    Evict { tag: u64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Hit,
    Miss(Fill),
}

impl Outcome {
    #[must_use]
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Hit => write!(f, "hit"),
            Outcome::Miss(Fill::Cold) => write!(f, "miss (cold)"),
            Outcome::Miss(Fill::Evict { tag }) => write!(f, "miss (evicted tag {tag:#x})"),
        }
    }
}

/// set-associative cache with LRU replacement.
pub struct Cache {
    geometry: Geometry,
    /// set `i` owns `lines[i * associativity..(i + 1) * associativity]`
    lines: Vec<Line>,
    /// logical clock, bumped once per access
    clock: u64,
    accesses: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl Cache {
    /// fails with [`ConfigurationError::TooManyLines`] if the line storage cannot be allocated.
    pub fn new(geometry: Geometry) -> Result<Self, ConfigurationError> {
        let num_lines = geometry.num_lines();
        let mut lines = Vec::new();
        lines
            .try_reserve_exact(num_lines)
            .map_err(|_| ConfigurationError::TooManyLines {
                num_lines: num_lines as u64,
            })?;
        lines.resize(num_lines, Line::default());
        Ok(Self {
            geometry,
            lines,
            clock: 0,
            accesses: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        })
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn access(&mut self, addr: u64) -> Outcome {
        self.clock += 1;
        self.accesses += 1;
        let now = self.clock;
        let (index, tag) = self.geometry.decompose(addr);
        let ways = self.geometry.associativity();
        let mut set = Set {
            lines: &mut self.lines[index * ways..(index + 1) * ways],
        };

        if let Some(line) = set.lookup(tag) {
            self.hits += 1;
            line.last_used = now;
            return Outcome::Hit;
        }

        self.misses += 1;
        let (line, fill) = set.victim();
        line.fill(tag, now);
        if let Fill::Evict { .. } = fill {
            self.evictions += 1;
        }
        Outcome::Miss(fill)
    }

    pub fn stat(&self) -> CacheStat {
        CacheStat {
            cache_size_kb: self.geometry.capacity_kb(),
            block_size_bytes: self.geometry.block_size(),
            associativity: self.geometry.associativity(),
            num_sets: self.geometry.num_sets(),
            accesses: self.accesses,
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            hit_rate: ratio(self.hits, self.accesses),
            miss_rate: ratio(self.misses, self.accesses),
        }
    }
}

fn ratio(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

/// snapshot of geometry and counters. rates are unrounded.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct CacheStat {
    pub cache_size_kb: u64,
    pub block_size_bytes: u64,
    pub associativity: usize,
    pub num_sets: usize,
    pub accesses: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub hit_rate: f64,
    pub miss_rate: f64,
}
