use std::io::BufRead;

use anyhow::Result;
use serde::Serialize;

use crate::{
    cache::{Cache, CacheStat, ConfigurationError, Geometry, Outcome},
    trace::TraceReader,
};

#[cfg(feature = "stat")]
use crate::stat::{AddStats, AmatStat, Stats};

/// cycle costs used for the average memory access time.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Timing {
    pub hit_time: f64,
    pub miss_penalty: f64,
}

impl Timing {
    pub const DEFAULT_HIT_TIME: f64 = 1.0;
    pub const DEFAULT_MISS_PENALTY: f64 = 50.0;

    /// `hit_time + miss_rate * miss_penalty`
    pub fn amat(&self, miss_rate: f64) -> f64 {
        self.hit_time + miss_rate * self.miss_penalty
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            hit_time: Self::DEFAULT_HIT_TIME,
            miss_penalty: Self::DEFAULT_MISS_PENALTY,
        }
    }
}

/// drives one trace through one cache.
pub struct Simulator {
    cache: Cache,
    #[cfg(feature = "stat")]
    stat_builder: stat::SimStatBuilder,
}

impl Simulator {
    pub fn new(geometry: Geometry) -> Result<Self, ConfigurationError> {
        log::info!("cache geometry: {geometry}");
        Ok(Self {
            cache: Cache::new(geometry)?,
            #[cfg(feature = "stat")]
            stat_builder: stat::SimStatBuilder::new(),
        })
    }

    pub fn access(&mut self, addr: u64) -> Outcome {
        let outcome = self.cache.access(addr);
        log::trace!("{addr:#018x}: {outcome}");
        outcome
    }

    /// feeds the trace through the cache line by line. stops at the first bad line.
    pub fn run(&mut self, trace: impl BufRead) -> Result<()> {
        #[cfg(feature = "stat")]
        self.stat_builder.start_timer();
        let mut reader = TraceReader::new(trace);
        for addr in reader.by_ref() {
            self.access(addr?);
        }
        #[cfg(feature = "stat")]
        {
            self.stat_builder.entries(reader.entries());
            self.stat_builder.skipped(reader.skipped());
            self.stat_builder.stop_timer();
        }
        log::debug!("{} blank/comment lines skipped.", reader.skipped());
        log::info!("finished simulation. # of accesses: {}", reader.entries());
        Ok(())
    }

    pub fn cache_stat(&self) -> CacheStat {
        self.cache.stat()
    }

    pub fn into_cache(self) -> Cache {
        self.cache
    }
}

#[cfg(feature = "stat")]
impl Simulator {
    pub fn collect_stat(&self, timing: Timing) -> Stats {
        let mut ss = Stats::default();
        self.add_stats(&mut ss);
        ss.push(Box::new(AmatStat::new(timing, &self.cache.stat())));
        ss
    }
}

#[cfg(feature = "stat")]
impl AddStats for Simulator {
    fn add_stats(&self, buf: &mut Stats) {
        buf.push(Box::new(self.stat_builder.finish()));
        buf.push(Box::new(self.cache.stat()));
    }
}

#[cfg(feature = "stat")]
mod stat {
    use crate::stat::*;

    use std::{fmt, time};

    pub struct SimStatBuilder {
        begin: Option<time::Instant>,
        entries: Option<usize>,
        skipped: Option<usize>,
        elapsed: Option<time::Duration>,
    }

    impl SimStatBuilder {
        pub fn new() -> Self {
            Self {
                begin: None,
                entries: None,
                skipped: None,
                elapsed: None,
            }
        }
        pub fn entries(&mut self, entries: usize) {
            self.entries = Some(entries)
        }
        pub fn skipped(&mut self, skipped: usize) {
            self.skipped = Some(skipped)
        }
        pub fn start_timer(&mut self) {
            self.begin = Some(time::Instant::now())
        }
        pub fn stop_timer(&mut self) {
            self.elapsed = self.begin.map(|b| b.elapsed())
        }
        /// fields not yet recorded read as zero.
        pub fn finish(&self) -> SimStat {
            SimStat {
                entries: self.entries.unwrap_or_default(),
                skipped: self.skipped.unwrap_or_default(),
                elapsed: self.elapsed.unwrap_or_default(),
            }
        }
    }

    impl Default for SimStatBuilder {
        fn default() -> Self {
            Self::new()
        }
    }

    pub struct SimStat {
        entries: usize,
        skipped: usize,
        elapsed: time::Duration,
    }

    impl Stat for SimStat {
        fn view(&self, _: usize) -> Box<dyn StatView + '_> {
            Box::new(self)
        }
    }

    impl StatView for &'_ SimStat {
        fn header(&self) -> &'static str {
            "simulator stat"
        }
        fn width(&self) -> usize {
            33
        }
    }

    impl fmt::Display for &'_ SimStat {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let ms = format!("{} ms", self.elapsed.as_millis());
            writeln!(f, "  elapsed total: {ms:>9}")?;
            let entries = format!("#{}", self.entries);
            writeln!(f, "  trace entries: {entries:>9}")?;
            let skipped = format!("#{}", self.skipped);
            write!(f, "  lines skipped: {skipped:>9}")
        }
    }
}
