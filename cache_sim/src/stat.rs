use std::fmt;

use crate::{cache::CacheStat, sim::Timing};

pub trait Stat {
    fn view(&self, max_width: usize) -> Box<dyn StatView + '_>;
}

pub trait StatView: fmt::Display {
    /// header of stat
    fn header(&self) -> &'static str;
    /// body width
    fn width(&self) -> usize;
}

pub trait AddStats {
    /// add stat to `buf`.
    fn add_stats(&self, buf: &mut Stats);
}

#[derive(Default)]
pub struct Stats {
    stats: Vec<Box<dyn Stat>>,
}

impl Stats {
    pub fn push(&mut self, stat: Box<dyn Stat>) {
        self.stats.push(stat)
    }
    pub fn len(&self) -> usize {
        self.stats.len()
    }
    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }
}

pub struct StatAllView<'s> {
    views: Vec<Box<dyn StatView + 's>>,
    max_width: usize,
}

impl Stats {
    pub fn view(&self, max_width: usize) -> StatAllView<'_> {
        StatAllView {
            views: self.stats.iter().map(|s| s.view(max_width)).collect(),
            max_width,
        }
    }
}

impl fmt::Display for StatAllView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .views
            .iter()
            .map(|s| s.header().len().max(s.width()))
            .max()
            .unwrap_or(0)
            .min(self.max_width);
        writeln!(f, "{:-^width$}", " statistics ")?;
        for sv in &self.views {
            writeln!(f, "{}:", sv.header())?;
            writeln!(f, "{}", sv)?;
        }
        write!(f, "{:-<width$}", "")
    }
}

fn pct(rate: f64) -> String {
    format!("{:.2}", 100. * rate)
}

impl Stat for CacheStat {
    fn view(&self, _: usize) -> Box<dyn StatView + '_> {
        Box::new(CacheStatView { stat: self })
    }
}

pub struct CacheStatView<'a> {
    stat: &'a CacheStat,
}

impl StatView for CacheStatView<'_> {
    fn header(&self) -> &'static str {
        "cache stat"
    }
    fn width(&self) -> usize {
        40
    }
}

impl fmt::Display for CacheStatView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.stat;
        let size = format!("{} KB", s.cache_size_kb);
        let block = format!("{} B", s.block_size_bytes);
        let assoc = format!("{}-way", s.associativity);
        writeln!(f, "     cache size: {size:>12}")?;
        writeln!(f, "     block size: {block:>12}")?;
        writeln!(f, "  associativity: {assoc:>12}")?;
        writeln!(f, " number of sets: {:>12}", s.num_sets)?;
        writeln!(f, "       accesses: {:>12}", s.accesses)?;
        writeln!(f, "           hits: {:>12} ({:>6}%)", s.hits, pct(s.hit_rate))?;
        writeln!(f, "         misses: {:>12} ({:>6}%)", s.misses, pct(s.miss_rate))?;
        write!(f, "      evictions: {:>12}", s.evictions)
    }
}

/// average memory access time derived from a cache snapshot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AmatStat {
    pub amat: f64,
    pub timing: Timing,
}

impl AmatStat {
    pub fn new(timing: Timing, cache: &CacheStat) -> Self {
        Self {
            amat: timing.amat(cache.miss_rate),
            timing,
        }
    }
}

impl Stat for AmatStat {
    fn view(&self, _: usize) -> Box<dyn StatView + '_> {
        Box::new(self)
    }
}

impl StatView for &'_ AmatStat {
    fn header(&self) -> &'static str {
        "timing stat"
    }
    fn width(&self) -> usize {
        40
    }
}

impl fmt::Display for &'_ AmatStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let amat = format!("{:.2} cycles", self.amat);
        writeln!(f, "           AMAT: {amat:>16}")?;
        writeln!(f, "       hit time: {:>16}", self.timing.hit_time)?;
        write!(f, "   miss penalty: {:>16}", self.timing.miss_penalty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Cache, Geometry};

    #[test]
    fn test_amat_stat_from_cache() {
        let mut c = Cache::new(Geometry::new(1, 16, 1).unwrap()).unwrap();
        c.access(0x0);
        c.access(0x4);
        c.access(0x8);
        c.access(0xc);
        let a = AmatStat::new(Timing::default(), &c.stat());
        assert_eq!(a.amat, 1.0 + 0.25 * 50.0);
    }

    #[test]
    fn test_view() {
        let mut c = Cache::new(Geometry::new(1, 16, 1).unwrap()).unwrap();
        c.access(0x0);
        c.access(0x4);
        c.access(0xf);
        let cs = c.stat();
        let mut stats = Stats::default();
        stats.push(Box::new(cs));
        stats.push(Box::new(AmatStat::new(Timing::default(), &cs)));
        assert_eq!(stats.len(), 2);
        let out = stats.view(120).to_string();
        assert!(out.starts_with('-'));
        assert!(out.contains("cache stat:"));
        assert!(out.contains("1 KB"));
        assert!(out.contains("1-way"));
        assert!(out.contains("66.67%"));
        assert!(out.contains("33.33%"));
        assert!(out.contains("17.67 cycles"));
    }

    #[test]
    fn test_empty_view() {
        let out = Stats::default().view(80).to_string();
        assert_eq!(out, " statistics \n");
    }
}
