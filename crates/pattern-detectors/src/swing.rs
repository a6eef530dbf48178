//! Swing-point arena (design note: "cyclic references in patterns" — BOS and
//! CHoCH reference the swing they broke by stable integer id rather than by
//! pointer, so a per-stream arena owns the swings and patterns only hold an
//! id into it).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwingKind {
    High,
    Low,
}

#[derive(Debug, Clone, Copy)]
pub struct Swing {
    pub id: u64,
    pub kind: SwingKind,
    pub price: f64,
    pub bar_index: usize,
}

#[derive(Debug, Default)]
pub struct SwingArena {
    swings: Vec<Swing>,
}

impl SwingArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: u64) -> Option<&Swing> {
        self.swings.get(id as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Swing> {
        self.swings.iter()
    }

    fn push(&mut self, kind: SwingKind, price: f64, bar_index: usize) -> u64 {
        let id = self.swings.len() as u64;
        self.swings.push(Swing {
            id,
            kind,
            price,
            bar_index,
        });
        id
    }
}

/// Detect confirmed swing highs/lows using an `n`-bar peak/trough rule: bar
/// `i` is a swing high if its high is the strict maximum within
/// `[i-n, i+n]` (symmetric for lows). A swing is only confirmed once `n`
/// bars after it are available.
pub fn detect_swings(bars: &[ict_core::Bar], window: usize) -> SwingArena {
    let mut arena = SwingArena::new();
    if window == 0 || bars.len() < 2 * window + 1 {
        return arena;
    }

    for i in window..bars.len() - window {
        let span = &bars[i - window..=i + window];
        let high = bars[i].high;
        let low = bars[i].low;

        if span.iter().all(|b| b.high <= high) && span.iter().filter(|b| b.high == high).count() == 1
        {
            arena.push(SwingKind::High, high, i);
        }
        if span.iter().all(|b| b.low >= low) && span.iter().filter(|b| b.low == low).count() == 1 {
            arena.push(SwingKind::Low, low, i);
        }
    }

    arena
}
