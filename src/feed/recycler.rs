use std::cmp::Ordering;
use std::collections::HashMap;

/// Identifier the feed assigns to each materialized entry.
pub type EntryId = u64;

/// Vertical extent of an entry relative to the top of the viewport.
///
/// Negative values are above the visible area.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub top: f64,
    pub bottom: f64,
}

impl Bounds {
    pub fn new(top: f64, bottom: f64) -> Self {
        Self { top, bottom }
    }
}

/// Geometry reported by the rendering layer after layout or scroll.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewportSnapshot {
    pub viewport_height: f64,
    pub bounds: HashMap<EntryId, Bounds>,
}

/// A materialized entry and its last known geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibleEntry<T> {
    pub id: EntryId,
    pub payload: T,
    pub bounds: Option<Bounds>,
}

impl<T> VisibleEntry<T> {
    pub fn new(id: EntryId, payload: T) -> Self {
        Self {
            id,
            payload,
            bounds: None,
        }
    }

    /// Pixels between the entry and the visible area; 0 when it overlaps
    /// the viewport or its geometry is unknown.
    fn distance_from(&self, viewport_height: f64) -> f64 {
        match self.bounds {
            Some(b) if b.bottom < 0.0 => -b.bottom,
            Some(b) if b.top > viewport_height => b.top - viewport_height,
            _ => 0.0,
        }
    }

    fn is_on_screen(&self, viewport_height: f64) -> bool {
        self.bounds
            .is_some_and(|b| b.bottom > 0.0 && b.top < viewport_height)
    }

    /// More than one viewport above, or more than two below.
    fn is_far_off_screen(&self, viewport_height: f64) -> bool {
        self.bounds.is_some_and(|b| {
            b.bottom < -viewport_height || b.top > viewport_height * 2.0
        })
    }
}

/// Bounded set of entries materialized in one scroll surface.
///
/// Entries are kept in insertion order; eviction decisions use their
/// on-screen order.
#[derive(Debug, Clone)]
pub struct ViewportWindow<T> {
    entries: Vec<VisibleEntry<T>>,
    viewport_height: f64,
    max_visible: usize,
    buffer_count: usize,
}

impl<T> ViewportWindow<T> {
    pub fn new(max_visible: usize, buffer_count: usize) -> Self {
        Self {
            entries: Vec::new(),
            viewport_height: 0.0,
            max_visible: max_visible.max(2 * buffer_count + 1),
            buffer_count,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_visible(&self) -> usize {
        self.max_visible
    }

    pub fn entries(&self) -> &[VisibleEntry<T>] {
        &self.entries
    }

    pub fn get(&self, id: EntryId) -> Option<&VisibleEntry<T>> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Track a new entry, then run an eviction pass. Returns what was evicted.
    pub fn add(&mut self, entry: VisibleEntry<T>) -> Vec<VisibleEntry<T>> {
        self.entries.push(entry);
        self.evict()
    }

    /// Track a burst of entries without evicting. The window may exceed
    /// `max_visible` until the next eviction pass.
    pub fn extend(&mut self, entries: impl IntoIterator<Item = VisibleEntry<T>>) {
        self.entries.extend(entries);
    }

    /// Remove one entry regardless of geometry.
    pub fn remove(&mut self, id: EntryId) -> Option<VisibleEntry<T>> {
        let index = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.remove(index))
    }

    /// Drop every entry, e.g. before rebuilding the window.
    pub fn clear(&mut self) -> Vec<VisibleEntry<T>> {
        std::mem::take(&mut self.entries)
    }

    /// Record the latest geometry. Entries missing from the snapshot keep
    /// their previous bounds.
    pub fn apply_snapshot(&mut self, snapshot: &ViewportSnapshot) {
        self.viewport_height = snapshot.viewport_height;
        for entry in &mut self.entries {
            if let Some(bounds) = snapshot.bounds.get(&entry.id) {
                entry.bounds = Some(*bounds);
            }
        }
    }

    /// Evict entries that are far off screen, then the furthest remaining
    /// ones until at most `max_visible` are tracked. Idempotent.
    ///
    /// Nothing is evicted while `max_visible` or fewer entries are tracked.
    /// The run of on-screen entries plus `buffer_count` neighbours on each
    /// side is only evicted when there is nothing else left to evict.
    pub fn evict(&mut self) -> Vec<VisibleEntry<T>> {
        let len = self.entries.len();
        if len <= self.max_visible {
            return Vec::new();
        }
        let vh = self.viewport_height;

        // Screen order: by top edge, unknown geometry last, insertion order on ties.
        let mut order: Vec<usize> = (0..len).collect();
        order.sort_by(|&a, &b| {
            let top = |i: usize| self.entries[i].bounds.map(|b| b.top);
            match (top(a), top(b)) {
                (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
            .then(a.cmp(&b))
        });

        let (run_start, run_end) = self.anchor_run(&order);
        let mut lo = run_start.saturating_sub(self.buffer_count);
        let mut hi = (run_end + self.buffer_count).min(len - 1);

        // At either end of the list, widen inward so the working set stays whole.
        let working_set = 2 * self.buffer_count + 1;
        while hi - lo + 1 < working_set && lo > 0 {
            lo -= 1;
        }
        while hi - lo + 1 < working_set && hi < len - 1 {
            hi += 1;
        }

        let mut protected = vec![false; len];
        for &index in &order[lo..=hi] {
            protected[index] = true;
        }

        let mut marked: Vec<bool> = self
            .entries
            .iter()
            .zip(&protected)
            .map(|(entry, &keep)| !keep && entry.is_far_off_screen(vh))
            .collect();
        let mut marked_count = marked.iter().filter(|&&m| m).count();

        // Still over budget: furthest first, unprotected before protected.
        if len - marked_count > self.max_visible {
            let mut candidates: Vec<usize> = (0..len).filter(|&i| !marked[i]).collect();
            candidates.sort_by(|&a, &b| {
                protected[a]
                    .cmp(&protected[b])
                    .then_with(|| {
                        let da = self.entries[a].distance_from(vh);
                        let db = self.entries[b].distance_from(vh);
                        db.partial_cmp(&da).unwrap_or(Ordering::Equal)
                    })
                    .then(a.cmp(&b))
            });
            let excess = len - marked_count - self.max_visible;
            for &index in candidates.iter().take(excess) {
                marked[index] = true;
                marked_count += 1;
            }
        }

        let mut evicted = Vec::with_capacity(marked_count);
        let mut kept = Vec::with_capacity(len - marked_count);
        for (entry, is_marked) in std::mem::take(&mut self.entries).into_iter().zip(marked) {
            if is_marked {
                evicted.push(entry);
            } else {
                kept.push(entry);
            }
        }
        self.entries = kept;

        tracing::debug!(
            recycled = evicted.len(),
            remaining = self.entries.len(),
            "Recycled entries"
        );
        evicted
    }

    /// Positions (in screen order) of the run the viewer is looking at.
    ///
    /// The on-screen run when geometry shows one, otherwise the entry
    /// closest to the viewport, otherwise the newest entry.
    fn anchor_run(&self, order: &[usize]) -> (usize, usize) {
        let vh = self.viewport_height;
        let on_screen = |pos: &usize| self.entries[order[*pos]].is_on_screen(vh);
        let first = (0..order.len()).find(on_screen);
        let last = (0..order.len()).rev().find(on_screen);
        if let (Some(first), Some(last)) = (first, last) {
            return (first, last);
        }

        let nearest = (0..order.len())
            .filter(|&pos| self.entries[order[pos]].bounds.is_some())
            .min_by(|&a, &b| {
                let da = self.entries[order[a]].distance_from(vh);
                let db = self.entries[order[b]].distance_from(vh);
                da.partial_cmp(&db).unwrap_or(Ordering::Equal)
            });
        if let Some(pos) = nearest {
            return (pos, pos);
        }

        let newest = self.entries.len() - 1;
        let pos = order
            .iter()
            .position(|&i| i == newest)
            .unwrap_or(order.len() - 1);
        (pos, pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    const VH: f64 = 800.0;

    /// Window with `n` stacked tiles of height `VH`, scrolled so tile
    /// `current` fills the viewport.
    fn stacked(n: u64, current: u64) -> ViewportWindow<&'static str> {
        let mut window = ViewportWindow::new(5, 1);
        for id in 0..n {
            window.entries.push(VisibleEntry::new(id, "tile"));
        }
        window.apply_snapshot(&stacked_snapshot(n, current));
        window
    }

    fn stacked_snapshot(n: u64, current: u64) -> ViewportSnapshot {
        let bounds = (0..n)
            .map(|id| {
                let top = (id as f64 - current as f64) * VH;
                (id, Bounds::new(top, top + VH))
            })
            .collect();
        ViewportSnapshot {
            viewport_height: VH,
            bounds,
        }
    }

    fn ids<T>(entries: &[VisibleEntry<T>]) -> Vec<EntryId> {
        entries.iter().map(|e| e.id).collect()
    }

    #[test]
    fn test_no_eviction_at_or_below_max() {
        let mut window = stacked(5, 4);
        assert!(window.evict().is_empty());
        assert_eq!(window.len(), 5);
    }

    #[test]
    fn test_far_above_entries_evicted() {
        // Tiles 0..=3 are above; only 0 and 1 end more than one viewport up.
        let mut window = stacked(6, 4);
        let evicted = window.evict();
        assert_eq!(ids(&evicted), vec![0, 1]);
        assert_eq!(ids(window.entries()), vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_far_below_entries_evicted() {
        let mut window = stacked(7, 0);
        let evicted = window.evict();
        // tops: 0, 800, 1600, 2400, ... : strictly beyond 1600 goes.
        assert_eq!(ids(&evicted), vec![3, 4, 5, 6]);
        assert_eq!(ids(window.entries()), vec![0, 1, 2]);
    }

    #[test]
    fn test_visible_run_and_neighbours_protected() {
        // Short tiles: 0..6 all within a couple of viewports.
        let mut window: ViewportWindow<()> = ViewportWindow::new(5, 1);
        for id in 0..7 {
            window.entries.push(VisibleEntry::new(id, ()));
        }
        let bounds = (0..7)
            .map(|id| {
                let top = -1000.0 + id as f64 * 400.0;
                (id, Bounds::new(top, top + 400.0))
            })
            .collect();
        window.apply_snapshot(&ViewportSnapshot {
            viewport_height: VH,
            bounds,
        });

        // On screen: 2 (-200..200), 3 (200..600), 4 (600..1000). Neighbours 1 and 5.
        let evicted = window.evict();
        assert_eq!(ids(&evicted), vec![0, 6]);
        assert_eq!(ids(window.entries()), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_over_budget_evicts_furthest_first() {
        // Nothing is "far" (all within one viewport below), yet 7 > 5.
        let mut window: ViewportWindow<()> = ViewportWindow::new(5, 1);
        for id in 0..7 {
            window.entries.push(VisibleEntry::new(id, ()));
        }
        let bounds = (0..7)
            .map(|id| {
                let top = id as f64 * 250.0;
                (id, Bounds::new(top, top + 250.0))
            })
            .collect();
        window.apply_snapshot(&ViewportSnapshot {
            viewport_height: VH,
            bounds,
        });

        let evicted = window.evict();
        assert_eq!(ids(&evicted), vec![5, 6]);
        assert_eq!(window.len(), 5);
    }

    #[test]
    fn test_unknown_geometry_keeps_newest() {
        let mut window: ViewportWindow<()> = ViewportWindow::new(5, 1);
        for id in 0..8 {
            window.add(VisibleEntry::new(id, ()));
        }
        assert_eq!(ids(window.entries()), vec![3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_evict_is_idempotent() {
        let mut window = stacked(9, 4);
        window.evict();
        let after_first = ids(window.entries());
        assert!(window.evict().is_empty());
        assert_eq!(ids(window.entries()), after_first);
    }

    #[test]
    fn test_add_runs_eviction() {
        let mut window = stacked(5, 4);
        let evicted = window.add(VisibleEntry::new(5, "tile"));
        // A sixth entry pushes the window over; 0 and 1 are far above.
        assert_eq!(ids(&evicted), vec![0, 1]);
        assert_eq!(window.get(5).map(|e| e.payload), Some("tile"));
    }

    #[test]
    fn test_snapshot_keeps_bounds_for_unlisted_entries() {
        let mut window = stacked(3, 0);
        window.apply_snapshot(&ViewportSnapshot {
            viewport_height: 600.0,
            bounds: HashMap::from([(0, Bounds::new(-10.0, 590.0))]),
        });
        assert_eq!(window.get(0).unwrap().bounds, Some(Bounds::new(-10.0, 590.0)));
        assert_eq!(window.get(1).unwrap().bounds, Some(Bounds::new(VH, 2.0 * VH)));
    }

    #[test]
    fn test_extend_overshoots_until_next_pass() {
        let mut window: ViewportWindow<()> = ViewportWindow::new(5, 1);
        window.extend((0..8).map(|id| VisibleEntry::new(id, ())));
        assert_eq!(window.len(), 8);

        window.apply_snapshot(&stacked_snapshot(8, 0));
        let evicted = window.evict();
        assert_eq!(ids(&evicted), vec![3, 4, 5, 6, 7]);
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut window = stacked(4, 0);
        assert_eq!(window.remove(2).map(|e| e.id), Some(2));
        assert!(window.remove(2).is_none());
        assert_eq!(ids(&window.clear()), vec![0, 1, 3]);
        assert!(window.is_empty());
    }

    fn arb_bounds() -> impl Strategy<Value = Option<(f64, f64)>> {
        prop::option::of((-5000.0f64..5000.0, 1.0f64..1500.0))
    }

    proptest! {
        #[test]
        fn prop_evict_respects_budget(
            max_visible in 3usize..8,
            geometry in prop::collection::vec(arb_bounds(), 0..20),
            viewport_height in 100.0f64..1200.0,
        ) {
            let mut window: ViewportWindow<usize> = ViewportWindow::new(max_visible, 1);
            let mut snapshot = ViewportSnapshot { viewport_height, bounds: HashMap::new() };
            for (i, g) in geometry.iter().enumerate() {
                window.entries.push(VisibleEntry::new(i as EntryId, i));
                if let Some((top, height)) = g {
                    snapshot.bounds.insert(i as EntryId, Bounds::new(*top, top + height));
                }
            }
            window.apply_snapshot(&snapshot);

            let before = window.len();
            let evicted = window.evict();

            prop_assert_eq!(evicted.len() + window.len(), before);
            if before <= max_visible {
                prop_assert!(evicted.is_empty());
            } else {
                prop_assert!(window.len() <= max_visible);
                prop_assert!(window.len() >= 3);
            }
            // Survivors keep insertion order.
            let kept: Vec<usize> = window.entries().iter().map(|e| e.payload).collect();
            let mut sorted = kept.clone();
            sorted.sort();
            prop_assert_eq!(kept, sorted);
        }
    }
}
