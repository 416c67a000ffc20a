//! Media pools: deterministic selectors over a sorted candidate list.
//!
//! All strategies share one interface (`peek` / `get` / `select` / `advance` / `reject`). Random
//! pools keep their history in the [`Histories`] arena owned by the [`PoolSet`], so pools declared
//! with the same `--shared-history` key see each other's picks.

pub mod history;
pub mod season;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::catalog::{MediaCatalog, resolve_file};
use crate::dsl::ast::{PoolDecl, Strategy};
use crate::dsl::program::Program;
use crate::foundation::error::{TelecastError, TelecastResult};
use crate::foundation::rng::Rng64;

pub use history::{Histories, History, HistoryId};
use season::in_season;

#[derive(Clone, Debug)]
enum Selector {
    Sequential {
        cursor: usize,
    },
    Shuffled {
        cursor: usize,
    },
    Random {
        rng: Rng64,
        current: usize,
        history: HistoryId,
    },
}

#[derive(Clone, Debug)]
pub struct Pool {
    name: String,
    items: Vec<String>,
    selector: Selector,
}

impl Pool {
    pub fn sequential(
        name: impl Into<String>,
        items: Vec<String>,
        offset: u64,
    ) -> TelecastResult<Self> {
        let name = name.into();
        let items = canonical(&name, items)?;
        let cursor = (offset % items.len() as u64) as usize;
        Ok(Self {
            name,
            items,
            selector: Selector::Sequential { cursor },
        })
    }

    pub fn shuffled(
        name: impl Into<String>,
        items: Vec<String>,
        seed: &str,
    ) -> TelecastResult<Self> {
        let name = name.into();
        let mut items = canonical(&name, items)?;
        Rng64::from_str_seed(seed).shuffle(&mut items);
        Ok(Self {
            name,
            items,
            selector: Selector::Shuffled { cursor: 0 },
        })
    }

    pub fn random(
        name: impl Into<String>,
        items: Vec<String>,
        seed: &str,
        history: HistoryId,
        histories: &Histories,
    ) -> TelecastResult<Self> {
        let name = name.into();
        let items = canonical(&name, items)?;
        let mut rng = Rng64::from_str_seed(seed);
        let current = draw(&mut rng, &items, histories.get(history));
        Ok(Self {
            name,
            items,
            selector: Selector::Random {
                rng,
                current,
                history,
            },
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Candidates in selection order (sorted, or permuted for shuffled pools).
    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn history_id(&self) -> Option<HistoryId> {
        match self.selector {
            Selector::Random { history, .. } => Some(history),
            _ => None,
        }
    }

    /// Current candidate without touching any state.
    ///
    /// For random pools this can be stale if a sibling pool has since committed the same item
    /// to a shared history; [`Pool::get`] re-rolls in that case.
    pub fn peek(&self) -> &str {
        &self.items[self.index()]
    }

    /// Current candidate, re-rolled first if it has entered the history since it was drawn.
    pub fn get(&mut self, histories: &Histories) -> &str {
        if let Selector::Random {
            rng,
            current,
            history,
        } = &mut self.selector
        {
            let h = histories.get(*history);
            if h.contains(&self.items[*current]) {
                *current = draw(rng, &self.items, h);
            }
        }
        self.peek()
    }

    /// Commit the current candidate as played and move on.
    pub fn advance(&mut self, histories: &mut Histories) {
        let n = self.items.len();
        match &mut self.selector {
            Selector::Sequential { cursor } | Selector::Shuffled { cursor } => {
                *cursor = (*cursor + 1) % n;
            }
            Selector::Random {
                rng,
                current,
                history,
            } => {
                let h = histories.get_mut(*history);
                h.push(&self.items[*current]);
                *current = draw(rng, &self.items, h);
            }
        }
    }

    /// Current candidate restricted to items `eligible` accepts, or `None` if it accepts none.
    ///
    /// Sequential and shuffled pools step past ineligible items in order. Random pools redraw
    /// among eligible items outside the history, and repeat an eligible item only when the
    /// history holds all of them. Nothing is recorded.
    pub fn select(
        &mut self,
        histories: &Histories,
        eligible: impl Fn(&str) -> bool,
    ) -> Option<&str> {
        let n = self.items.len();
        match &mut self.selector {
            Selector::Sequential { cursor } | Selector::Shuffled { cursor } => {
                let step = (0..n).find(|k| eligible(self.items[(*cursor + k) % n].as_str()))?;
                *cursor = (*cursor + step) % n;
            }
            Selector::Random {
                rng,
                current,
                history,
            } => {
                let h = histories.get(*history);
                let item = self.items[*current].as_str();
                if !eligible(item) || h.contains(item) {
                    *current = draw_where(rng, &self.items, h, &eligible)?;
                }
            }
        }
        Some(self.peek())
    }

    /// Skip the current candidate without counting it as played.
    pub fn reject(&mut self, histories: &Histories) {
        let n = self.items.len();
        match &mut self.selector {
            Selector::Sequential { cursor } | Selector::Shuffled { cursor } => {
                *cursor = (*cursor + 1) % n;
            }
            Selector::Random {
                rng,
                current,
                history,
            } => {
                *current = draw(rng, &self.items, histories.get(*history));
            }
        }
    }

    fn index(&self) -> usize {
        match self.selector {
            Selector::Sequential { cursor } | Selector::Shuffled { cursor } => cursor,
            Selector::Random { current, .. } => current,
        }
    }
}

fn canonical(name: &str, mut items: Vec<String>) -> TelecastResult<Vec<String>> {
    if items.is_empty() {
        return Err(TelecastError::empty_pool(name));
    }
    items.sort();
    items.dedup();
    Ok(items)
}

/// Uniform pick that avoids anything in `history`, unless the history already covers every
/// candidate.
fn draw(rng: &mut Rng64, items: &[String], history: &History) -> usize {
    draw_where(rng, items, history, |_| true).unwrap_or_else(|| rng.below(items.len()))
}

/// Uniform pick among the `eligible` candidates that are not in `history`. When the history
/// covers every eligible candidate it is ignored. `None` when nothing is eligible.
fn draw_where(
    rng: &mut Rng64,
    items: &[String],
    history: &History,
    eligible: impl Fn(&str) -> bool,
) -> Option<usize> {
    let allowed: Vec<usize> = (0..items.len())
        .filter(|&i| eligible(items[i].as_str()))
        .collect();
    let fresh: Vec<usize> = allowed
        .iter()
        .copied()
        .filter(|&i| !history.contains(&items[i]))
        .collect();
    let from = if fresh.is_empty() { allowed } else { fresh };
    if from.is_empty() {
        return None;
    }
    Some(from[rng.below(from.len())])
}

fn unknown_pool(name: &str) -> TelecastError {
    TelecastError::evaluation(format!("unknown pool '{name}'"))
}

/// Every pool of a program plus the state they share.
#[derive(Clone, Debug)]
pub struct PoolSet {
    pools: BTreeMap<String, Pool>,
    histories: Histories,
    shared: BTreeMap<String, HistoryId>,
    choice_rng: Rng64,
    media_root: Option<PathBuf>,
}

impl PoolSet {
    /// Resolve every declared pool through `catalog` and construct it.
    #[tracing::instrument(skip_all)]
    pub fn build(program: &Program, catalog: &dyn MediaCatalog) -> TelecastResult<Self> {
        let mut set = Self::build_with(program, |decl| catalog.candidates(&decl.source))?;
        set.media_root = catalog.media_root().map(Path::to_path_buf);
        Ok(set)
    }

    /// Like [`PoolSet::build`] with an arbitrary candidate resolver.
    pub fn build_with<F>(program: &Program, mut resolve: F) -> TelecastResult<Self>
    where
        F: FnMut(&PoolDecl) -> TelecastResult<Vec<String>>,
    {
        let mut set = Self {
            pools: BTreeMap::new(),
            histories: Histories::default(),
            shared: BTreeMap::new(),
            choice_rng: Rng64::from_str_seed(program.choice_seed()),
            media_root: None,
        };
        for decl in program.pools() {
            let items = resolve(decl)?;
            let pool = set.construct(decl, items)?;
            tracing::debug!(pool = %decl.name, candidates = pool.len(), "pool ready");
            set.pools.insert(decl.name.clone(), pool);
        }
        Ok(set)
    }

    fn construct(&mut self, decl: &PoolDecl, items: Vec<String>) -> TelecastResult<Pool> {
        match &decl.strategy {
            Strategy::Sequential { offset } => Pool::sequential(&decl.name, items, *offset),
            Strategy::Shuffled { seed } => Pool::shuffled(&decl.name, items, seed),
            Strategy::Random {
                seed,
                memory,
                shared_history,
            } => {
                let id = match shared_history {
                    Some(key) => match self.shared.get(key) {
                        Some(&id) => id,
                        None => {
                            let id = self.histories.alloc(*memory);
                            self.shared.insert(key.clone(), id);
                            id
                        }
                    },
                    None => self.histories.alloc(*memory),
                };
                Pool::random(&decl.name, items, seed, id, &self.histories)
            }
        }
    }

    pub fn pool(&self, name: &str) -> Option<&Pool> {
        self.pools.get(name)
    }

    pub fn pools(&self) -> impl Iterator<Item = &Pool> {
        self.pools.values()
    }

    pub fn history(&self, id: HistoryId) -> &History {
        self.histories.get(id)
    }

    pub fn shared_history(&self, key: &str) -> Option<&History> {
        self.shared.get(key).map(|&id| self.histories.get(id))
    }

    pub fn len_of(&self, name: &str) -> TelecastResult<usize> {
        self.pools
            .get(name)
            .map(Pool::len)
            .ok_or_else(|| unknown_pool(name))
    }

    /// [`Pool::get`] by name, returning an owned path.
    pub fn current(&mut self, name: &str) -> TelecastResult<String> {
        let Self {
            pools, histories, ..
        } = self;
        let pool = pools.get_mut(name).ok_or_else(|| unknown_pool(name))?;
        Ok(pool.get(histories).to_owned())
    }

    pub fn advance(&mut self, name: &str) -> TelecastResult<()> {
        let Self {
            pools, histories, ..
        } = self;
        let pool = pools.get_mut(name).ok_or_else(|| unknown_pool(name))?;
        pool.advance(histories);
        Ok(())
    }

    /// [`Pool::select`] by name with seasonal gating for `date`.
    pub fn select(&mut self, name: &str, date: Option<NaiveDate>) -> TelecastResult<String> {
        let Self {
            pools, histories, ..
        } = self;
        let pool = pools.get_mut(name).ok_or_else(|| unknown_pool(name))?;
        pool.select(histories, |path| in_season(path, date))
            .map(str::to_owned)
            .ok_or_else(|| {
                TelecastError::evaluation(format!("pool '{name}' has no in-season candidate"))
            })
    }

    pub fn reject(&mut self, name: &str) -> TelecastResult<()> {
        let Self {
            pools, histories, ..
        } = self;
        let pool = pools.get_mut(name).ok_or_else(|| unknown_pool(name))?;
        pool.reject(histories);
        Ok(())
    }

    /// Path a `file` statement refers to, relative to the catalog's media root.
    pub fn resolve_file(&self, path: &str) -> String {
        resolve_file(self.media_root.as_deref(), path)
    }

    /// Deterministic index in `[0, n)` for schedule-level choices.
    pub(crate) fn choose(&mut self, n: usize) -> usize {
        self.choice_rng.below(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(n: usize) -> Vec<String> {
        // Deliberately unsorted input.
        (0..n).rev().map(|i| format!("v/{i:02}.mp4")).collect()
    }

    fn grab(pool: &mut Pool, hs: &mut Histories) -> String {
        let item = pool.get(hs).to_owned();
        pool.advance(hs);
        item
    }

    #[test]
    fn sequential_starts_at_offset_and_wraps() {
        let mut hs = Histories::default();
        let mut p = Pool::sequential("v", items(4), 6).unwrap();
        let got: Vec<String> = (0..5).map(|_| grab(&mut p, &mut hs)).collect();
        assert_eq!(
            got,
            vec!["v/02.mp4", "v/03.mp4", "v/00.mp4", "v/01.mp4", "v/02.mp4"]
        );
    }

    #[test]
    fn empty_pool_fails_at_construction() {
        let err = Pool::sequential("nothing", vec![], 0).unwrap_err();
        assert!(matches!(err, TelecastError::EmptyPool { pool } if pool == "nothing"));
    }

    #[test]
    fn shuffled_order_depends_only_on_seed() {
        let a = Pool::shuffled("a", items(20), "seed").unwrap();
        let b = Pool::shuffled("b", items(20), "seed").unwrap();
        let c = Pool::shuffled("c", items(20), "other").unwrap();
        assert_eq!(a.items(), b.items());
        assert_ne!(a.items(), c.items());
    }

    #[test]
    fn shuffled_order_is_fixed_across_cycles() {
        let mut hs = Histories::default();
        let mut p = Pool::shuffled("a", items(5), "s").unwrap();
        let order = p.items().to_vec();
        let two_cycles: Vec<String> = (0..10).map(|_| grab(&mut p, &mut hs)).collect();
        assert_eq!(&two_cycles[..5], &order[..]);
        assert_eq!(&two_cycles[5..], &order[..]);
    }

    #[test]
    fn random_respects_memory_window() {
        let mut hs = Histories::default();
        let id = hs.alloc(3);
        let mut p = Pool::random("r", items(6), "r", id, &hs).unwrap();
        let picks: Vec<String> = (0..200).map(|_| grab(&mut p, &mut hs)).collect();
        for w in picks.windows(3) {
            assert_ne!(w[0], w[1]);
            assert_ne!(w[0], w[2]);
            assert_ne!(w[1], w[2]);
        }
        assert!(hs.get(id).len() <= 3);
    }

    #[test]
    fn random_with_memory_covering_pool_still_draws() {
        let mut hs = Histories::default();
        let id = hs.alloc(10);
        let mut p = Pool::random("r", items(2), "r", id, &hs).unwrap();
        for _ in 0..10 {
            grab(&mut p, &mut hs);
        }
        assert_eq!(hs.get(id).len(), 10);
    }

    #[test]
    fn select_steps_sequential_cursor_past_ineligible_items() {
        let hs = Histories::default();
        let mut p = Pool::sequential("v", items(4), 0).unwrap();
        let got = p.select(&hs, |i| i.ends_with("02.mp4")).map(str::to_owned);
        assert_eq!(got.as_deref(), Some("v/02.mp4"));
        assert_eq!(p.peek(), "v/02.mp4");
        assert!(p.select(&hs, |_| false).is_none());
    }

    #[test]
    fn select_relaxes_history_only_when_every_eligible_item_is_in_it() {
        let mut hs = Histories::default();
        let id = hs.alloc(7);
        let mut p = Pool::random("r", items(10), "r", id, &hs).unwrap();
        let eligible = |i: &str| i < "v/07.mp4";
        for n in 0..40 {
            let item = p.select(&hs, eligible).unwrap().to_owned();
            assert!(eligible(item.as_str()));
            if n < 7 {
                assert!(!hs.get(id).contains(&item), "{item} repeated early");
            }
            p.advance(&mut hs);
        }
        assert!(p.select(&hs, |_| false).is_none());
    }

    #[test]
    fn reject_does_not_record_history() {
        let mut hs = Histories::default();
        let id = hs.alloc(4);
        let mut p = Pool::random("r", items(8), "r", id, &hs).unwrap();
        p.reject(&hs);
        p.reject(&hs);
        assert!(hs.get(id).is_empty());
    }

    #[test]
    fn get_rerolls_when_sibling_took_the_candidate() {
        let mut hs = Histories::default();
        let id = hs.alloc(4);
        let mut p = Pool::random("r", items(8), "r", id, &hs).unwrap();
        let stale = p.peek().to_owned();
        hs.get_mut(id).push(&stale);
        let fresh = p.get(&hs).to_owned();
        assert_ne!(stale, fresh);
    }
}
