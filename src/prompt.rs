//! お題の抽選
//!
//! お題に使える全ラベルを袋に入れてシャッフルし、先頭から順に取り出す。
//! 袋が空になったら再びシャッフルして補充する。これにより1周の中で
//! 同じお題が2回出ることはなく、周内の順序は一様ランダムになる。

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::error::LabelTableError;
use crate::model::LabelTable;

#[derive(Debug, Clone)]
pub struct PromptSampler<R = StdRng> {
    labels: Vec<String>,
    bag: VecDeque<String>,
    rng: R,
}

impl PromptSampler<StdRng> {
    pub fn new(table: &LabelTable) -> Result<Self, LabelTableError> {
        Self::with_rng(table, StdRng::from_entropy())
    }

    /// シードを指定して作成（再現可能な順序）
    pub fn with_seed(table: &LabelTable, seed: u64) -> Result<Self, LabelTableError> {
        Self::with_rng(table, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> PromptSampler<R> {
    pub fn with_rng(table: &LabelTable, rng: R) -> Result<Self, LabelTableError> {
        let labels = table.promptable_labels();
        if labels.is_empty() {
            return Err(LabelTableError::NoPromptableLabels);
        }
        Ok(Self {
            bag: VecDeque::with_capacity(labels.len()),
            labels,
            rng,
        })
    }

    /// 現在の周で残っているお題の数
    pub fn remaining(&self) -> usize {
        self.bag.len()
    }

    /// 1周あたりのお題の数
    pub fn cycle_len(&self) -> usize {
        self.labels.len()
    }

    fn refill(&mut self) {
        let mut cycle = self.labels.clone();
        // Fisher–Yates
        cycle.shuffle(&mut self.rng);
        tracing::debug!(count = cycle.len(), "お題の袋を補充しました");
        self.bag.extend(cycle);
    }
}

/// 終わりのないお題列。`next()` は常に `Some` を返す
impl<R: Rng> Iterator for PromptSampler<R> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.bag.is_empty() {
            self.refill();
        }
        self.bag.pop_front()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (usize::MAX, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn table(labels: &[&str]) -> LabelTable {
        LabelTable::all_promptable(labels.iter().copied()).unwrap()
    }

    #[test]
    fn test_each_label_once_per_cycle() {
        let labels = ["airplane", "apple", "bicycle", "book", "car", "cat", "crown"];
        let mut sampler = PromptSampler::with_seed(&table(&labels), 7).unwrap();

        for _cycle in 0..5 {
            let drawn: Vec<String> = sampler.by_ref().take(labels.len()).collect();
            let unique: HashSet<&String> = drawn.iter().collect();
            assert_eq!(unique.len(), labels.len(), "repeat inside a cycle: {:?}", drawn);
            assert_eq!(sampler.remaining(), 0);
        }
    }

    #[test]
    fn test_fourth_call_starts_new_cycle() {
        let mut sampler = PromptSampler::with_seed(&table(&["cat", "dog", "fish"]), 42).unwrap();
        let first: HashSet<String> = sampler.by_ref().take(3).collect();
        assert_eq!(first.len(), 3);
        assert_eq!(sampler.remaining(), 0);

        let fourth = sampler.next().unwrap();
        assert!(first.contains(&fourth));
        assert_eq!(sampler.remaining(), 2);
    }

    #[test]
    fn test_disabled_labels_are_never_drawn() {
        let table = LabelTable::default();
        let sampler = PromptSampler::with_seed(&table, 1).unwrap();
        assert_eq!(sampler.cycle_len(), 14);
        assert!(sampler.take(14 * 4).all(|label| label != "spider"));
    }

    #[test]
    fn test_same_seed_same_order() {
        let table = table(&["a", "b", "c", "d", "e"]);
        let first = PromptSampler::with_seed(&table, 99).unwrap();
        let second = PromptSampler::with_seed(&table, 99).unwrap();
        let a: Vec<String> = first.take(10).collect();
        let b: Vec<String> = second.take(10).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_order_varies_between_cycles() {
        let labels: Vec<String> = (0..8).map(|i| format!("label{}", i)).collect();
        let table = LabelTable::all_promptable(labels).unwrap();
        let mut sampler = PromptSampler::with_seed(&table, 3).unwrap();

        let cycles: HashSet<Vec<String>> = (0..10)
            .map(|_| sampler.by_ref().take(8).collect())
            .collect();
        // 8! 通りから10回引いて全て同じ順序になることはまずない
        assert!(cycles.len() > 1);
    }

    #[test]
    fn test_sampler_never_runs_dry() {
        let mut sampler = PromptSampler::with_seed(&table(&["cat"]), 5).unwrap();
        assert_eq!(sampler.size_hint(), (usize::MAX, None));
        for _ in 0..100 {
            assert_eq!(sampler.next().as_deref(), Some("cat"));
        }
    }

    #[test]
    fn test_no_promptable_labels() {
        let table = LabelTable::new(vec!["spider".to_string()], &["spider".to_string()]).unwrap();
        assert_eq!(
            PromptSampler::new(&table).unwrap_err(),
            LabelTableError::NoPromptableLabels
        );
    }
}
