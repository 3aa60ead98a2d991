#![allow(missing_docs)] // test only
use std::{cell::Cell, hash::BuildHasherDefault, sync::Arc};

use indexmap::IndexMap;
use ordinator::{
    BudgetAccountant, Entry, HeapPagePool, IdSpace, MemoryAccountant, Ordinator, OrdinatorConfig,
    OutOfMemory, Status,
};
use rand::prelude::*;
use rand_pcg::Pcg64;
use zwohash::ZwoHasher;

type HashSet<T> = hashbrown::HashSet<T, BuildHasherDefault<ZwoHasher>>;

/// Accountant that refuses a chosen charge, counted from when it was armed.
#[derive(Default)]
struct FailingAccountant {
    budget: BudgetAccountant,
    charges_until_failure: Cell<Option<usize>>,
}

impl FailingAccountant {
    fn fail_after(&self, successful_charges: usize) {
        self.charges_until_failure.set(Some(successful_charges));
    }

    fn disarm(&self) {
        self.charges_until_failure.set(None);
    }
}

impl MemoryAccountant for FailingAccountant {
    fn charge(&self, bytes: usize) -> Result<(), OutOfMemory> {
        match self.charges_until_failure.get() {
            Some(0) => Err(OutOfMemory {
                requested: bytes,
                used: self.budget.used(),
                limit: self.budget.used(),
            }),
            Some(n) => {
                self.charges_until_failure.set(Some(n - 1));
                self.budget.charge(bytes)
            }
            None => self.budget.charge(bytes),
        }
    }

    fn release(&self, bytes: usize) {
        self.budget.release(bytes)
    }
}

/// An ordinator checked against an `IndexMap` whose insertion index is the expected id.
struct CheckedOrdinator<'a> {
    dut: Ordinator<&'a HeapPagePool, &'a BudgetAccountant>,
    ref_map: IndexMap<i64, u32>,
}

impl<'a> CheckedOrdinator<'a> {
    fn new(
        config: OrdinatorConfig,
        pool: &'a HeapPagePool,
        accountant: &'a BudgetAccountant,
    ) -> Self {
        Self {
            dut: Ordinator::with_config(config, pool, accountant, Default::default()).unwrap(),
            ref_map: IndexMap::new(),
        }
    }

    fn add(&mut self, key: i64) -> u32 {
        let next = self.ref_map.len() as u32;
        let expected = *self.ref_map.entry(key).or_insert(next);
        let id = self.dut.add(key).unwrap();
        assert_eq!(id, expected);
        self.check_invariants();
        id
    }

    fn add_many(&mut self, keys: &[i64]) {
        let mut ids = vec![];
        self.dut.add_many(keys, &mut ids).unwrap();
        assert_eq!(ids.len(), keys.len());
        for (&key, &id) in keys.iter().zip(&ids) {
            let next = self.ref_map.len() as u32;
            assert_eq!(*self.ref_map.entry(key).or_insert(next), id);
        }
        self.check_invariants();
    }

    fn check_invariants(&self) {
        let status = self.dut.status();
        assert!(status.capacity().is_power_of_two());
        assert!(status.size() < status.next_grow_size());
        assert_eq!(status.size(), self.ref_map.len());
        assert_eq!(self.dut.is_big(), matches!(status, Status::Big(_)));
    }

    fn check(&self) {
        self.check_invariants();
        for (&key, &id) in &self.ref_map {
            assert_eq!(self.dut.find(key), Some(id));
        }

        let iter = self.dut.iter();
        assert_eq!(iter.len(), self.ref_map.len());
        let mut seen = HashSet::default();
        for Entry { key, id } in iter {
            assert_eq!(self.ref_map.get(&key), Some(&id));
            assert!(seen.insert(key));
        }
        assert_eq!(seen.len(), self.ref_map.len());
    }
}

#[test]
fn test_small_transition_scenario() {
    let pool = HeapPagePool::new(64);
    let accountant = BudgetAccountant::unlimited();
    let mut ordinator = Ordinator::with_config(
        OrdinatorConfig::default().with_small_capacity(4),
        &pool,
        &accountant,
        Default::default(),
    )
    .unwrap();

    assert_eq!(ordinator.status().next_grow_size(), 2);
    assert_eq!(ordinator.add(10), Ok(0));
    assert!(!ordinator.is_big());
    assert_eq!(ordinator.add(20), Ok(1));
    assert_eq!(ordinator.add(10), Ok(0));
    assert_eq!(ordinator.add(30), Ok(2));

    assert_eq!(ordinator.len(), 3);
    assert!(ordinator.is_big());
    assert_eq!(ordinator.status().grow_count(), 1);

    assert_eq!(ordinator.find(20), Some(1));
    assert_eq!(ordinator.find(99), None);

    ordinator.close();
    assert_eq!(accountant.used(), 0);
    assert_eq!(pool.outstanding(), 0);
}

#[test]
fn test_random_keys_get_a_permutation_of_ids() {
    let pool = HeapPagePool::default();
    let accountant = BudgetAccountant::unlimited();
    let mut ordinator = Ordinator::new(&pool, &accountant, Default::default()).unwrap();
    let mut rng = Pcg64::seed_from_u64(42);

    let mut keys = HashSet::default();
    while keys.len() < 100_000 {
        keys.insert(rng.gen::<i64>());
    }
    let keys: Vec<i64> = keys.into_iter().collect();

    let mut seen_ids = HashSet::default();
    let mut ids = vec![];
    for &key in &keys {
        let id = ordinator.add(key).unwrap();
        assert!(seen_ids.insert(id));
        ids.push(id);
    }
    assert!(ids.iter().copied().eq(0..100_000));

    for (&key, &id) in keys.iter().zip(&ids) {
        assert_eq!(ordinator.find(key), Some(id));
    }
    assert_eq!(ordinator.iter().count(), 100_000);

    let status = ordinator.status();
    assert!(status.grow_count() > 1);
    assert!(status.size() < status.next_grow_size());

    ordinator.close();
    assert_eq!(accountant.used(), 0);
    assert_eq!(pool.outstanding(), 0);
}

#[test]
fn test_grow_keeps_ids() {
    let pool = HeapPagePool::new(256);
    let accountant = BudgetAccountant::unlimited();
    let mut checked = CheckedOrdinator::new(Default::default(), &pool, &accountant);

    let mut key = 0;
    while !checked.dut.is_big() {
        checked.add(key * 3);
        key += 1;
    }
    let grow_count = checked.dut.status().grow_count();
    let capacity = checked.dut.status().capacity();
    while checked.dut.status().grow_count() == grow_count {
        checked.add(key * 3);
        key += 1;
    }
    assert_eq!(checked.dut.status().capacity(), capacity * 2);
    checked.check();
}

#[test]
fn test_low_big_fill_factor() {
    let pool = HeapPagePool::new(256);
    let accountant = BudgetAccountant::unlimited();
    let config = OrdinatorConfig::default().with_big_fill_factor(0.05);
    let mut checked = CheckedOrdinator::new(config, &pool, &accountant);

    for key in 0..2000 {
        checked.add(key);
    }
    assert!(checked.dut.is_big());
    checked.check();
}

#[test]
fn test_random_operations() {
    let pool = HeapPagePool::new(1 << 10);
    let accountant = BudgetAccountant::unlimited();
    let mut rng = Pcg64::seed_from_u64(7);

    for round in 0..20 {
        let config = OrdinatorConfig::default().with_small_capacity(1 << (round % 8));
        let mut checked = CheckedOrdinator::new(config, &pool, &accountant);
        let key_range = 1i64 << rng.gen_range(2..16u32);

        for _ in 0..rng.gen_range(0..3000) {
            match rng.gen_range(0..10) {
                0..=5 => {
                    checked.add(rng.gen_range(-key_range..key_range));
                }
                6..=7 => {
                    let key = rng.gen_range(-key_range..key_range);
                    assert_eq!(checked.dut.find(key), checked.ref_map.get(&key).copied());
                }
                _ => {
                    let batch: Vec<i64> = (0..rng.gen_range(0..64))
                        .map(|_| rng.gen_range(-key_range..key_range))
                        .collect();
                    checked.add_many(&batch);
                }
            }
        }
        checked.check();
    }
    assert_eq!(accountant.used(), 0);
    assert_eq!(pool.outstanding(), 0);
}

#[test]
fn test_clustered_keys() {
    let pool = HeapPagePool::new(1 << 10);
    let accountant = BudgetAccountant::unlimited();
    let mut checked = CheckedOrdinator::new(Default::default(), &pool, &accountant);

    for i in 0..20_000 {
        checked.add(i << 32);
        checked.add(i);
        checked.add(-i);
    }
    checked.add(i64::MIN);
    checked.add(i64::MAX);
    checked.check();
}

#[test]
fn test_shared_id_space() {
    let pool = HeapPagePool::new(256);
    let accountant = BudgetAccountant::unlimited();
    let id_space = Arc::new(IdSpace::starting_at(100));

    let mut left = Ordinator::new(&pool, &accountant, id_space.clone()).unwrap();
    let mut right = Ordinator::new(&pool, &accountant, id_space.clone()).unwrap();

    let mut ids = HashSet::default();
    for key in 0..1000 {
        let left_id = left.add(key).unwrap();
        let right_id = right.add(key % 500).unwrap();
        assert!(ids.insert(left_id));
        if key < 500 {
            assert!(ids.insert(right_id));
        } else {
            assert_eq!(right.find(key % 500), Some(right_id));
        }
    }
    assert_eq!(ids.len(), 1500);
    assert!(ids.iter().all(|&id| (100..1600).contains(&id)));
    assert_eq!(id_space.peek(), 1600);
    assert_eq!(id_space.allocated(), 1500);

    // The same key gets different ids from different ordinators.
    assert_ne!(left.find(3), right.find(3));

    drop(left);
    drop(right);
    assert_eq!(accountant.used(), 0);
}

#[test]
fn test_failed_grow_leaves_ordinator_usable() {
    let pool = HeapPagePool::new(256);
    let accountant = FailingAccountant::default();
    let mut ordinator = Ordinator::new(&pool, &accountant, Default::default()).unwrap();

    let mut key = 0;
    while !ordinator.is_big() {
        ordinator.add(key).unwrap();
        key += 1;
    }
    let grow_size = ordinator.status().next_grow_size();
    while ordinator.len() + 1 < grow_size {
        ordinator.add(key).unwrap();
        key += 1;
    }

    let status = ordinator.status();
    let used = accountant.budget.used();
    let outstanding = pool.outstanding();
    let next_id = ordinator.id_space().peek();

    // A grow to 128 slots charges 4 key pages, 2 id pages and the control bytes.
    for successful_charges in [0, 2, 4, 5, 6] {
        accountant.fail_after(successful_charges);
        assert!(ordinator.add(key).is_err());
        assert_eq!(ordinator.status(), status);
        assert_eq!(accountant.budget.used(), used);
        assert_eq!(pool.outstanding(), outstanding);
        assert_eq!(ordinator.id_space().peek(), next_id);
        assert_eq!(ordinator.find(key), None);
    }

    // Known keys need no allocation.
    assert_eq!(ordinator.add(0), Ok(0));
    for old_key in 0..key {
        assert_eq!(ordinator.find(old_key), Some(old_key as u32));
    }

    accountant.disarm();
    assert_eq!(ordinator.add(key), Ok(next_id));
    assert_eq!(ordinator.status().grow_count(), status.grow_count() + 1);

    ordinator.close();
    assert_eq!(accountant.budget.used(), 0);
    assert_eq!(pool.outstanding(), 0);
}

#[test]
fn test_failed_transition_leaves_small_core() {
    let pool = HeapPagePool::new(256);
    let accountant = FailingAccountant::default();
    let mut ordinator = Ordinator::new(&pool, &accountant, Default::default()).unwrap();

    let grow_size = ordinator.status().next_grow_size();
    for key in 0..grow_size as i64 - 1 {
        ordinator.add(key).unwrap();
    }
    let used = accountant.budget.used();

    accountant.fail_after(1);
    let key = grow_size as i64;
    assert!(ordinator.add(key).is_err());
    assert!(!ordinator.is_big());
    assert_eq!(accountant.budget.used(), used);

    let mut ids = vec![];
    assert!(ordinator.add_many(&[1, 2, key, 3], &mut ids).is_err());
    assert_eq!(ids, [1, 2]);

    accountant.disarm();
    ordinator.add_many(&[1, 2, key, 3], &mut ids).unwrap();
    assert_eq!(ids, [1, 2, 1, 2, grow_size as u32 - 1, 3]);
    assert!(ordinator.is_big());
}

#[test]
fn test_budget_exhaustion() {
    let pool = HeapPagePool::new(1 << 10);
    let accountant = BudgetAccountant::new(64 << 10);
    let mut checked = CheckedOrdinator::new(Default::default(), &pool, &accountant);

    let mut key = 0;
    let err = loop {
        let next = checked.ref_map.len() as u32;
        match checked.dut.add(key) {
            Ok(id) => {
                assert_eq!(id, next);
                checked.ref_map.insert(key, id);
            }
            Err(err) => break err,
        }
        key += 1;
    };
    assert_eq!(err.limit, 64 << 10);
    assert!(err.used + err.requested > err.limit);
    assert!(accountant.used() <= accountant.limit());
    checked.check();

    checked.dut.close();
    assert_eq!(accountant.used(), 0);
    assert!(accountant.peak() <= accountant.limit());
}
