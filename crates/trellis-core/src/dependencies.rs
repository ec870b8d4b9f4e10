//! Ordered container resolving placement constraints.
//!
//! Entries are added with a [`Position`]: [`Position::First`] entries come
//! before everything else, [`Position::Last`] after everything else,
//! [`Position::Middle`] in between, and [`Position::After`] right after the
//! named entry (and after the entries already placed after it). An `After`
//! naming a key that is not in the list degrades to `Middle`.
//!
//! Resolution is deterministic: the same insertion sequence always yields the
//! same order.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

/// Placement constraint for an entry of a [`DependenciesList`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Position<K> {
	First,
	Middle,
	Last,
	After(K),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Group {
	First,
	Middle,
	Last,
}

#[derive(Debug, Clone)]
struct Entry<K, V> {
	key: K,
	value: V,
	position: Position<K>,
}

/// Ordered map with "first / middle / last / after X" constraints.
///
/// # Examples
///
/// ```
/// use trellis_core::{DependenciesList, Position};
///
/// let mut list = DependenciesList::new();
/// list.add("session", 2, Position::Middle);
/// list.add("i18n", 3, Position::After("session"));
/// list.add("logging", 1, Position::First);
/// list.add("transaction", 4, Position::Last);
///
/// let keys: Vec<_> = list.keys().into_iter().copied().collect();
/// assert_eq!(keys, vec!["logging", "session", "i18n", "transaction"]);
/// ```
#[derive(Debug, Clone)]
pub struct DependenciesList<K, V> {
	entries: Vec<Entry<K, V>>,
}

impl<K, V> Default for DependenciesList<K, V> {
	fn default() -> Self {
		Self {
			entries: Vec::new(),
		}
	}
}

impl<K, V> DependenciesList<K, V>
where
	K: Eq + Hash + Clone + Debug,
{
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds an entry. Adding a key that already exists replaces the previous
	/// entry, value and position included, at its original insertion slot.
	pub fn add(&mut self, key: K, value: V, position: Position<K>) {
		if let Some(existing) = self.entries.iter_mut().find(|e| e.key == key) {
			tracing::debug!(?key, "replacing existing dependency entry");
			existing.value = value;
			existing.position = position;
			return;
		}
		self.entries.push(Entry {
			key,
			value,
			position,
		});
	}

	pub fn remove(&mut self, key: &K) -> Option<V> {
		let idx = self.entries.iter().position(|e| &e.key == key)?;
		Some(self.entries.remove(idx).value)
	}

	pub fn contains_key(&self, key: &K) -> bool {
		self.entries.iter().any(|e| &e.key == key)
	}

	pub fn get(&self, key: &K) -> Option<&V> {
		self.entries.iter().find(|e| &e.key == key).map(|e| &e.value)
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Keys in resolved order.
	pub fn keys(&self) -> Vec<&K> {
		self.resolve().into_iter().map(|(k, _)| k).collect()
	}

	/// Values in resolved order.
	pub fn values(&self) -> Vec<&V> {
		self.resolve().into_iter().map(|(_, v)| v).collect()
	}

	/// Resolves all constraints into a linear order.
	pub fn resolve(&self) -> Vec<(&K, &V)> {
		let index: HashMap<&K, usize> = self
			.entries
			.iter()
			.enumerate()
			.map(|(i, e)| (&e.key, i))
			.collect();

		// Dependents of each entry, in insertion order.
		let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.entries.len()];
		let mut roots: Vec<(Group, usize)> = Vec::new();
		for (i, entry) in self.entries.iter().enumerate() {
			match &entry.position {
				Position::First => roots.push((Group::First, i)),
				Position::Middle => roots.push((Group::Middle, i)),
				Position::Last => roots.push((Group::Last, i)),
				Position::After(target) => match index.get(target) {
					Some(&parent) => dependents[parent].push(i),
					None => {
						tracing::debug!(
							key = ?entry.key,
							after = ?target,
							"dependency target unknown, placing entry in the middle group"
						);
						roots.push((Group::Middle, i));
					}
				},
			}
		}

		let mut placed = vec![false; self.entries.len()];
		let mut order = Vec::with_capacity(self.entries.len());
		for group in [Group::First, Group::Middle, Group::Last] {
			for &(_, root) in roots.iter().filter(|(g, _)| *g == group) {
				Self::place(root, &dependents, &mut placed, &mut order);
			}
		}

		// Whatever is left only depends on itself through a cycle.
		for (i, entry) in self.entries.iter().enumerate() {
			if !placed[i] {
				tracing::warn!(key = ?entry.key, "dependency cycle detected, appending entry");
				Self::place(i, &dependents, &mut placed, &mut order);
			}
		}

		order
			.into_iter()
			.map(|i| (&self.entries[i].key, &self.entries[i].value))
			.collect()
	}

	fn place(idx: usize, dependents: &[Vec<usize>], placed: &mut [bool], order: &mut Vec<usize>) {
		if placed[idx] {
			return;
		}
		placed[idx] = true;
		order.push(idx);
		for &child in &dependents[idx] {
			Self::place(child, dependents, placed, order);
		}
	}
}
