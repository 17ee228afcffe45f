//! Ordered, duplicate-free sets.
//!
//! Column names are discovered at runtime, so presentation order has to come
//! from an explicit append-only registry rather than from map iteration.

use serde::{Deserialize, Serialize};

/// Append-only list of unique items in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderedSet<T> {
    items: Vec<T>,
}

impl<T: PartialEq> OrderedSet<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn contains(&self, item: &T) -> bool {
        self.items.iter().any(|x| x == item)
    }

    /// Appends `item` unless already present. Returns true when inserted.
    pub fn insert(&mut self, item: T) -> bool {
        if self.contains(&item) {
            return false;
        }
        self.items.push(item);
        true
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items
    }
}

impl<T: PartialEq> FromIterator<T> for OrderedSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = OrderedSet::new();
        for item in iter {
            set.insert(item);
        }
        set
    }
}

impl<'a, T> IntoIterator for &'a OrderedSet<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Intersection of two ordered sets where `None` means "unconstrained".
///
/// `intersect(None, b) == b` and `intersect(a, None) == a`. For two present
/// sets the result holds `a`'s matches in `a`'s order followed by any of
/// `b`'s matches not already added.
pub fn set_intersect<T: PartialEq + Clone>(a: Option<&[T]>, b: Option<&[T]>) -> Option<Vec<T>> {
    let (a, b) = match (a, b) {
        (None, None) => return None,
        (None, Some(b)) => return Some(b.to_vec()),
        (Some(a), None) => return Some(a.to_vec()),
        (Some(a), Some(b)) => (a, b),
    };

    let mut out: OrderedSet<T> = OrderedSet::new();
    for x in a {
        if b.contains(x) {
            out.insert(x.clone());
        }
    }
    for x in b {
        if a.contains(x) {
            out.insert(x.clone());
        }
    }
    Some(out.into_vec())
}

/// Folds [`set_intersect`] over any number of sets, starting unconstrained.
pub fn intersect_all<'a, T, I>(sets: I) -> Option<Vec<T>>
where
    T: PartialEq + Clone + 'a,
    I: IntoIterator<Item = &'a [T]>,
{
    sets.into_iter()
        .fold(None, |acc: Option<Vec<T>>, next| set_intersect(acc.as_deref(), Some(next)))
}
