//! Output receptacles.
//!
//! Each hedged attempt decodes the reply into a value of its own, and only
//! the winning attempt's value is merged into the caller's receptacle. The
//! receptacle is therefore never visible to attempt tasks, and a losing
//! attempt that completes after the winner cannot corrupt it.

use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};

/// A destination for a call's decoded reply.
///
/// Two shapes are provided: [`Slot`] overwrites on merge, and `HashMap`
/// merges entry-wise (existing entries survive unless a key collides).
pub trait Receptacle: Send {
    /// The decoded wire value one attempt produces.
    type Output: DeserializeOwned + Send + 'static;

    /// Merge the winning attempt's output into this receptacle.
    fn merge(&mut self, output: Self::Output);
}

/// A location receptacle: holds at most one reply value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Slot<T>(Option<T>);

impl<T> Slot<T> {
    pub fn new() -> Self {
        Self(None)
    }

    pub fn get(&self) -> Option<&T> {
        self.0.as_ref()
    }

    pub fn take(&mut self) -> Option<T> {
        self.0.take()
    }

    pub fn into_inner(self) -> Option<T> {
        self.0
    }
}

impl<T> Receptacle for Slot<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Output = T;

    fn merge(&mut self, output: T) {
        self.0 = Some(output);
    }
}

impl<K, V, S> Receptacle for HashMap<K, V, S>
where
    K: Eq + Hash + DeserializeOwned + Send + 'static,
    V: DeserializeOwned + Send + 'static,
    S: BuildHasher + Send,
{
    type Output = HashMap<K, V>;

    fn merge(&mut self, output: HashMap<K, V>) {
        self.extend(output);
    }
}
