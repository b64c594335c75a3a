use std::fmt::Debug;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use serde::Serialize;

use super::graph::{ExpandRef, Interaction, Node, Op, Redex};

#[derive(Default, Debug)]
/// The `Arena` owns every reconstructed entity, and hands out indices into it.
/// Allocation is done using [`Arena::alloc`], and values can be accessed later
/// with [`Arena::get`]. Entities refer to each other only through these indices,
/// so back-references (node to ref, redex to interaction) never form
/// ownership cycles.
pub struct Arena {
    ops: Vec<Op>,
    nodes: Vec<Node>,
    refs: Vec<ExpandRef>,
    redexes: Vec<Redex>,
    interactions: Vec<Interaction>,
}

impl Arena {
    pub fn get<T: Indexable>(&self, index: Index<T>) -> &T {
        T::get(self, index)
    }
    pub fn get_mut<T: Indexable>(&mut self, index: Index<T>) -> &mut T {
        T::get_mut(self, index)
    }
    pub fn alloc<T: Indexable>(&mut self, data: T) -> Index<T> {
        T::alloc(self, data)
    }
    pub fn len<T: Indexable>(&self) -> usize {
        T::len(self)
    }
    pub fn indices<T: Indexable>(&self) -> impl Iterator<Item = Index<T>> {
        (0..T::len(self)).map(Index::new)
    }
}

/// A stable handle to a `T` stored in an [`Arena`].
pub struct Index<T: Indexable>(usize, PhantomData<fn() -> T>);

impl<T: Indexable> Index<T> {
    fn new(index: usize) -> Self {
        Self(index, PhantomData)
    }
    pub fn raw(self) -> usize {
        self.0
    }
    pub fn get(self, arena: &Arena) -> &T {
        T::get(arena, self)
    }
}

/// The `Indexable` trait is implemented by all types that are contained by an `Arena`.
/// Each type lives in its own vector; an [`Index`] is the offset into it.
pub trait Indexable: Sized {
    fn store(arena: &Arena) -> &Vec<Self>;
    fn store_mut(arena: &mut Arena) -> &mut Vec<Self>;

    fn get(arena: &Arena, index: Index<Self>) -> &Self {
        &Self::store(arena)[index.0]
    }
    fn get_mut(arena: &mut Arena, index: Index<Self>) -> &mut Self {
        &mut Self::store_mut(arena)[index.0]
    }
    fn alloc(arena: &mut Arena, data: Self) -> Index<Self> {
        let store = Self::store_mut(arena);
        let start = store.len();
        store.push(data);
        Index::new(start)
    }
    fn len(arena: &Arena) -> usize {
        Self::store(arena).len()
    }
}

macro_rules! indexable {
    ($ty: ty, $field: ident) => {
        impl Indexable for $ty {
            fn store(arena: &Arena) -> &Vec<Self> {
                &arena.$field
            }
            fn store_mut(arena: &mut Arena) -> &mut Vec<Self> {
                &mut arena.$field
            }
        }
    };
}

indexable!(Op, ops);
indexable!(Node, nodes);
indexable!(ExpandRef, refs);
indexable!(Redex, redexes);
indexable!(Interaction, interactions);

impl<T: Indexable> Clone for Index<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T: Indexable> Copy for Index<T> {}
impl<T: Indexable> PartialEq for Index<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl<T: Indexable> Eq for Index<T> {}
impl<T: Indexable> Hash for Index<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}
impl<T: Indexable> Debug for Index<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}
impl<T: Indexable> Serialize for Index<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.0 as u64)
    }
}
