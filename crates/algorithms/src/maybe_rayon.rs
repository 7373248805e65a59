//! Rayon or sequential iteration, chosen by the `parallel` feature.
//!
//! Row loops are written as `(0..rows).into_par_iter().flat_map(..)`; without
//! the feature, `into_par_iter` is plain `into_iter` and the rest of the
//! chain resolves to `Iterator` methods. Output order is scan order either way.

#[cfg(feature = "parallel")]
pub use rayon::prelude::*;

#[cfg(not(feature = "parallel"))]
mod sequential {
    pub trait IntoParallelIterator {
        type Iter;
        type Item;
        fn into_par_iter(self) -> Self::Iter;
    }

    impl<I: IntoIterator> IntoParallelIterator for I {
        type Iter = I::IntoIter;
        type Item = I::Item;
        fn into_par_iter(self) -> Self::Iter {
            self.into_iter()
        }
    }
}

#[cfg(not(feature = "parallel"))]
pub use sequential::*;
