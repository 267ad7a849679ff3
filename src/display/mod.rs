//! Display-side image selection.
//!
//! Everything a rendering surface needs to show a stored image, with no
//! rendering of its own:
//!
//! - **Resolve**: [`resolve`] maps an [`ImageRef`](crate::variant::ImageRef)
//!   and a [`DisplayContext`] to one URL.
//! - **Ladder**: [`ImageLoader`] walks down the fidelity ladder as loads
//!   fail, ending at the placeholder.
//! - **Lazy**: [`LazyLoadPolicy`] decides when an off-screen image starts
//!   loading.

pub mod ladder;
pub mod lazy;
pub mod resolve;

pub use ladder::{ImageLoader, LadderState};
pub use lazy::{LazyLoadPolicy, Rect};
pub use resolve::{DisplayContext, NetworkClass, Resolved, ResolvedSource, resolve};
